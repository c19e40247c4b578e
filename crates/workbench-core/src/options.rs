//! Per-endpoint editor options and per-request process options.

use crate::identity::LanguageIdentity;
use crate::processor::TypeModel;
use crate::registry::LanguageRegistry;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Which pipeline stages an endpoint is interested in, and how payloads are delivered.
///
/// A stage whose interest flag is off is reported as skipped; `*_tree` / `*_asm` flags only
/// control whether the stage's SUCCESS carries its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EditorOptions {
    /// Run the parse stage.
    pub parse: bool,
    /// Deliver `LineTokens` from the parse stage.
    pub parse_line_tokens: bool,
    /// Lines per `LineTokens` response (`0` = everything in one response).
    pub line_tokens_chunk_size: usize,
    /// Attach the parse tree to the parse SUCCESS.
    pub parse_tree: bool,
    /// Run syntax analysis.
    pub syntax_analysis: bool,
    /// Attach the ASM to the syntax-analysis SUCCESS.
    pub syntax_analysis_asm: bool,
    /// Run semantic analysis.
    pub semantic_analysis: bool,
    /// Attach the ASM to the semantic-analysis SUCCESS.
    pub semantic_analysis_asm: bool,
}

impl Default for EditorOptions {
    fn default() -> Self {
        Self {
            parse: true,
            parse_line_tokens: true,
            line_tokens_chunk_size: 0,
            parse_tree: true,
            syntax_analysis: true,
            syntax_analysis_asm: true,
            semantic_analysis: true,
            semantic_analysis_asm: true,
        }
    }
}

/// Semantic-analysis context as it travels on the wire.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind", content = "value")]
pub enum ContextSpec {
    /// No context.
    #[default]
    None,
    /// The type model derived from another language's grammar.
    TypeModelReference(LanguageIdentity),
    /// A free-form value interpreted by the processor.
    Value(serde_json::Value),
}

/// Semantic-analysis context as handed to a processor.
///
/// `Registry` and `TypeModel` are live, in-process values substituted by the pipeline for the
/// meta languages; they never go over the wire.
#[derive(Clone, Default)]
pub enum AnalysisContext {
    /// No context.
    #[default]
    None,
    /// The language registry itself (grammar meta language).
    Registry(Arc<LanguageRegistry>),
    /// A resolved type model (cross-reference meta language).
    TypeModel(Arc<TypeModel>),
    /// A free-form value.
    Value(serde_json::Value),
}

impl fmt::Debug for AnalysisContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnalysisContext::None => f.write_str("None"),
            AnalysisContext::Registry(_) => f.write_str("Registry(..)"),
            AnalysisContext::TypeModel(model) => f
                .debug_tuple("TypeModel")
                .field(&format_args!("{}.{}", model.namespace, model.name))
                .finish(),
            AnalysisContext::Value(value) => f.debug_tuple("Value").field(value).finish(),
        }
    }
}

/// Per-request options.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProcessOptions {
    /// Rule to start parsing from (the grammar's first rule if absent).
    pub goal_rule: Option<String>,
    /// Semantic-analysis context.
    pub semantic_context: ContextSpec,
    /// Free-form extensions.
    pub extensions: BTreeMap<String, serde_json::Value>,
}

impl ProcessOptions {
    /// Options with a goal rule.
    pub fn with_goal_rule(mut self, rule: impl Into<String>) -> Self {
        self.goal_rule = Some(rule.into());
        self
    }

    /// Options with a semantic context.
    pub fn with_context(mut self, context: ContextSpec) -> Self {
        self.semantic_context = context;
        self
    }

    /// Options with an extension value.
    pub fn with_extension(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.extensions.insert(key.into(), value);
        self
    }

    /// Reads a boolean extension (`None` if missing or not a bool).
    pub fn extension_bool(&self, key: &str) -> Option<bool> {
        self.extensions.get(key).and_then(serde_json::Value::as_bool)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_editor_options_wire_shape() {
        let json = serde_json::to_value(EditorOptions::default()).unwrap();
        assert_eq!(json["parseLineTokens"], json!(true));
        assert_eq!(json["lineTokensChunkSize"], json!(0));

        let partial: EditorOptions = serde_json::from_value(json!({ "parse": false })).unwrap();
        assert!(!partial.parse);
        assert!(partial.semantic_analysis);
    }

    #[test]
    fn test_extension_bool() {
        let options = ProcessOptions::default()
            .with_extension("strict", json!(true))
            .with_extension("level", json!(3));
        assert_eq!(options.extension_bool("strict"), Some(true));
        assert_eq!(options.extension_bool("level"), None);
        assert_eq!(options.extension_bool("missing"), None);
    }
}

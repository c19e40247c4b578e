use crate::grammar::{CompiledGrammar, GrammarError};
use crate::meta::MetaLanguages;
use crate::processor::GrammarProcessor;
use crate::style::style_model_from_asm;
use crate::xref::{CrossReferenceModel, check_declarations};
use serde_json::json;
use std::sync::Arc;
use workbench_core::{
    CompileOutcome, LanguageCompiler, LanguageIdentity, LanguageIssue, LanguageProcessor,
    LanguageRegistry, Phase, Sentence, StyleOutcome, has_errors,
};

/// Compiles grammar, cross-reference and style texts for a [`LanguageRegistry`].
///
/// Cross-reference and style texts are read with the built-in meta languages, so their syntax
/// errors are the same issues a definition editor shows.
#[derive(Debug, Clone)]
pub struct GrammarCompiler {
    meta: MetaLanguages,
}

impl GrammarCompiler {
    /// Create a compiler; fails only if a meta-language grammar does not compile.
    pub fn new() -> Result<Self, GrammarError> {
        Ok(Self {
            meta: MetaLanguages::new()?,
        })
    }

    /// The meta-language processors.
    pub fn meta(&self) -> &MetaLanguages {
        &self.meta
    }

    /// Register the grammar, cross-reference and style languages in `registry`.
    pub fn register_meta_languages(&self, registry: &LanguageRegistry) {
        self.meta.register(registry);
    }
}

/// A registry compiling with a [`GrammarCompiler`], with the meta languages registered.
pub fn language_registry() -> Result<Arc<LanguageRegistry>, GrammarError> {
    let compiler = Arc::new(GrammarCompiler::new()?);
    let registry = Arc::new(LanguageRegistry::new(compiler.clone()));
    compiler.register_meta_languages(&registry);
    Ok(registry)
}

/// A compile error, located in the grammar text.
fn grammar_issue(text: &str, err: &GrammarError) -> LanguageIssue {
    let location = err
        .position()
        .map(|position| Sentence::new(text).location(position, 1));
    let issue = LanguageIssue::error(Phase::Compile, location, err.to_string());
    if err.expected().is_empty() {
        issue
    } else {
        issue.with_data(json!(err.expected()))
    }
}

fn in_phase(issues: Vec<LanguageIssue>, phase: Phase) -> Vec<LanguageIssue> {
    issues
        .into_iter()
        .map(|mut issue| {
            issue.phase = phase;
            issue
        })
        .collect()
}

impl LanguageCompiler for GrammarCompiler {
    fn compile(
        &self,
        identity: &LanguageIdentity,
        grammar: &str,
        cross_reference: Option<&str>,
    ) -> CompileOutcome {
        let compiled = match CompiledGrammar::compile(grammar) {
            Ok(compiled) => compiled,
            Err(err) => {
                tracing::debug!(language = %identity, error = %err, "grammar did not compile");
                return CompileOutcome {
                    processor: None,
                    issues: vec![grammar_issue(grammar, &err)],
                };
            }
        };
        tracing::debug!(
            language = %identity,
            grammar = %compiled.qualified_name(),
            rules = compiled.rules().len(),
            terminals = compiled.terminals().len(),
            "compiled grammar"
        );

        let mut processor = GrammarProcessor::new(compiled);
        let mut issues = Vec::new();
        if let Some(text) = cross_reference.filter(|t| !t.trim().is_empty()) {
            let (asm, read_issues) = self.meta.cross_reference.read_text(text);
            issues = in_phase(read_issues, Phase::Compile);
            let asm = match asm {
                Some(asm) if !has_errors(&issues) => asm,
                _ => {
                    tracing::debug!(language = %identity, "cross-reference text did not compile");
                    return CompileOutcome {
                        processor: None,
                        issues,
                    };
                }
            };

            if let Some(types) = processor.type_model() {
                issues.extend(
                    check_declarations(&asm, &types)
                        .into_iter()
                        .map(|(location, message)| {
                            LanguageIssue::warning(Phase::Compile, location, message)
                        }),
                );
            }
            processor = processor.with_cross_reference(CrossReferenceModel::from_asm(&asm));
        }

        CompileOutcome {
            processor: Some(Arc::new(processor)),
            issues,
        }
    }

    fn compile_style(&self, style: &str) -> StyleOutcome {
        let (asm, issues) = self.meta.style.read_text(style);
        let issues = in_phase(issues, Phase::Style);
        let model = match asm {
            Some(asm) if !has_errors(&issues) => Some(Arc::new(style_model_from_asm(&asm))),
            _ => None,
        };
        tracing::debug!(
            rules = model.as_ref().map_or(0, |m| m.rules.len()),
            issues = issues.len(),
            "compiled style"
        );
        StyleOutcome { model, issues }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use workbench_core::{IssueKind, SelectorKind};

    const HELLO: &str = r#"
        namespace test
        grammar Test {
            skip leaf WS = "\s+" ;
            document = 'Hello' NAME ;
            leaf NAME = "[A-Za-z]+" ;
        }
    "#;

    fn compiler() -> GrammarCompiler {
        GrammarCompiler::new().unwrap()
    }

    #[test]
    fn test_compile_grammar() {
        let outcome = compiler().compile(&LanguageIdentity::new("test.Hello"), HELLO, None);
        assert!(outcome.issues.is_empty());
        let processor = outcome.processor.unwrap();
        assert_eq!(processor.matchables().len(), 3);
    }

    #[test]
    fn test_compile_error_is_located() {
        let outcome = compiler().compile(
            &LanguageIdentity::new("test.Hello"),
            "namespace test\ngrammar Test {\n  a = b ;\n}",
            None,
        );
        assert!(outcome.processor.is_none());
        let issue = &outcome.issues[0];
        assert_eq!(issue.phase, Phase::Compile);
        assert_eq!(issue.kind, IssueKind::Error);
        let location = issue.location.unwrap();
        assert_eq!((location.line, location.column), (2, 6));
    }

    #[test]
    fn test_cross_reference_warnings_and_errors() {
        let identity = LanguageIdentity::new("test.Hello");
        let outcome = compiler().compile(
            &identity,
            HELLO,
            Some("identify Document by title"),
        );
        assert!(outcome.processor.is_some());
        assert_eq!(outcome.issues.len(), 1);
        assert_eq!(outcome.issues[0].kind, IssueKind::Warning);
        assert_eq!(
            outcome.issues[0].message,
            "Property 'title' not found on type 'Document'"
        );

        let outcome = compiler().compile(&identity, HELLO, Some("identify Document"));
        assert!(outcome.processor.is_none());
        assert_eq!(outcome.issues[0].phase, Phase::Compile);

        let outcome = compiler().compile(&identity, HELLO, Some("  \n"));
        assert!(outcome.processor.is_some());
        assert!(outcome.issues.is_empty());
    }

    #[test]
    fn test_compile_style() {
        let outcome = compiler().compile_style("NAME { foreground: blue; }");
        let model = outcome.model.unwrap();
        assert_eq!(model.rules[0].selectors[0].kind, SelectorKind::RuleName);

        let outcome = compiler().compile_style("NAME { foreground blue; }");
        assert!(outcome.model.is_none());
        assert_eq!(outcome.issues[0].phase, Phase::Style);
    }

    #[test]
    fn test_registry_has_meta_languages() {
        let registry = language_registry().unwrap();
        assert_eq!(
            registry.identities(),
            vec![
                LanguageIdentity::cross_reference(),
                LanguageIdentity::grammar(),
                LanguageIdentity::style(),
            ]
        );
    }
}

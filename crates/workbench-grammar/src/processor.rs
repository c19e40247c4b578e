use crate::grammar::{
    CompiledGrammar, ParseFailure, RuleId, build_asm, derive_type_model, expected_at, parse, scan,
};
use crate::meta;
use crate::xref::{self, CrossReferenceModel};
use serde_json::json;
use std::sync::Arc;
use workbench_core::{
    AnalysisContext, Asm, CancelToken, CompletionItem, CompletionResult, LanguageIssue,
    LanguageProcessor, Matchable, MatchableKind, ParseResult, ParseTree, Phase, ProcessOptions,
    ProcessorResult, ScanResult, SemanticAnalysisResult, Sentence, SyntaxAnalysisResult,
    TypeModel,
};

#[derive(Debug, Clone)]
/// Semantic checks a processor runs on its ASM.
pub(crate) enum Analysis {
    /// User language: resolve cross-references, if any are defined.
    References(Option<CrossReferenceModel>),
    /// Grammar text: rule references and registered grammar names.
    GrammarMeta,
    /// Cross-reference text: types and properties against a type model.
    CrossReferenceMeta,
    /// Style text: nothing to check.
    StyleMeta,
}

/// A [`LanguageProcessor`] backed by a compiled grammar.
///
/// Shared by every endpoint using the language; all state is immutable after construction.
#[derive(Debug, Clone)]
pub struct GrammarProcessor {
    grammar: Arc<CompiledGrammar>,
    type_model: Arc<TypeModel>,
    analysis: Analysis,
}

impl GrammarProcessor {
    /// Create a processor for a user language without cross-references.
    pub fn new(grammar: CompiledGrammar) -> Self {
        let type_model = Arc::new(derive_type_model(&grammar));
        Self {
            grammar: Arc::new(grammar),
            type_model,
            analysis: Analysis::References(None),
        }
    }

    /// Resolve references declared by `model` during semantic analysis.
    pub fn with_cross_reference(mut self, model: CrossReferenceModel) -> Self {
        self.analysis = Analysis::References(Some(model));
        self
    }

    pub(crate) fn with_analysis(mut self, analysis: Analysis) -> Self {
        self.analysis = analysis;
        self
    }

    /// The compiled grammar.
    pub fn grammar(&self) -> &CompiledGrammar {
        &self.grammar
    }

    /// The cross-reference declarations, if any.
    pub fn cross_reference(&self) -> Option<&CrossReferenceModel> {
        match &self.analysis {
            Analysis::References(model) => model.as_ref(),
            _ => None,
        }
    }

    /// Parse and analyse `text` from the default goal, without cancellation.
    ///
    /// Used to read definition texts (cross-reference, style) with the meta processors.
    pub fn read_text(&self, text: &str) -> (Option<Arc<Asm>>, Vec<LanguageIssue>) {
        let options = ProcessOptions::default();
        let parsed = match self.parse(text, &options, &CancelToken::none()) {
            Ok(parsed) => parsed,
            Err(err) => return (None, vec![LanguageIssue::error(Phase::Parse, None, err.to_string())]),
        };
        let mut issues = parsed.issues;
        let Some(tree) = parsed.tree else {
            return (None, issues);
        };
        match self.syntax_analysis(&tree, &options) {
            Ok(result) => {
                issues.extend(result.issues);
                (result.asm, issues)
            }
            Err(err) => {
                issues.push(LanguageIssue::error(Phase::SyntaxAnalysis, None, err.to_string()));
                (None, issues)
            }
        }
    }

    fn goal(&self, options: &ProcessOptions) -> Result<RuleId, LanguageIssue> {
        match &options.goal_rule {
            None => Ok(self.grammar.default_goal()),
            Some(name) => self.grammar.find_rule(name).ok_or_else(|| {
                LanguageIssue::error(
                    Phase::Parse,
                    None,
                    format!(
                        "Goal rule '{name}' not found in grammar '{}'",
                        self.grammar.qualified_name()
                    ),
                )
            }),
        }
    }
}

/// The issue for a sentence that did not parse: the failing line with `^` at the failure.
fn failure_issue(text: &str, failure: &ParseFailure) -> LanguageIssue {
    let sentence = Sentence::new(text);
    let location = sentence.location(failure.position, 1);
    let line: Vec<char> = sentence
        .line_text(location.line)
        .unwrap_or_default()
        .chars()
        .collect();
    let column = location.column.min(line.len());
    let before: String = line[..column].iter().collect();
    let after: String = line[column..].iter().collect();

    LanguageIssue::error(Phase::Parse, Some(location), format!("{before}^{after}"))
        .with_data(json!(failure.expected))
}

impl LanguageProcessor for GrammarProcessor {
    fn matchables(&self) -> Vec<Matchable> {
        self.grammar.matchables()
    }

    fn scan(&self, text: &str, offset: usize) -> ProcessorResult<ScanResult> {
        Ok(ScanResult {
            leaves: scan(&self.grammar, text, offset),
            issues: Vec::new(),
        })
    }

    fn parse(
        &self,
        text: &str,
        options: &ProcessOptions,
        cancel: &CancelToken,
    ) -> ProcessorResult<ParseResult> {
        let goal = match self.goal(options) {
            Ok(goal) => goal,
            Err(issue) => {
                return Ok(ParseResult {
                    tree: None,
                    issues: vec![issue],
                });
            }
        };

        Ok(match parse(&self.grammar, text, goal, cancel)? {
            Ok(tree) => ParseResult {
                tree: Some(Arc::new(tree)),
                issues: Vec::new(),
            },
            Err(failure) => ParseResult {
                tree: None,
                issues: vec![failure_issue(text, &failure)],
            },
        })
    }

    fn syntax_analysis(
        &self,
        tree: &ParseTree,
        _options: &ProcessOptions,
    ) -> ProcessorResult<SyntaxAnalysisResult> {
        Ok(SyntaxAnalysisResult {
            asm: Some(Arc::new(build_asm(&self.grammar, &self.type_model, tree))),
            issues: Vec::new(),
        })
    }

    fn semantic_analysis(
        &self,
        asm: &Asm,
        context: &AnalysisContext,
        _options: &ProcessOptions,
        cancel: &CancelToken,
    ) -> ProcessorResult<SemanticAnalysisResult> {
        let issues = match &self.analysis {
            Analysis::References(None) | Analysis::StyleMeta => Vec::new(),
            Analysis::References(Some(model)) => xref::resolve_references(model, asm, cancel)?,
            Analysis::GrammarMeta => meta::check_grammar(asm, context),
            Analysis::CrossReferenceMeta => meta::check_cross_reference(asm, context),
        };
        Ok(SemanticAnalysisResult { issues })
    }

    fn expected_items_at(
        &self,
        text: &str,
        position: usize,
        options: &ProcessOptions,
    ) -> ProcessorResult<CompletionResult> {
        let goal = match self.goal(options) {
            Ok(goal) => goal,
            Err(issue) => {
                return Ok(CompletionResult {
                    items: Vec::new(),
                    issues: vec![issue],
                });
            }
        };

        let items = expected_at(&self.grammar, text, goal, position, &CancelToken::none())?
            .into_iter()
            .map(|id| {
                let terminal = self.grammar.terminal(id);
                let text = match terminal.kind {
                    MatchableKind::Literal => terminal.expression.clone(),
                    MatchableKind::Pattern => format!("<{}>", terminal.name),
                };
                CompletionItem {
                    kind: terminal.kind,
                    name: terminal.name.clone(),
                    text,
                }
            })
            .collect();
        Ok(CompletionResult {
            items,
            issues: Vec::new(),
        })
    }

    fn type_model(&self) -> Option<Arc<TypeModel>> {
        Some(self.type_model.clone())
    }

    fn rule_names(&self) -> Vec<String> {
        self.grammar.rules().iter().map(|r| r.name.clone()).collect()
    }
}

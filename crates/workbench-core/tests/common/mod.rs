//! Scripted processor and compiler shared by the integration tests.
//!
//! Grammar text is a list of `key=value` lines that choose how each stage behaves, e.g.
//! `parse=panic` or `semantic=context`. Anything else (including an empty line) keeps the
//! default behaviour: words are `WORD` leaves, whitespace is a skipped `WS` leaf and every
//! other char is undefined.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::mpsc::Receiver;
use std::sync::{Arc, mpsc};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use workbench_core::{
    AnalysisContext, Asm, AsmPrimitive, AsmProperty, AsmStructure, AsmValue, CancelToken,
    CompileOutcome, CompletionItem, CompletionResult, EndPointIdentity, EventStatus,
    LanguageCompiler, LanguageIdentity, LanguageIssue, LanguageProcessor, LanguageRegistry,
    LanguageService, LanguageServiceResponse, Leaf, Matchable, MatchableKind, ParseBranch,
    ParseNode, ParseResult, ParseTree, Phase, PipelineEvent, ProcessOptions, ProcessorError,
    ProcessorResult, PropertyDefinition, ScanResult, SelectorKind, SemanticAnalysisResult,
    ServiceConfig, Stage, StyleModel, StyleOutcome, StyleRule, StyleSelector,
    SyntaxAnalysisResult, TypeDefinition, TypeModel,
};

/// Called at the start of every parse.
pub type ParseHook = Arc<dyn Fn() + Send + Sync>;

/// Behaviour of one stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Behaviour {
    #[default]
    Ok,
    /// Recoverable failure: no result, with an issue.
    Fail,
    /// `Err(ProcessorError::Failed)`.
    Error,
    Panic,
    /// Parse only: spin until cancelled (or a few seconds pass).
    Wait,
    /// Semantic only: report the analysis context as an issue.
    Context,
    /// Semantic only: report one warning.
    Warn,
}

#[derive(Debug, Clone, Default)]
pub struct Script {
    pub parse: Behaviour,
    pub syntax: Behaviour,
    pub semantic: Behaviour,
    pub scan: Behaviour,
}

impl Script {
    fn read(grammar: &str) -> Self {
        let settings: BTreeMap<&str, &str> = grammar
            .lines()
            .filter_map(|l| l.split_once('='))
            .map(|(k, v)| (k.trim(), v.trim()))
            .collect();
        let behaviour = |key: &str| match settings.get(key).copied() {
            Some("fail") => Behaviour::Fail,
            Some("error") => Behaviour::Error,
            Some("panic") => Behaviour::Panic,
            Some("wait") => Behaviour::Wait,
            Some("context") => Behaviour::Context,
            Some("warn") => Behaviour::Warn,
            _ => Behaviour::Ok,
        };
        Self {
            parse: behaviour("parse"),
            syntax: behaviour("syntax"),
            semantic: behaviour("semantic"),
            scan: behaviour("scan"),
        }
    }
}

pub struct ScriptedProcessor {
    script: Script,
    hook: Option<ParseHook>,
}

impl ScriptedProcessor {
    pub fn new(script: Script) -> Self {
        Self { script, hook: None }
    }

    fn leaves(text: &str, offset: usize) -> Vec<Leaf> {
        let chars: Vec<char> = text.chars().collect();
        let mut leaves = Vec::new();
        let mut i = 0;
        while i < chars.len() {
            let class = |c: char| {
                if c.is_alphanumeric() {
                    0
                } else if c.is_whitespace() {
                    1
                } else {
                    2
                }
            };
            let kind = class(chars[i]);
            let mut j = i + 1;
            if kind != 2 {
                while j < chars.len() && class(chars[j]) == kind {
                    j += 1;
                }
            }
            let text: String = chars[i..j].iter().collect();
            let leaf = match kind {
                0 => Leaf::new("WORD", offset + i, text),
                1 => Leaf::new("WS", offset + i, text).skip(),
                _ => Leaf::new(Leaf::UNDEFINED, offset + i, text),
            };
            leaves.push(leaf);
            i = j;
        }
        leaves
    }
}

pub fn words_type_model() -> TypeModel {
    TypeModel {
        namespace: "test".to_string(),
        name: "Words".to_string(),
        types: vec![TypeDefinition {
            name: "Sentence".to_string(),
            properties: vec![PropertyDefinition {
                name: "words".to_string(),
                type_name: "String".to_string(),
                is_collection: true,
            }],
        }],
    }
}

impl LanguageProcessor for ScriptedProcessor {
    fn matchables(&self) -> Vec<Matchable> {
        vec![
            Matchable {
                name: "WORD".to_string(),
                kind: MatchableKind::Pattern,
                expression: "[a-zA-Z0-9]+".to_string(),
                is_skip: false,
            },
            Matchable {
                name: "WS".to_string(),
                kind: MatchableKind::Pattern,
                expression: "\\s+".to_string(),
                is_skip: true,
            },
        ]
    }

    fn scan(&self, text: &str, offset: usize) -> ProcessorResult<ScanResult> {
        match self.script.scan {
            Behaviour::Error => Err(ProcessorError::Failed("scanner broken".to_string())),
            Behaviour::Panic => panic!("scanner exploded"),
            _ => Ok(ScanResult {
                leaves: Self::leaves(text, offset),
                issues: Vec::new(),
            }),
        }
    }

    fn parse(
        &self,
        text: &str,
        _options: &ProcessOptions,
        cancel: &CancelToken,
    ) -> ProcessorResult<ParseResult> {
        if let Some(hook) = &self.hook {
            hook();
        }
        match self.script.parse {
            Behaviour::Fail => {
                return Ok(ParseResult {
                    tree: None,
                    issues: vec![LanguageIssue::error(
                        Phase::Parse,
                        None,
                        "Failed to match {<EOT>} at: ^",
                    )],
                });
            }
            Behaviour::Error => return Err(ProcessorError::Failed("parser broken".to_string())),
            Behaviour::Panic => panic!("parser exploded"),
            Behaviour::Wait => {
                let deadline = Instant::now() + Duration::from_secs(5);
                while Instant::now() < deadline {
                    cancel.check()?;
                    std::thread::sleep(Duration::from_millis(1));
                }
            }
            _ => {}
        }
        cancel.check()?;

        let children: Vec<ParseNode> = Self::leaves(text, 0)
            .into_iter()
            .map(|l| {
                let tags = vec!["sentence".to_string(), l.name.clone()];
                ParseNode::Leaf(l.with_tags(tags))
            })
            .collect();
        let tree = ParseTree::new(ParseNode::Branch(ParseBranch {
            name: "sentence".to_string(),
            position: 0,
            length: text.chars().count(),
            children,
        }));
        Ok(ParseResult {
            tree: Some(Arc::new(tree)),
            issues: Vec::new(),
        })
    }

    fn syntax_analysis(
        &self,
        tree: &ParseTree,
        _options: &ProcessOptions,
    ) -> ProcessorResult<SyntaxAnalysisResult> {
        match self.script.syntax {
            Behaviour::Fail => Ok(SyntaxAnalysisResult {
                asm: None,
                issues: vec![LanguageIssue::error(
                    Phase::SyntaxAnalysis,
                    None,
                    "no structure",
                )],
            }),
            Behaviour::Error => Err(ProcessorError::Failed("syntax broken".to_string())),
            Behaviour::Panic => panic!("syntax exploded"),
            _ => {
                let words = tree
                    .non_skip_leaves()
                    .into_iter()
                    .map(|l| {
                        AsmValue::Primitive(AsmPrimitive {
                            value: l.text.clone(),
                            location: None,
                        })
                    })
                    .collect();
                Ok(SyntaxAnalysisResult {
                    asm: Some(Arc::new(Asm {
                        roots: vec![AsmStructure {
                            type_name: "Sentence".to_string(),
                            location: None,
                            properties: vec![AsmProperty {
                                name: "words".to_string(),
                                value: AsmValue::List(words),
                            }],
                        }],
                    })),
                    issues: Vec::new(),
                })
            }
        }
    }

    fn semantic_analysis(
        &self,
        _asm: &Asm,
        context: &AnalysisContext,
        _options: &ProcessOptions,
        _cancel: &CancelToken,
    ) -> ProcessorResult<SemanticAnalysisResult> {
        let issues = match self.script.semantic {
            Behaviour::Panic => panic!("semantic exploded"),
            Behaviour::Error => return Err(ProcessorError::Failed("semantic broken".to_string())),
            Behaviour::Context => {
                let described = match context {
                    AnalysisContext::None => "none".to_string(),
                    AnalysisContext::Registry(_) => "registry".to_string(),
                    AnalysisContext::TypeModel(model) => {
                        format!("types {}.{}", model.namespace, model.name)
                    }
                    AnalysisContext::Value(value) => format!("value {value}"),
                };
                vec![LanguageIssue::warning(
                    Phase::SemanticAnalysis,
                    None,
                    described,
                )]
            }
            Behaviour::Warn => vec![LanguageIssue::warning(
                Phase::SemanticAnalysis,
                None,
                "suspicious sentence",
            )],
            _ => Vec::new(),
        };
        Ok(SemanticAnalysisResult { issues })
    }

    fn expected_items_at(
        &self,
        _text: &str,
        _position: usize,
        _options: &ProcessOptions,
    ) -> ProcessorResult<CompletionResult> {
        Ok(CompletionResult {
            items: vec![CompletionItem {
                kind: MatchableKind::Pattern,
                name: "WORD".to_string(),
                text: "<WORD>".to_string(),
            }],
            issues: Vec::new(),
        })
    }

    fn type_model(&self) -> Option<Arc<TypeModel>> {
        Some(Arc::new(words_type_model()))
    }
}

/// Compiles scripted grammars. Grammar text `broken` fails; style lines are selectors, and
/// style text containing `!` fails.
#[derive(Default)]
pub struct ScriptedCompiler {
    hook: Mutex<Option<ParseHook>>,
    compiles: Mutex<usize>,
}

impl ScriptedCompiler {
    pub fn set_parse_hook(&self, hook: ParseHook) {
        *self.hook.lock() = Some(hook);
    }

    pub fn compile_count(&self) -> usize {
        *self.compiles.lock()
    }
}

impl LanguageCompiler for ScriptedCompiler {
    fn compile(
        &self,
        _identity: &LanguageIdentity,
        grammar: &str,
        _cross_reference: Option<&str>,
    ) -> CompileOutcome {
        *self.compiles.lock() += 1;
        if grammar.trim() == "broken" {
            return CompileOutcome {
                processor: None,
                issues: vec![LanguageIssue::error(
                    Phase::Compile,
                    None,
                    "grammar does not compile",
                )],
            };
        }
        let mut processor = ScriptedProcessor::new(Script::read(grammar));
        processor.hook = self.hook.lock().clone();
        CompileOutcome {
            processor: Some(Arc::new(processor)),
            issues: Vec::new(),
        }
    }

    fn compile_style(&self, style: &str) -> StyleOutcome {
        if style.contains('!') {
            return StyleOutcome {
                model: None,
                issues: vec![LanguageIssue::error(Phase::Style, None, "bad style")],
            };
        }
        let rules = style
            .lines()
            .filter_map(|l| l.split_whitespace().next())
            .map(|selector| StyleRule {
                selectors: vec![StyleSelector {
                    value: selector.to_string(),
                    kind: if selector.starts_with('$') {
                        SelectorKind::Meta
                    } else {
                        SelectorKind::RuleName
                    },
                }],
                declarations: Vec::new(),
            })
            .collect();
        StyleOutcome {
            model: Some(Arc::new(StyleModel { rules })),
            issues: Vec::new(),
        }
    }
}

pub struct Harness {
    pub compiler: Arc<ScriptedCompiler>,
    pub service: LanguageService,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(ServiceConfig::default())
    }

    pub fn with_config(config: ServiceConfig) -> Self {
        let compiler = Arc::new(ScriptedCompiler::default());
        let registry = Arc::new(LanguageRegistry::new(compiler.clone()));
        Self {
            compiler,
            service: LanguageService::new(registry, config),
        }
    }

    /// Open `endpoint` with a channel listener.
    pub fn listen(&self, endpoint: &EndPointIdentity) -> Receiver<LanguageServiceResponse> {
        let (tx, rx) = mpsc::channel();
        self.service.add_response_listener(endpoint, Arc::new(tx));
        rx
    }
}

pub fn endpoint(n: usize) -> EndPointIdentity {
    EndPointIdentity::new("editor", format!("session-{n}"))
}

pub fn language() -> LanguageIdentity {
    LanguageIdentity::new("test.Words")
}

pub fn drain(rx: &Receiver<LanguageServiceResponse>) -> Vec<LanguageServiceResponse> {
    rx.try_iter().collect()
}

pub fn stage_events(responses: &[LanguageServiceResponse]) -> Vec<PipelineEvent> {
    responses
        .iter()
        .filter_map(|r| r.stage_event().cloned())
        .collect()
}

pub fn summary(responses: &[LanguageServiceResponse]) -> Vec<(Stage, EventStatus)> {
    stage_events(responses)
        .iter()
        .map(|e| (e.stage, e.status))
        .collect()
}

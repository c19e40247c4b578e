#![warn(missing_docs)]
//! Workbench Core - Headless Language Workbench Kernel
//!
//! # Overview
//!
//! `workbench-core` is the editor-integration layer of a language workbench. Given a live text
//! buffer in an editor, it incrementally produces highlight tokens, a parse tree, an abstract
//! syntax model (ASM) and semantic-analysis issues, while the grammar / style / cross-reference
//! definitions themselves may be edited concurrently by other editors.
//!
//! It does not parse anything itself: a [`LanguageCompiler`] builds [`LanguageProcessor`]s from
//! definition text (see the `workbench-grammar` crate), and this crate orchestrates them.
//!
//! # Architecture Layers
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │  LanguageService (request dispatch)         │  ← Public API
//! ├─────────────────────────────────────────────┤
//! │  Pipeline (parse → syntax → semantic)       │  ← Stage events
//! ├──────────────────────┬──────────────────────┤
//! │  SessionRegistry     │  LanguageRegistry    │  ← Per-endpoint / shared state
//! ├──────────────────────┼──────────────────────┤
//! │  IncrementalTokenizer│  StyleHandler        │  ← Highlighting
//! ├──────────────────────┴──────────────────────┤
//! │  LanguageProcessor / LanguageCompiler       │  ← External collaborators
//! └─────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use std::sync::{Arc, mpsc};
//! use workbench_core::{
//!     EditorOptions, EndPointIdentity, LanguageIdentity, LanguageRegistry, LanguageService,
//!     ProcessOptions, ServiceConfig,
//! };
//!
//! let registry = Arc::new(LanguageRegistry::new(compiler));
//! let service = LanguageService::new(registry, ServiceConfig::default());
//!
//! let endpoint = EndPointIdentity::new("editor-1", "session-1");
//! let (tx, rx) = mpsc::channel();
//! service.add_response_listener(&endpoint, Arc::new(tx));
//!
//! let language = LanguageIdentity::new("test.Hello");
//! service.create_processor(&endpoint, &language, grammar, None, EditorOptions::default());
//! service.process(&endpoint, &language, "Hello World", &ProcessOptions::default())?;
//!
//! for response in rx.try_iter() {
//!     println!("{response:?}");
//! }
//! ```
//!
//! # Module Description
//!
//! - [`identity`] - endpoint and language identities
//! - [`registry`] - shared, revisioned language definitions
//! - [`processor`] - collaborator traits and the tree / ASM / style data they produce
//! - [`pipeline`] - the language service and its staged pipeline
//! - [`session`] - per-endpoint state and in-flight run tracking
//! - [`tokenizer`] - incremental line tokenizer
//! - [`style`] - style selector to class mapping
//! - [`protocol`] - requests, responses and stage events

pub mod cancel;
pub mod config;
pub mod error;
pub mod identity;
pub mod issues;
pub mod options;
pub mod pipeline;
pub mod processor;
pub mod protocol;
pub mod registry;
pub mod sentence;
pub mod session;
pub mod style;
pub mod token;
pub mod tokenizer;

pub use cancel::CancelToken;
pub use config::ServiceConfig;
pub use error::{ProcessorError, ProcessorResult, RegistryError, ServiceError};
pub use identity::{EndPointIdentity, LanguageIdentity};
pub use issues::{InputLocation, IssueKind, LanguageIssue, Phase, has_errors};
pub use options::{AnalysisContext, ContextSpec, EditorOptions, ProcessOptions};
pub use pipeline::LanguageService;
pub use processor::{
    Asm, AsmPrimitive, AsmProperty, AsmStructure, AsmValue, CompileOutcome, CompletionItem,
    CompletionResult, LanguageCompiler, LanguageProcessor, Leaf, Matchable, MatchableKind,
    ParseBranch, ParseNode, ParseResult, ParseTree, PropertyDefinition, ScanResult,
    SelectorKind, SemanticAnalysisResult, StyleDeclaration, StyleModel, StyleOutcome, StyleRule,
    StyleSelector, SyntaxAnalysisResult, TypeDefinition, TypeModel,
};
pub use protocol::{
    EventStatus, LanguageServiceRequest, LanguageServiceResponse, PipelineEvent, ResponseSink,
    Stage, StagePayload,
};
pub use registry::{
    DefinitionChange, DefinitionChangeKind, LanguageDefinition, LanguageRegistry,
    ProcessorSnapshot,
};
pub use sentence::Sentence;
pub use session::{EndpointSession, RunGuard, Session, SessionRegistry};
pub use style::StyleHandler;
pub use token::{AglToken, LineState};
pub use tokenizer::{IncrementalTokenizer, LineScanner, ProcessorLineScanner};

#![warn(missing_docs)]
//! `workbench-grammar` - grammar-defined languages for `workbench-core`.
//!
//! This crate provides the [`LanguageCompiler`](workbench_core::LanguageCompiler) and
//! [`LanguageProcessor`](workbench_core::LanguageProcessor) implementations the workbench core
//! orchestrates:
//!
//! ```text
//! grammar text ──► GrammarSource ──► CompiledGrammar ──► GrammarProcessor
//!                                        │                 ├─ scan (longest match)
//!                                        │                 ├─ parse (packrat, ordered choice)
//!                                        ▼                 ├─ syntax analysis (default ASM)
//!                                    TypeModel             └─ semantic analysis (references)
//! ```
//!
//! Grammar, cross-reference and style texts are sentences of the built-in meta languages
//! ([`MetaLanguages`]), so the editors for those definitions are served by the same pipeline.
//!
//! ```rust,ignore
//! let registry = workbench_grammar::language_registry()?;
//! let service = LanguageService::new(registry, ServiceConfig::default());
//! ```

pub mod grammar;
pub mod meta;
pub mod style;
pub mod xref;

mod language;
mod processor;

pub use grammar::{CompiledGrammar, GrammarError, GrammarSource};
pub use language::{GrammarCompiler, language_registry};
pub use meta::MetaLanguages;
pub use processor::GrammarProcessor;
pub use style::style_model_from_asm;
pub use xref::{CrossReferenceModel, Identification, ReferenceDeclaration, resolve_references};

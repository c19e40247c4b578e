//! Grammar definitions and their runtime.
//!
//! This module reads grammar text, compiles it to a [`CompiledGrammar`] and runs it: an
//! on-demand longest-match [`scan`], a scannerless packrat [`parse`] with ordered choice, and
//! the derived type model / default ASM construction.

mod compiler;
mod definition;
mod engine;
mod error;
mod scanner;
mod types;

pub use compiler::{CompiledGrammar, CompiledRule, Expr, RuleId, Terminal, TerminalId};
pub use definition::{GrammarDefinition, GrammarSource, RuleDefinition, RuleItem};
pub use engine::{END_OF_TEXT, MAX_RULE_DEPTH, ParseFailure, expected_at, parse};
pub use error::GrammarError;
pub use scanner::{KEYWORD_TAG, scan};
pub use types::{
    STRING_TYPE, build_asm, derive_type_model, is_transparent, property_name, type_name,
};

//! Issue data model shared by every processing phase.
//!
//! Issues are what inline markers / problem panels render. A failing stage carries its issues in
//! the FAILURE event; a successful stage may still carry warnings.

use serde::{Deserialize, Serialize};

/// A located range in a sentence (char offsets, 0-based line and column).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputLocation {
    /// Start offset in chars from the start of the sentence.
    pub position: usize,
    /// Length in chars.
    pub length: usize,
    /// 0-based line of `position`.
    pub line: usize,
    /// 0-based column of `position` within its line.
    pub column: usize,
}

/// Issue severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum IssueKind {
    /// An error.
    Error,
    /// A warning.
    Warning,
    /// Informational.
    Information,
}

/// The processing phase that produced an issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
    /// Grammar / cross-reference compilation.
    Compile,
    /// Style-sheet compilation.
    Style,
    /// Scanning or parsing a sentence.
    Parse,
    /// Parse tree to ASM.
    SyntaxAnalysis,
    /// ASM checks (references, duplicates, ...).
    SemanticAnalysis,
    /// Code completion.
    Completion,
}

/// A single issue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LanguageIssue {
    /// Severity.
    pub kind: IssueKind,
    /// Phase that produced the issue.
    pub phase: Phase,
    /// Optional location in the processed text.
    pub location: Option<InputLocation>,
    /// Human-readable message.
    pub message: String,
    /// Optional structured payload (e.g. the expected terminals of a parse error).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl LanguageIssue {
    /// Create an error issue.
    pub fn error(phase: Phase, location: Option<InputLocation>, message: impl Into<String>) -> Self {
        Self {
            kind: IssueKind::Error,
            phase,
            location,
            message: message.into(),
            data: None,
        }
    }

    /// Create a warning issue.
    pub fn warning(
        phase: Phase,
        location: Option<InputLocation>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind: IssueKind::Warning,
            phase,
            location,
            message: message.into(),
            data: None,
        }
    }

    /// Create an informational issue.
    pub fn information(
        phase: Phase,
        location: Option<InputLocation>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind: IssueKind::Information,
            phase,
            location,
            message: message.into(),
            data: None,
        }
    }

    /// Attach a structured payload.
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Returns `true` for error issues.
    pub fn is_error(&self) -> bool {
        self.kind == IssueKind::Error
    }
}

/// Returns `true` if any issue is an error.
pub fn has_errors(issues: &[LanguageIssue]) -> bool {
    issues.iter().any(LanguageIssue::is_error)
}

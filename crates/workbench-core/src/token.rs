//! Highlight tokens and per-line tokenizer state.

use serde::{Deserialize, Serialize};

/// A styled span of text.
///
/// `style_classes` behaves as an ordered set: no duplicates, first occurrence wins.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AglToken {
    /// Rendering classes.
    pub style_classes: Vec<String>,
    /// Start offset in chars from the start of the sentence.
    pub position: usize,
    /// Length in chars.
    pub length: usize,
}

impl AglToken {
    /// Create a token, dropping duplicate classes.
    pub fn new(style_classes: Vec<String>, position: usize, length: usize) -> Self {
        let mut unique: Vec<String> = Vec::with_capacity(style_classes.len());
        for class in style_classes {
            if !unique.contains(&class) {
                unique.push(class);
            }
        }
        Self {
            style_classes: unique,
            position,
            length,
        }
    }
}

/// State carried from one line to the next while highlighting line by line.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineState {
    /// Line this state ends; `None` before the first line.
    pub line_number: Option<usize>,
    /// Offset of the first char of the next line.
    pub next_line_start_position: usize,
    /// Trailing text no token consumed, prepended to the next line before scanning.
    pub left_over_text: String,
}

impl LineState {
    /// The state preceding line 0.
    pub fn start() -> Self {
        Self::default()
    }

    /// Create a state.
    pub fn new(
        line_number: Option<usize>,
        next_line_start_position: usize,
        left_over_text: impl Into<String>,
    ) -> Self {
        Self {
            line_number,
            next_line_start_position,
            left_over_text: left_over_text.into(),
        }
    }

    /// The line following this state.
    pub fn next_line(&self) -> usize {
        self.line_number.map_or(0, |n| n + 1)
    }
}

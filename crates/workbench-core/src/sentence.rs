//! Sentence source: the full text of a buffer plus its line boundaries.
//!
//! Positions are **char offsets** from the start of the sentence. Only `\n` terminates a line
//! (a `\r` before it stays part of the line text), so for every line but the last:
//! `line_start(i + 1) == line_start(i) + line_len(i) + 1`.

use crate::issues::InputLocation;
use ropey::Rope;

/// An immutable, line-indexed view over a sentence.
#[derive(Debug, Clone)]
pub struct Sentence {
    rope: Rope,
}

impl Sentence {
    /// Build a sentence from text.
    pub fn new(text: &str) -> Self {
        Self {
            rope: Rope::from_str(text),
        }
    }

    /// Get the complete text.
    pub fn text(&self) -> String {
        self.rope.to_string()
    }

    /// Total number of chars.
    pub fn len_chars(&self) -> usize {
        self.rope.len_chars()
    }

    /// Returns `true` if the sentence is empty.
    pub fn is_empty(&self) -> bool {
        self.rope.len_chars() == 0
    }

    /// Number of lines (an empty sentence, or one ending in `\n`, has a final empty line).
    pub fn line_count(&self) -> usize {
        self.rope.len_lines()
    }

    /// Char offset of the first char of `line` (clamped to the end of the sentence).
    pub fn line_start(&self, line: usize) -> usize {
        if line >= self.rope.len_lines() {
            return self.rope.len_chars();
        }
        self.rope.line_to_char(line)
    }

    /// Length of `line` in chars, excluding its terminator.
    pub fn line_len(&self, line: usize) -> usize {
        if line >= self.rope.len_lines() {
            return 0;
        }
        let slice = self.rope.line(line);
        let len = slice.len_chars();
        if len > 0 && slice.char(len - 1) == '\n' {
            len - 1
        } else {
            len
        }
    }

    /// Text of `line` without its terminator.
    pub fn line_text(&self, line: usize) -> Option<String> {
        if line >= self.rope.len_lines() {
            return None;
        }

        let mut text = self.rope.line(line).to_string();
        if text.ends_with('\n') {
            text.pop();
        }
        Some(text)
    }

    /// Line containing `position` (a position on a terminator belongs to the line it ends).
    pub fn line_of(&self, position: usize) -> usize {
        let position = position.min(self.rope.len_chars());
        self.rope.char_to_line(position)
    }

    /// Convert `(position, length)` into a located range.
    pub fn location(&self, position: usize, length: usize) -> InputLocation {
        let line = self.line_of(position);
        let column = position.min(self.rope.len_chars()) - self.line_start(line);
        InputLocation {
            position,
            length,
            line,
            column,
        }
    }
}

impl From<&str> for Sentence {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_sentence_has_one_line() {
        let s = Sentence::new("");
        assert_eq!(s.line_count(), 1);
        assert_eq!(s.line_text(0).as_deref(), Some(""));
        assert!(s.is_empty());
    }

    #[test]
    fn test_line_boundaries() {
        let s = Sentence::new("aaa bbb  ccc\ndd  eee ffff\nghi");
        assert_eq!(s.line_count(), 3);
        assert_eq!(s.line_start(1), 13);
        assert_eq!(s.line_start(2), 26);
        assert_eq!(s.line_len(0), 12);
        assert_eq!(s.line_text(2).as_deref(), Some("ghi"));
        assert_eq!(s.line_of(12), 0);
        assert_eq!(s.line_of(13), 1);
    }

    #[test]
    fn test_carriage_return_is_line_content() {
        let s = Sentence::new("a\r\nb");
        assert_eq!(s.line_count(), 2);
        assert_eq!(s.line_text(0).as_deref(), Some("a\r"));
        assert_eq!(s.line_start(1), 3);
    }

    #[test]
    fn test_location_of_multibyte_text() {
        let s = Sentence::new("你好\n世界");
        let loc = s.location(4, 1);
        assert_eq!((loc.line, loc.column), (1, 1));
    }
}

//! Incremental, line-by-line tokenizer.
//!
//! Full-sentence token lists arrive from the parse stage through
//! [`IncrementalTokenizer::receive_tokens`]. An editor then asks for one line at a time with the
//! [`LineState`] left by the previous line. Cached tokens are reused only if they still line up
//! with where the line starts and ends; otherwise the line is rescanned locally.

use crate::error::ProcessorResult;
use crate::processor::{LanguageProcessor, Leaf};
use crate::style::StyleHandler;
use crate::token::{AglToken, LineState};
use std::collections::BTreeMap;
use std::panic::{AssertUnwindSafe, catch_unwind};

/// Scanning and styling used when cached tokens cannot be reused.
pub trait LineScanner {
    /// Scan `text`; leaf positions are shifted by `offset`.
    fn scan(&self, text: &str, offset: usize) -> ProcessorResult<Vec<Leaf>>;

    /// Turn leaves into styled tokens.
    fn to_tokens(&self, leaves: &[Leaf]) -> Vec<AglToken>;
}

/// [`LineScanner`] backed by a processor's scanner and an endpoint's style handler.
pub struct ProcessorLineScanner<'a> {
    processor: &'a dyn LanguageProcessor,
    style: &'a StyleHandler,
}

impl<'a> ProcessorLineScanner<'a> {
    /// Create a line scanner.
    pub fn new(processor: &'a dyn LanguageProcessor, style: &'a StyleHandler) -> Self {
        Self { processor, style }
    }
}

impl LineScanner for ProcessorLineScanner<'_> {
    fn scan(&self, text: &str, offset: usize) -> ProcessorResult<Vec<Leaf>> {
        Ok(self.processor.scan(text, offset)?.leaves)
    }

    fn to_tokens(&self, leaves: &[Leaf]) -> Vec<AglToken> {
        self.style.transform_to_tokens(leaves)
    }
}

/// Per-endpoint cache of tokens by line.
#[derive(Debug, Default)]
pub struct IncrementalTokenizer {
    tokens_by_line: BTreeMap<usize, Vec<AglToken>>,
    accepting_tokens: bool,
}

impl IncrementalTokenizer {
    /// Create an empty tokenizer that does not accept tokens yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether [`receive_tokens`](Self::receive_tokens) stores what it is given.
    pub fn accepting_tokens(&self) -> bool {
        self.accepting_tokens
    }

    /// Start or stop accepting tokens.
    pub fn set_accepting_tokens(&mut self, accepting: bool) {
        self.accepting_tokens = accepting;
    }

    /// Drop every cached line and stop accepting tokens until the next run.
    pub fn reset(&mut self) {
        self.tokens_by_line.clear();
        self.accepting_tokens = false;
    }

    /// Store tokens for consecutive lines starting at `start_line`.
    ///
    /// Tokens for line 0 start a new sentence: every previously cached line is dropped first,
    /// so lines past the end of a shorter sentence never survive.
    pub fn receive_tokens(&mut self, start_line: usize, lines: Vec<Vec<AglToken>>) {
        if !self.accepting_tokens {
            tracing::trace!(start_line, lines = lines.len(), "tokenizer not accepting tokens");
            return;
        }
        if start_line == 0 {
            self.tokens_by_line.clear();
        }
        for (index, tokens) in lines.into_iter().enumerate() {
            self.tokens_by_line.insert(start_line + index, tokens);
        }
    }

    /// Cached tokens for a line.
    pub fn tokens_for_line(&self, line: usize) -> Option<&[AglToken]> {
        self.tokens_by_line.get(&line).map(Vec::as_slice)
    }

    /// Number of cached lines.
    pub fn cached_line_count(&self) -> usize {
        self.tokens_by_line.len()
    }

    /// Tokens for the line after `previous`, from the cache when still aligned, else rescanned.
    pub fn get_line_tokens(
        &self,
        line_text: &str,
        previous: &LineState,
        scanner: &dyn LineScanner,
    ) -> (LineState, Vec<AglToken>) {
        let line = previous.next_line();
        match self.tokens_by_line.get(&line) {
            Some(cached) if Self::is_aligned(cached, line_text, previous) => {
                self.use_cached_tokens(cached, line_text, previous)
            }
            _ => self.get_line_tokens_by_scan(line_text, previous, scanner),
        }
    }

    /// Cached tokens are usable only if the first starts where the line starts and the last
    /// (the end-of-line segment) sits on the line end.
    fn is_aligned(cached: &[AglToken], line_text: &str, previous: &LineState) -> bool {
        let (Some(first), Some(last)) = (cached.first(), cached.last()) else {
            return false;
        };
        let start = previous.next_line_start_position;
        first.position == start && last.position == start + line_text.chars().count()
    }

    /// Advance past `line_text` returning `cached` unchanged.
    pub fn use_cached_tokens(
        &self,
        cached: &[AglToken],
        line_text: &str,
        previous: &LineState,
    ) -> (LineState, Vec<AglToken>) {
        let next = previous.next_line_start_position + line_text.chars().count() + 1;
        (
            LineState::new(Some(previous.next_line()), next, ""),
            cached.to_vec(),
        )
    }

    /// Scan `previous.left_over_text + line_text` locally.
    ///
    /// Never fails: a scanner error or panic yields one [`StyleHandler::NO_STYLE`] token
    /// covering the line.
    pub fn get_line_tokens_by_scan(
        &self,
        line_text: &str,
        previous: &LineState,
        scanner: &dyn LineScanner,
    ) -> (LineState, Vec<AglToken>) {
        let line = previous.next_line();
        let line_start = previous.next_line_start_position;
        let line_len = line_text.chars().count();
        let next = line_start + line_len + 1;

        let text = format!("{}{}", previous.left_over_text, line_text);
        let offset = line_start.saturating_sub(previous.left_over_text.chars().count());

        let scanned = catch_unwind(AssertUnwindSafe(|| scanner.scan(&text, offset)));
        let leaves = match scanned {
            Ok(Ok(leaves)) => leaves,
            Ok(Err(err)) => {
                tracing::warn!(line, error = %err, "line scan failed");
                return Self::unstyled(line, line_start, line_len);
            }
            Err(_) => {
                tracing::error!(line, "line scanner panicked");
                return Self::unstyled(line, line_start, line_len);
            }
        };

        let consumed_end = leaves
            .iter()
            .rev()
            .find(|l| !l.is_undefined())
            .map_or(offset, Leaf::end);
        let left_over: String = text
            .chars()
            .skip(consumed_end.saturating_sub(offset))
            .collect();

        let visible: Vec<Leaf> = leaves
            .into_iter()
            .filter(|l| l.end() > line_start)
            .map(|l| clip_start(l, line_start))
            .collect();
        let tokens = scanner.to_tokens(&visible);

        (LineState::new(Some(line), next, left_over), tokens)
    }

    fn unstyled(line: usize, line_start: usize, line_len: usize) -> (LineState, Vec<AglToken>) {
        let tokens = if line_len == 0 {
            Vec::new()
        } else {
            vec![AglToken::new(
                vec![StyleHandler::NO_STYLE.to_string()],
                line_start,
                line_len,
            )]
        };
        (
            LineState::new(Some(line), line_start + line_len + 1, ""),
            tokens,
        )
    }
}

/// Drop the part of a leaf that lies before `start` (carried-over text of the previous line).
fn clip_start(mut leaf: Leaf, start: usize) -> Leaf {
    if leaf.position >= start {
        return leaf;
    }
    let cut = start - leaf.position;
    leaf.text = leaf.text.chars().skip(cut).collect();
    leaf.position = start;
    leaf.length = leaf.length.saturating_sub(cut);
    leaf
}

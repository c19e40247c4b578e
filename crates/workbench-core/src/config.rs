//! Language service configuration.

/// Configuration for [`LanguageService`](crate::pipeline::LanguageService).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    /// Prefix of generated style classes (`<prefix>_<language>-<n>`).
    pub style_class_prefix: String,
    /// Lines per `LineTokens` response for endpoints that register a chunk size of `0`.
    ///
    /// `0` sends all lines in one response.
    pub default_line_tokens_chunk_size: usize,
    /// Messages longer than this (in chars) are truncated in FAILURE events.
    pub max_message_length: usize,
}

impl Default for ServiceConfig {
    /// By default:
    /// - `style_class_prefix` is `"wb"`
    /// - `default_line_tokens_chunk_size` is `0`
    /// - `max_message_length` is `1000`
    fn default() -> Self {
        Self {
            style_class_prefix: "wb".to_string(),
            default_line_tokens_chunk_size: 0,
            max_message_length: 1000,
        }
    }
}

impl ServiceConfig {
    /// Default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the style class prefix.
    pub fn with_style_class_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.style_class_prefix = prefix.into();
        self
    }

    /// Set the fallback line-token chunk size.
    pub fn with_default_line_tokens_chunk_size(mut self, lines: usize) -> Self {
        self.default_line_tokens_chunk_size = lines;
        self
    }

    /// Set the maximum message length.
    pub fn with_max_message_length(mut self, chars: usize) -> Self {
        self.max_message_length = chars;
        self
    }

    /// The chunk size to use for an endpoint that asked for `requested` lines per response.
    pub fn chunk_size(&self, requested: usize) -> usize {
        if requested > 0 {
            requested
        } else {
            self.default_line_tokens_chunk_size
        }
    }

    /// Truncate `message` to [`max_message_length`](Self::max_message_length) chars.
    pub fn truncate_message(&self, message: &str) -> String {
        if message.chars().count() <= self.max_message_length {
            return message.to_string();
        }
        let mut out: String = message.chars().take(self.max_message_length).collect();
        out.push_str("...");
        out
    }
}

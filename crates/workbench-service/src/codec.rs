//! Message framing for the worker boundary.
//!
//! Each message is one JSON value preceded by HTTP-like headers:
//!
//! ```text
//! Content-Length: <n>\r\n
//! \r\n
//! <n bytes of UTF-8 JSON>
//! ```
//!
//! Headers other than `Content-Length` are ignored.

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::io::{self, BufRead, Write};

/// Errors reading or writing framed messages.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The underlying stream failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// A frame body is not the expected JSON.
    #[error("invalid message body: {0}")]
    Json(#[from] serde_json::Error),
    /// The frame headers are malformed, or the stream ended inside a frame.
    #[error("framing error: {0}")]
    Framing(String),
}

impl CodecError {
    /// Whether the stream can still be read after this error.
    ///
    /// A bad body leaves the stream positioned at the next frame; anything else does not.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, CodecError::Json(_))
    }
}

/// Codec settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecConfig {
    /// Largest accepted body in bytes.
    pub max_frame_len: usize,
    /// Write indented JSON.
    pub pretty: bool,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            max_frame_len: 64 * 1024 * 1024,
            pretty: false,
        }
    }
}

impl CodecConfig {
    /// Set the largest accepted body.
    pub fn with_max_frame_len(mut self, max_frame_len: usize) -> Self {
        self.max_frame_len = max_frame_len;
        self
    }

    /// Write indented JSON.
    pub fn with_pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }
}

/// Reads and writes `Content-Length` framed JSON messages.
#[derive(Debug, Clone, Default)]
pub struct MessageCodec {
    config: CodecConfig,
}

impl MessageCodec {
    /// Create a codec.
    pub fn new(config: CodecConfig) -> Self {
        Self { config }
    }

    /// The codec settings.
    pub fn config(&self) -> &CodecConfig {
        &self.config
    }

    /// Write one message to `writer` and flush it.
    pub fn write<W: Write, T: Serialize>(&self, writer: &mut W, value: &T) -> Result<(), CodecError> {
        let body = if self.config.pretty {
            serde_json::to_vec_pretty(value)?
        } else {
            serde_json::to_vec(value)?
        };

        write!(writer, "Content-Length: {}\r\n\r\n", body.len())?;
        writer.write_all(&body)?;
        writer.flush()?;
        Ok(())
    }

    /// Read one message from `reader`.
    ///
    /// Returns `Ok(None)` on end of stream before any header. The body is consumed before it
    /// is decoded, so a [`CodecError::Json`] leaves `reader` at the next frame.
    pub fn read<R: BufRead, T: DeserializeOwned>(
        &self,
        reader: &mut R,
    ) -> Result<Option<T>, CodecError> {
        let Some(body) = self.read_frame(reader)? else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_slice(&body)?))
    }

    /// Read the raw body of one frame.
    pub fn read_frame<R: BufRead>(&self, reader: &mut R) -> Result<Option<Vec<u8>>, CodecError> {
        let mut content_length: Option<usize> = None;
        let mut line = String::new();
        let mut seen_header = false;

        loop {
            line.clear();
            let read = reader.read_line(&mut line)?;
            if read == 0 {
                if seen_header {
                    return Err(CodecError::Framing(
                        "stream ended inside frame headers".to_string(),
                    ));
                }
                return Ok(None);
            }

            let trimmed = line.trim_end_matches(['\r', '\n']);
            if trimmed.is_empty() {
                if seen_header {
                    break;
                }
                // Blank lines between frames.
                continue;
            }
            seen_header = true;

            let Some((name, value)) = trimmed.split_once(':') else {
                return Err(CodecError::Framing(format!("malformed header line '{trimmed}'")));
            };
            if name.trim().eq_ignore_ascii_case("Content-Length") {
                let len = value.trim().parse::<usize>().map_err(|_| {
                    CodecError::Framing(format!("invalid Content-Length '{}'", value.trim()))
                })?;
                content_length = Some(len);
            }
        }

        let len = content_length
            .ok_or_else(|| CodecError::Framing("missing Content-Length header".to_string()))?;
        if len > self.config.max_frame_len {
            return Err(CodecError::Framing(format!(
                "frame of {len} bytes exceeds the limit of {} bytes",
                self.config.max_frame_len
            )));
        }

        let mut body = vec![0u8; len];
        reader.read_exact(&mut body).map_err(|err| match err.kind() {
            io::ErrorKind::UnexpectedEof => {
                CodecError::Framing(format!("stream ended inside a {len} byte body"))
            }
            _ => CodecError::Io(err),
        })?;
        tracing::trace!(bytes = len, "read frame");
        Ok(Some(body))
    }
}

//! Cooperative cancellation for pipeline runs.
//!
//! A [`CancelToken`] is handed to every long-running processor call. Implementations are expected
//! to call [`CancelToken::check`] at bounded intervals and return the error it produces.

use crate::error::ProcessorError;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Generation-scoped cancellation token carrying the interrupt reason.
#[derive(Debug, Clone)]
pub struct CancelToken {
    generation: u64,
    cancel: CancellationToken,
    reason: Arc<Mutex<Option<String>>>,
}

impl CancelToken {
    /// Creates a fresh token for run `generation`.
    pub fn new(generation: u64) -> Self {
        Self {
            generation,
            cancel: CancellationToken::new(),
            reason: Arc::new(Mutex::new(None)),
        }
    }

    /// A token nobody holds a handle to cancel (generation 0).
    pub fn none() -> Self {
        Self::new(0)
    }

    /// Returns the run generation.
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Requests cancellation. The first reason given wins.
    pub fn cancel(&self, reason: impl Into<String>) {
        {
            let mut slot = self.reason.lock();
            if slot.is_none() {
                *slot = Some(reason.into());
            }
        }
        self.cancel.cancel();
    }

    /// Returns true when cancellation is requested on this token or any clone of it.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// The interrupt reason, if cancelled.
    pub fn reason(&self) -> Option<String> {
        if !self.is_cancelled() {
            return None;
        }
        self.reason.lock().clone()
    }

    /// Returns `Err(ProcessorError::Interrupted)` once cancelled.
    pub fn check(&self) -> Result<(), ProcessorError> {
        if self.is_cancelled() {
            return Err(ProcessorError::Interrupted(
                self.reason().unwrap_or_else(|| "cancelled".to_string()),
            ));
        }
        Ok(())
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::none()
    }
}

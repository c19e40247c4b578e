//! Error types for the workbench core.

use crate::identity::{EndPointIdentity, LanguageIdentity};
use thiserror::Error;

/// Errors raised by a [`LanguageProcessor`](crate::processor::LanguageProcessor) stage.
///
/// Recoverable analysis problems (syntax errors in a sentence, unresolved references) are *not*
/// errors: they are issues on a successful call. A `ProcessorError` means the stage could not
/// produce a result at all.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProcessorError {
    /// The run was cancelled through its [`CancelToken`](crate::cancel::CancelToken).
    #[error("interrupted: {0}")]
    Interrupted(String),

    /// The stage failed unexpectedly.
    #[error("{0}")]
    Failed(String),

    /// The language definition was recompiled while a run was using it.
    #[error("Language definition '{0}' changed during processing")]
    DefinitionChanged(LanguageIdentity),
}

/// Language definition registry errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// Built-in definitions cannot be edited.
    #[error("language definition '{0}' is built in and cannot be modified")]
    NotModifiable(LanguageIdentity),

    /// No definition is registered under this identity.
    #[error("unknown language definition '{0}'")]
    UnknownLanguage(LanguageIdentity),
}

/// Errors returned by the direct (non-event) API of the language service.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    /// No session is open for the endpoint.
    #[error("unknown endpoint '{0}'")]
    UnknownEndpoint(EndPointIdentity),

    /// No definition is registered under the identity.
    #[error("unknown language definition '{0}'")]
    UnknownLanguage(LanguageIdentity),

    /// Registry failure.
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Result alias for processor calls.
pub type ProcessorResult<T> = Result<T, ProcessorError>;

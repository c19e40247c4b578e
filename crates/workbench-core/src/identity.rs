//! Identities for editor endpoints and language definitions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies one logical editor session (`editor_id` + `session_id`).
///
/// Endpoints are created when an editor session is established and discarded when it ends.
/// All requests and responses are routed by endpoint.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndPointIdentity {
    /// Identifier of the editor instance.
    pub editor_id: String,
    /// Identifier of the session within that editor.
    pub session_id: String,
}

impl EndPointIdentity {
    /// Create a new endpoint identity.
    pub fn new(editor_id: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            editor_id: editor_id.into(),
            session_id: session_id.into(),
        }
    }
}

impl fmt::Display for EndPointIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.editor_id, self.session_id)
    }
}

/// Name under which a grammar / cross-reference / style trio is registered.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LanguageIdentity(String);

impl LanguageIdentity {
    /// Identity of the built-in grammar meta language.
    pub const GRAMMAR: &'static str = "workbench.grammar";
    /// Identity of the built-in cross-reference meta language.
    pub const CROSS_REFERENCE: &'static str = "workbench.crossReference";
    /// Identity of the built-in style meta language.
    pub const STYLE: &'static str = "workbench.style";

    /// Create a language identity.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The grammar meta language (the language grammars are written in).
    pub fn grammar() -> Self {
        Self::new(Self::GRAMMAR)
    }

    /// The cross-reference meta language.
    pub fn cross_reference() -> Self {
        Self::new(Self::CROSS_REFERENCE)
    }

    /// The style meta language.
    pub fn style() -> Self {
        Self::new(Self::STYLE)
    }

    /// Returns `true` for one of the built-in meta languages.
    pub fn is_meta(&self) -> bool {
        matches!(
            self.0.as_str(),
            Self::GRAMMAR | Self::CROSS_REFERENCE | Self::STYLE
        )
    }

    /// Borrow the identity as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for LanguageIdentity {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for LanguageIdentity {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for LanguageIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

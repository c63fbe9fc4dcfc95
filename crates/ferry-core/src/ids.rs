//! Branded identifier types.
//!
//! Session ids are client-chosen opaque strings. The newtype keeps them
//! from being confused with other string-shaped values at API
//! boundaries; it performs no validation beyond what the URL dispatch
//! layer already guarantees (non-empty, no dots).

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque, client-chosen session identifier.
///
/// Unique per logical session and immutable after creation. The server
/// never interprets its contents.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Wrap a raw id string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The raw id.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl From<String> for SessionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

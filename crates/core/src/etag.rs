//! Version tokens for optimistic concurrency
//!
//! Every successful write stores a freshly generated [`ETag`]. Tokens are
//! random v4 UUIDs, so a key that is deleted and recreated never gets a token
//! it held before.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque version token attached to a stored record
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ETag(String);

impl ETag {
    /// Issue a new token.
    ///
    /// ```
    /// use statestore_core::ETag;
    ///
    /// let a = ETag::generate();
    /// let b = ETag::generate();
    /// assert_ne!(a, b);
    /// ```
    pub fn generate() -> Self {
        ETag(Uuid::new_v4().to_string())
    }

    /// Accept a token supplied by a caller.
    ///
    /// Tokens are opaque, so anything non-empty is accepted; whether it
    /// matches is decided by the store.
    pub fn parse(s: &str) -> Result<Self> {
        if s.is_empty() {
            return Err(Error::InvalidRequest("etag must not be empty".into()));
        }
        Ok(ETag(s.to_string()))
    }

    /// Wrap a token read back from the store.
    pub fn from_stored(s: String) -> Self {
        ETag(s)
    }

    /// Get the token text
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ETag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<ETag> for String {
    fn from(etag: ETag) -> Self {
        etag.0
    }
}

//! Operation keys.

use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Opaque identifier for one logical upstream request.
///
/// Keys are caller-defined. Two requests that should share work must produce
/// the same key; the registry never inspects request content itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationKey(String);

impl OperationKey {
    /// Wraps an existing identifier.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Derives a key from request content as the lowercase hex SHA-256 digest.
    ///
    /// Byte-identical request bodies map to the same key, which lets callers
    /// deduplicate concurrent identical requests.
    #[must_use]
    pub fn from_content(content: impl AsRef<[u8]>) -> Self {
        let digest = Sha256::digest(content.as_ref());
        Self(hex::encode(digest))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OperationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for OperationKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for OperationKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<String> for OperationKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

impl From<&str> for OperationKey {
    fn from(key: &str) -> Self {
        Self(key.to_string())
    }
}

impl From<&String> for OperationKey {
    fn from(key: &String) -> Self {
        Self(key.clone())
    }
}

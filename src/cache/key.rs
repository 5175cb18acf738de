//! Cache keys
//!
//! Encoded as `partition ++ key ++ version (u64 LE)`. Two keys are equal iff
//! their encoded bytes are equal, so bumping the version yields a fresh key
//! generation without touching older entries.

use std::fmt;

#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    encoded: Vec<u8>,
}

impl CacheKey {
    pub fn new(partition: impl AsRef<[u8]>, key: impl AsRef<[u8]>, version: u64) -> Self {
        let partition = partition.as_ref();
        let key = key.as_ref();

        let mut encoded = Vec::with_capacity(partition.len() + key.len() + 8);
        encoded.extend_from_slice(partition);
        encoded.extend_from_slice(key);
        encoded.extend_from_slice(&version.to_le_bytes());
        Self { encoded }
    }

    /// Key in the default (empty) partition at version 0
    pub fn simple(key: impl AsRef<[u8]>) -> Self {
        Self::new(b"", key, 0)
    }

    /// Rebuild a key from its encoded form
    pub fn from_encoded(encoded: Vec<u8>) -> Self {
        Self { encoded }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.encoded
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.encoded
    }

    /// Trailing version, if the encoding is long enough to carry one
    pub fn version(&self) -> Option<u64> {
        let start = self.encoded.len().checked_sub(8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&self.encoded[start..]);
        Some(u64::from_le_bytes(raw))
    }
}

impl From<&str> for CacheKey {
    fn from(key: &str) -> Self {
        Self::simple(key)
    }
}

impl From<String> for CacheKey {
    fn from(key: String) -> Self {
        Self::simple(key)
    }
}

impl fmt::Debug for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CacheKey({})", String::from_utf8_lossy(&self.encoded))
    }
}

//! Cache entry types
//!
//! `CacheIndexEntry` is the in-memory record describing where a value lives
//! in the mapped file; `Entry<T>` is what callers get back.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};

use crate::clock::to_millis;

/// Eviction priority. `NeverRemove` entries ignore expiration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    NeverRemove,
}

/// Typed metadata value attached to a cache entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MetadataValue {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Bytes(Vec<u8>),
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        MetadataValue::String(value.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        MetadataValue::String(value)
    }
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        MetadataValue::Int(value)
    }
}

impl From<f64> for MetadataValue {
    fn from(value: f64) -> Self {
        MetadataValue::Float(value)
    }
}

impl From<bool> for MetadataValue {
    fn from(value: bool) -> Self {
        MetadataValue::Bool(value)
    }
}

pub type Metadata = BTreeMap<String, MetadataValue>;

/// Per-call options for `set` / `get_or_create`.
///
/// Unset expiration and priority fall back to the store's `Config` defaults.
#[derive(Debug, Clone, Default)]
pub struct EntryOptions {
    /// Fixed deadline
    pub absolute_expiration: Option<SystemTime>,
    /// Deadline relative to the time of `set`; ignored if `absolute_expiration` is set
    pub time_to_live: Option<Duration>,
    pub sliding_expiration: Option<Duration>,
    pub priority: Option<Priority>,
    /// Compress regardless of size
    pub enable_compression: bool,
    pub metadata: Metadata,
}

impl EntryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn expires_at(mut self, deadline: SystemTime) -> Self {
        self.absolute_expiration = Some(deadline);
        self
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.time_to_live = Some(ttl);
        self
    }

    pub fn sliding(mut self, window: Duration) -> Self {
        self.sliding_expiration = Some(window);
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn compressed(mut self) -> Self {
        self.enable_compression = true;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Absolute deadline in unix millis, if any
    pub(crate) fn resolve_deadline(&self, now: u64, default_ttl: Option<Duration>) -> Option<u64> {
        if let Some(deadline) = self.absolute_expiration {
            return Some(to_millis(deadline));
        }
        self.time_to_live
            .or(default_ttl)
            .map(|ttl| now.saturating_add(ttl.as_millis() as u64))
    }
}

/// Index record for one cached value
#[derive(Debug)]
pub struct CacheIndexEntry {
    /// Offset of the payload in the mapped file
    pub position: u64,
    /// Stored (possibly compressed) payload length
    pub size: u32,
    pub created_at: u64,
    last_accessed: AtomicU64,
    pub absolute_expiration: Option<u64>,
    pub sliding_expiration: Option<Duration>,
    pub is_compressed: bool,
    pub priority: Priority,
    pub metadata: Metadata,
}

impl CacheIndexEntry {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        position: u64,
        size: u32,
        created_at: u64,
        last_accessed: u64,
        absolute_expiration: Option<u64>,
        sliding_expiration: Option<Duration>,
        is_compressed: bool,
        priority: Priority,
        metadata: Metadata,
    ) -> Self {
        Self {
            position,
            size,
            created_at,
            last_accessed: AtomicU64::new(last_accessed),
            absolute_expiration,
            sliding_expiration,
            is_compressed,
            priority,
            metadata,
        }
    }

    pub fn last_accessed(&self) -> u64 {
        self.last_accessed.load(Ordering::Relaxed)
    }

    /// Refresh the access time. Safe under a shared lock.
    pub fn touch(&self, now: u64) {
        self.last_accessed.fetch_max(now, Ordering::Relaxed);
    }

    pub fn is_expired(&self, now: u64) -> bool {
        if self.priority == Priority::NeverRemove {
            return false;
        }
        if let Some(deadline) = self.absolute_expiration {
            if now >= deadline {
                return true;
            }
        }
        if let Some(window) = self.sliding_expiration {
            let deadline = self.last_accessed().saturating_add(window.as_millis() as u64);
            if now >= deadline {
                return true;
            }
        }
        false
    }

    /// Caller-facing view of this entry carrying `value`
    pub(crate) fn to_entry<T>(&self, value: T) -> Entry<T> {
        Entry {
            value,
            metadata: self.metadata.clone(),
            priority: self.priority,
            created_at: self.created_at,
            last_accessed: self.last_accessed(),
            absolute_expiration: self.absolute_expiration,
            is_compressed: self.is_compressed,
        }
    }
}

/// A value read from (or just written to) the cache
#[derive(Debug, Clone, PartialEq)]
pub struct Entry<T> {
    pub value: T,
    pub metadata: Metadata,
    pub priority: Priority,
    /// unix millis
    pub created_at: u64,
    /// unix millis
    pub last_accessed: u64,
    /// unix millis
    pub absolute_expiration: Option<u64>,
    pub is_compressed: bool,
}

impl<T> Entry<T> {
    pub fn into_value(self) -> T {
        self.value
    }

    pub(crate) fn with_value<U>(self, value: U) -> Entry<U> {
        Entry {
            value,
            metadata: self.metadata,
            priority: self.priority,
            created_at: self.created_at,
            last_accessed: self.last_accessed,
            absolute_expiration: self.absolute_expiration,
            is_compressed: self.is_compressed,
        }
    }
}

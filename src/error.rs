//! Error types for mapstore
//!
//! Provides a unified error type for all operations.

use std::path::PathBuf;

use thiserror::Error;
use uuid::Uuid;

/// Result type alias using MapStoreError
pub type Result<T> = std::result::Result<T, MapStoreError>;

/// Unified error type for mapstore operations
#[derive(Debug, Error)]
pub enum MapStoreError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Mapping, growing, or flushing the backing file failed
    #[error("Storage I/O error during {operation}: {source}")]
    StorageIo {
        operation: &'static str,
        #[source]
        source: std::io::Error,
    },

    // -------------------------------------------------------------------------
    // Record Errors
    // -------------------------------------------------------------------------
    #[error("Corrupt record: {0}")]
    CorruptRecord(String),

    /// Header string fields did not fit the fixed header budget
    #[error("Record header needs {required} bytes but only {budget} are available")]
    HeaderOverflow { required: usize, budget: usize },

    // -------------------------------------------------------------------------
    // Cache Errors
    // -------------------------------------------------------------------------
    #[error("Failed to {operation} value of type {value_type}: {reason}")]
    CacheSerialization {
        value_type: &'static str,
        operation: &'static str,
        reason: String,
    },

    #[error("Cache capacity exceeded: requested {requested} bytes, {available} available")]
    CacheCapacity { requested: u64, available: u64 },

    #[error("Cache file {path:?}: {operation} failed: {source}")]
    CacheFile {
        path: PathBuf,
        operation: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("Compression error: {0}")]
    Compression(String),

    // -------------------------------------------------------------------------
    // Event Store Errors
    // -------------------------------------------------------------------------
    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    #[error("Version conflict on aggregate {aggregate_id}: last version {last_version}, attempted {attempted}")]
    VersionConflict {
        aggregate_id: Uuid,
        last_version: i64,
        attempted: i64,
    },

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),

    // -------------------------------------------------------------------------
    // Control Flow
    // -------------------------------------------------------------------------
    #[error("Operation cancelled")]
    Cancelled,
}

impl MapStoreError {
    /// Wrap an I/O error raised while manipulating the mapped region
    pub(crate) fn storage(operation: &'static str, source: std::io::Error) -> Self {
        MapStoreError::StorageIo { operation, source }
    }

    /// True for the cancellation abort, which callers usually treat as non-fatal
    pub fn is_cancelled(&self) -> bool {
        matches!(self, MapStoreError::Cancelled)
    }
}

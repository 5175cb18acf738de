//! Configuration for mapstore
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;
use std::time::Duration;

use crate::cache::Priority;
use crate::error::{MapStoreError, Result};

/// Smallest backing file we are willing to map
pub const MIN_FILE_SIZE: u64 = 4 * 1024;

/// Main configuration shared by the cache store and the event store
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // File Configuration
    // -------------------------------------------------------------------------
    /// Root directory for all data files
    /// Internal structure:
    ///   {data_dir}/
    ///     ├── cache.dat        (memory-mapped cache payloads + index blob)
    ///     └── events.log       (append-only event log)
    pub data_dir: PathBuf,

    /// Size the backing files are created with (bytes)
    pub initial_file_size: u64,

    /// Upper bound for the cache file; allocations beyond it fail
    pub max_file_size: u64,

    /// How often the mapped region is flushed to disk
    pub sync_strategy: SyncStrategy,

    // -------------------------------------------------------------------------
    // Cache Entry Defaults
    // -------------------------------------------------------------------------
    /// Applied when `EntryOptions` leaves absolute expiration unset
    pub default_absolute_expiration: Option<Duration>,

    /// Applied when `EntryOptions` leaves sliding expiration unset
    pub default_sliding_expiration: Option<Duration>,

    pub default_priority: Priority,

    // -------------------------------------------------------------------------
    // Compression / Compaction
    // -------------------------------------------------------------------------
    /// Compress every value, regardless of size
    pub compression_enabled: bool,

    /// Values whose encoded length exceeds this are compressed anyway
    pub compression_threshold: usize,

    /// free bytes / write cursor ratio that triggers compaction
    pub fragmentation_threshold: f64,

    // -------------------------------------------------------------------------
    // Event Store Configuration
    // -------------------------------------------------------------------------
    /// Capacity of the recent-sequence ring (rounded up to a power of two)
    pub ring_buffer_capacity: usize,

    /// Parallelism hint for consumers of published events. Not used by the
    /// engine itself.
    pub max_parallelism: usize,
}

/// Flush strategy for the mapped region
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStrategy {
    /// msync after every write (safest, slowest)
    EveryWrite,

    /// msync after N writes (balanced durability/performance)
    EveryNWrites { count: usize },
}

impl SyncStrategy {
    /// Whether the `writes`-th write since the last flush should flush
    pub fn should_sync(&self, writes: usize) -> bool {
        match self {
            SyncStrategy::EveryWrite => true,
            SyncStrategy::EveryNWrites { count } => writes >= *count,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./mapstore_data"),
            initial_file_size: 64 * 1024,        // 64 KB
            max_file_size: 1024 * 1024 * 1024,   // 1 GB
            sync_strategy: SyncStrategy::EveryNWrites { count: 100 },
            default_absolute_expiration: None,
            default_sliding_expiration: None,
            default_priority: Priority::Normal,
            compression_enabled: false,
            compression_threshold: 1024,
            fragmentation_threshold: 0.30,
            ring_buffer_capacity: 1024,
            max_parallelism: 4,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Reject values no store can operate with
    pub fn validate(&self) -> Result<()> {
        if self.initial_file_size < MIN_FILE_SIZE {
            return Err(MapStoreError::Config(format!(
                "initial_file_size must be at least {} bytes, got {}",
                MIN_FILE_SIZE, self.initial_file_size
            )));
        }
        if self.max_file_size < self.initial_file_size {
            return Err(MapStoreError::Config(format!(
                "max_file_size ({}) is smaller than initial_file_size ({})",
                self.max_file_size, self.initial_file_size
            )));
        }
        if !(self.fragmentation_threshold > 0.0 && self.fragmentation_threshold <= 1.0) {
            return Err(MapStoreError::Config(format!(
                "fragmentation_threshold must be in (0, 1], got {}",
                self.fragmentation_threshold
            )));
        }
        if self.ring_buffer_capacity == 0 {
            return Err(MapStoreError::Config(
                "ring_buffer_capacity must be non-zero".to_string(),
            ));
        }
        if self.max_parallelism == 0 {
            return Err(MapStoreError::Config(
                "max_parallelism must be at least 1".to_string(),
            ));
        }
        if let SyncStrategy::EveryNWrites { count: 0 } = self.sync_strategy {
            return Err(MapStoreError::Config(
                "EveryNWrites count must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory (root for all storage)
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the initial backing file size (in bytes)
    pub fn initial_file_size(mut self, size: u64) -> Self {
        self.config.initial_file_size = size;
        self
    }

    /// Set the maximum cache file size (in bytes)
    pub fn max_file_size(mut self, size: u64) -> Self {
        self.config.max_file_size = size;
        self
    }

    /// Set the sync strategy
    pub fn sync_strategy(mut self, strategy: SyncStrategy) -> Self {
        self.config.sync_strategy = strategy;
        self
    }

    pub fn default_absolute_expiration(mut self, ttl: Duration) -> Self {
        self.config.default_absolute_expiration = Some(ttl);
        self
    }

    pub fn default_sliding_expiration(mut self, window: Duration) -> Self {
        self.config.default_sliding_expiration = Some(window);
        self
    }

    pub fn default_priority(mut self, priority: Priority) -> Self {
        self.config.default_priority = priority;
        self
    }

    /// Enable compression for every value
    pub fn compression_enabled(mut self, enabled: bool) -> Self {
        self.config.compression_enabled = enabled;
        self
    }

    /// Set the size above which values are always compressed
    pub fn compression_threshold(mut self, bytes: usize) -> Self {
        self.config.compression_threshold = bytes;
        self
    }

    /// Set the fragmentation ratio that triggers compaction
    pub fn fragmentation_threshold(mut self, ratio: f64) -> Self {
        self.config.fragmentation_threshold = ratio;
        self
    }

    /// Set the sequence ring capacity
    pub fn ring_buffer_capacity(mut self, capacity: usize) -> Self {
        self.config.ring_buffer_capacity = capacity;
        self
    }

    pub fn max_parallelism(mut self, workers: usize) -> Self {
        self.config.max_parallelism = workers;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

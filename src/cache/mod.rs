//! Cache Module
//!
//! Persistent, memory-mapped, self-compacting key/value cache.
//!
//! ## Responsibilities
//! - get/set/remove/get-or-create over typed values
//! - Lazy absolute and sliding expiration (checked on read, never swept)
//! - Optional LZ4 compression of large values
//! - Best-fit reuse of freed regions, compaction past a fragmentation ratio
//! - Index persistence across restarts
//!
//! ## Entry Lifecycle
//! ```text
//!   Absent ──set──▶ Present ──get (expired)──▶ Absent
//!                   │  ▲   └──remove─────────▶ Absent
//!                   └──┘ set (overwrite) / get (touch)
//! ```

mod entry;
mod index;
mod key;
mod store;

pub use entry::{CacheIndexEntry, Entry, EntryOptions, Metadata, MetadataValue, Priority};
pub use index::CACHE_HEADER_SIZE;
pub use key::CacheKey;
pub use store::{CacheStats, CacheStore, CompactionReport};

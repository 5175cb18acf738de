//! # mapstore
//!
//! An embedded storage engine with:
//! - A persistent, memory-mapped key/value cache with lazy expiration,
//!   LZ4 compression, best-fit space reuse, and compaction
//! - An append-only event log with per-aggregate replay and crash recovery
//! - Shared-read / exclusive-write locking per store instance
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Host application                           │
//! │          (get/set/remove, append/get_events)                 │
//! └──────────────┬──────────────────────────────┬───────────────┘
//!                │                              │
//!                ▼                              ▼
//!   ┌────────────────────────┐      ┌────────────────────────┐
//!   │      CacheStore        │      │      EventStore        │
//!   │  index + compaction    │      │  aggregate/type index  │
//!   │       (RwLock)         │      │  ring + (RwLock)       │
//!   └───────┬───────┬────────┘      └──────┬────────┬────────┘
//!           │       │                      │        │
//!           ▼       ▼                      ▼        ▼
//!   ┌────────────┐ ┌────────────┐   ┌────────────┐ ┌────────────┐
//!   │ Allocator  │ │   Codec    │   │   Codec    │ │ RingBuffer │
//!   │ (best-fit) │ │ (value/LZ4)│   │ (128B hdr) │ │            │
//!   └─────┬──────┘ └────────────┘   └────────────┘ └────────────┘
//!         │                                │
//!         ▼                                ▼
//!   ┌─────────────────────────────────────────────────────────┐
//!   │                 MappedFile (memmap2)                     │
//!   └─────────────────────────────────────────────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;
pub mod cancel;

mod clock;

pub mod storage;
pub mod ring;
pub mod codec;
pub mod cache;
pub mod events;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use cache::{CacheKey, CacheStore, Entry, EntryOptions, Priority};
pub use cancel::CancellationToken;
pub use config::{Config, SyncStrategy};
pub use error::{MapStoreError, Result};
pub use events::{EventDescriptor, EventStore};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of mapstore
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

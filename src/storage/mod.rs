//! Storage Module
//!
//! Raw byte-addressable backing file plus the bookkeeping that hands out
//! regions of it.
//!
//! ## Responsibilities
//! - Map a growable file into memory (`MappedFile`)
//! - Track used/free byte ranges with best-fit reuse (`RegionAllocator`)
//! - Report fragmentation so owners can decide when to compact
//!
//! ## Region Layout
//! ```text
//! ┌────────────┬──────────┬──────┬──────────┬──────┬───────────┐
//! │ reserved   │ region A │ free │ region B │ free │ unwritten │
//! └────────────┴──────────┴──────┴──────────┴──────┴───────────┘
//! 0            base                                ▲ write cursor
//! ```
//! Freed ranges never move the cursor back; only compaction does.

mod allocator;
mod mapped;

pub use allocator::{Allocation, FreeSpaceEntry, RegionAllocator};
pub use mapped::MappedFile;

//! Event Store Module
//!
//! Append-only event log over a memory-mapped file.
//!
//! ## Responsibilities
//! - Append immutable events with store-assigned, monotonic sequences
//! - Per-aggregate and per-type position indexes
//! - Recent-sequence lookup through a ring buffer
//! - Index reconstruction by scanning the log on startup
//!
//! ## File Format
//! ```text
//! ┌─────────────────────────────────────────┐
//! │ Event 1                                 │
//! │ ┌───────────────────┬─────────────────┐ │
//! │ │ Header (128)      │ Payload (len)   │ │
//! │ └───────────────────┴─────────────────┘ │
//! ├─────────────────────────────────────────┤
//! │ Event 2 ...                             │
//! ├─────────────────────────────────────────┤
//! │ Header with data_length = 0 (end)       │
//! └─────────────────────────────────────────┘
//! ```

mod descriptor;
mod recovery;
mod store;
mod stream;

pub use descriptor::EventDescriptor;
pub use recovery::{verify, RecoveryReport};
pub use store::EventStore;
pub use stream::EventStream;

//! Ring Buffer Module
//!
//! Fixed-capacity, overwrite-oldest circular buffer addressed by sequence
//! number.
//!
//! ## Responsibilities
//! - Hold the last N items written
//! - Never reject a write: once full, the oldest item is evicted
//! - Answer "is sequence S still resident?" in O(1)
//!
//! ## Layout
//! ```text
//!   capacity = 8 (always a power of two), mask = 7
//!
//!   slot:  0    1    2    3    4    5    6    7
//!        ┌────┬────┬────┬────┬────┬────┬────┬────┐
//!        │ s8 │ s9 │ s2 │ s3 │ s4 │ s5 │ s6 │ s7 │
//!        └────┴────┴────┴────┴────┴────┴────┴────┘
//!                   ▲ oldest = 2        next = 10
//! ```
//! Sequence `s` lives in slot `s & mask`.

mod buffer;

pub use buffer::RingBuffer;

//! Region allocator
//!
//! Hands out byte ranges of the backing file. Freed ranges are kept in a set
//! ordered by `(size, position)` so the best fit for a request is the first
//! entry at or above the requested size.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// A reclaimable byte range.
///
/// Field order matters: the derived `Ord` sorts by size first, which is what
/// best-fit lookup relies on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FreeSpaceEntry {
    pub size: u32,
    pub position: u64,
}

/// Result of a successful `allocate` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Allocation {
    pub position: u64,
    pub size: u32,
    /// Free block this allocation was carved from, if any
    reused: Option<FreeSpaceEntry>,
}

impl Allocation {
    /// True when the allocation reused a freed region instead of growing
    pub fn is_reused(&self) -> bool {
        self.reused.is_some()
    }
}

/// Best-fit allocator over a single growable file
#[derive(Debug, Clone)]
pub struct RegionAllocator {
    /// First allocatable offset (bytes below are reserved for headers)
    base: u64,
    /// Next never-used offset
    cursor: u64,
    free: BTreeSet<FreeSpaceEntry>,
    free_bytes: u64,
}

impl RegionAllocator {
    /// Empty allocator whose first region starts at `base`
    pub fn new(base: u64) -> Self {
        Self {
            base,
            cursor: base,
            free: BTreeSet::new(),
            free_bytes: 0,
        }
    }

    /// Rebuild allocator state from persisted bookkeeping
    pub fn restore(base: u64, cursor: u64, free: impl IntoIterator<Item = FreeSpaceEntry>) -> Self {
        let mut allocator = Self::new(base);
        allocator.cursor = cursor.max(base);
        for entry in free {
            allocator.free(entry.position, entry.size);
        }
        allocator
    }

    /// Allocate `size` bytes: best-fit from the free set, else at the cursor.
    ///
    /// Any tail of a larger free block that is not needed goes back into the
    /// free set.
    pub fn allocate(&mut self, size: u32) -> Allocation {
        let probe = FreeSpaceEntry { size, position: 0 };
        let best = self.free.range(probe..).next().copied();

        if let Some(block) = best {
            self.free.remove(&block);
            self.free_bytes -= block.size as u64;

            let remainder = block.size - size;
            if remainder > 0 {
                self.insert_free(block.position + size as u64, remainder);
            }

            return Allocation {
                position: block.position,
                size,
                reused: Some(block),
            };
        }

        let position = self.cursor;
        self.cursor += size as u64;
        Allocation {
            position,
            size,
            reused: None,
        }
    }

    /// Best-fit size that `allocate` would reuse, without allocating
    pub fn best_fit(&self, size: u32) -> Option<FreeSpaceEntry> {
        let probe = FreeSpaceEntry { size, position: 0 };
        self.free.range(probe..).next().copied()
    }

    /// Return a region to the free set
    pub fn free(&mut self, position: u64, size: u32) {
        if size == 0 {
            return;
        }
        self.insert_free(position, size);
    }

    /// Undo the most recent `allocate`, used when the write that followed it
    /// failed. Must be called before any further allocation.
    pub fn rollback(&mut self, allocation: Allocation) {
        match allocation.reused {
            Some(block) => {
                let remainder = block.size - allocation.size;
                if remainder > 0 {
                    let tail = FreeSpaceEntry {
                        size: remainder,
                        position: block.position + allocation.size as u64,
                    };
                    if self.free.remove(&tail) {
                        self.free_bytes -= remainder as u64;
                    }
                }
                self.insert_free(block.position, block.size);
            }
            None => {
                if self.cursor == allocation.position + allocation.size as u64 {
                    self.cursor = allocation.position;
                }
            }
        }
    }

    /// Forget all free space and move the cursor (after compaction)
    pub fn reset(&mut self, cursor: u64) {
        self.free.clear();
        self.free_bytes = 0;
        self.cursor = cursor.max(self.base);
    }

    /// `sum(free sizes) / write cursor`
    pub fn fragmentation_ratio(&self) -> f64 {
        if self.cursor == 0 {
            return 0.0;
        }
        self.free_bytes as f64 / self.cursor as f64
    }

    pub fn write_cursor(&self) -> u64 {
        self.cursor
    }

    pub fn base(&self) -> u64 {
        self.base
    }

    pub fn free_bytes(&self) -> u64 {
        self.free_bytes
    }

    pub fn free_block_count(&self) -> usize {
        self.free.len()
    }

    /// Free blocks in ascending size order
    pub fn free_entries(&self) -> Vec<FreeSpaceEntry> {
        self.free.iter().copied().collect()
    }

    fn insert_free(&mut self, position: u64, size: u32) {
        if self.free.insert(FreeSpaceEntry { size, position }) {
            self.free_bytes += size as u64;
        }
    }
}

//! RingBuffer implementation

/// Bounded sequence cache. Not internally synchronized; owners wrap it in
/// their own lock.
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    slots: Vec<Option<T>>,
    mask: u64,
    /// Sequence the next `push` will receive
    next_sequence: u64,
    len: usize,
}

impl<T> RingBuffer<T> {
    /// Create a buffer holding at least `capacity` items (rounded up to the
    /// next power of two, minimum 1). Sequences start at 0.
    pub fn new(capacity: usize) -> Self {
        Self::with_start_sequence(capacity, 0)
    }

    /// Like `new`, but the first pushed item receives `first_sequence`
    pub fn with_start_sequence(capacity: usize, first_sequence: u64) -> Self {
        let capacity = capacity.max(1).next_power_of_two();
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);

        Self {
            slots,
            mask: capacity as u64 - 1,
            next_sequence: first_sequence,
            len: 0,
        }
    }

    /// Write an item, evicting the oldest if full. Returns its sequence.
    pub fn push(&mut self, item: T) -> u64 {
        let sequence = self.next_sequence;
        self.slots[(sequence & self.mask) as usize] = Some(item);
        self.next_sequence += 1;
        if self.len < self.slots.len() {
            self.len += 1;
        }
        sequence
    }

    /// Item written with `sequence`, or `None` if it was evicted or not yet
    /// written
    pub fn try_peek(&self, sequence: u64) -> Option<&T> {
        let oldest = self.oldest_sequence()?;
        if sequence < oldest || sequence >= self.next_sequence {
            return None;
        }
        self.slots[(sequence & self.mask) as usize].as_ref()
    }

    /// Remove and return the oldest resident item
    pub fn pop_oldest(&mut self) -> Option<T> {
        let oldest = self.oldest_sequence()?;
        self.len -= 1;
        self.slots[(oldest & self.mask) as usize].take()
    }

    /// Most recently written item
    pub fn newest(&self) -> Option<&T> {
        if self.len == 0 {
            return None;
        }
        self.try_peek(self.next_sequence - 1)
    }

    /// Sequence of the oldest resident item
    pub fn oldest_sequence(&self) -> Option<u64> {
        if self.len == 0 {
            None
        } else {
            Some(self.next_sequence - self.len as u64)
        }
    }

    pub fn next_sequence(&self) -> u64 {
        self.next_sequence
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len == self.slots.len()
    }

    /// Resident items, oldest first, paired with their sequences
    pub fn iter(&self) -> impl Iterator<Item = (u64, &T)> + '_ {
        let start = self.next_sequence - self.len as u64;
        (start..self.next_sequence)
            .filter_map(move |seq| self.slots[(seq & self.mask) as usize].as_ref().map(|item| (seq, item)))
    }

    /// Drop every item; sequence numbering continues where it left off
    pub fn clear(&mut self) {
        for slot in &mut self.slots {
            *slot = None;
        }
        self.len = 0;
    }
}

//! Lazy event streams
//!
//! A stream owns a snapshot of the position list taken when it was created and
//! reads one record per `next()`, taking the store's shared lock only for
//! that read. Events appended after creation are not included.

use crate::cancel::CancellationToken;
use crate::error::{MapStoreError, Result};

use super::{EventDescriptor, EventStore};

/// Iterator over events at fixed log positions
pub struct EventStream<'a> {
    store: &'a EventStore,
    positions: Vec<u64>,
    next: usize,
    from_version: i64,
    cancel: Option<CancellationToken>,
    finished: bool,
}

impl<'a> EventStream<'a> {
    pub(crate) fn new(
        store: &'a EventStore,
        positions: Vec<u64>,
        from_version: i64,
        cancel: Option<CancellationToken>,
    ) -> Self {
        Self {
            store,
            positions,
            next: 0,
            from_version,
            cancel,
            finished: false,
        }
    }

    /// Positions not yet visited
    pub fn remaining(&self) -> usize {
        self.positions.len().saturating_sub(self.next)
    }
}

impl<'a> Iterator for EventStream<'a> {
    type Item = Result<EventDescriptor>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.finished {
                return None;
            }

            if self.cancel.as_ref().map_or(false, |token| token.is_cancelled()) {
                self.finished = true;
                return Some(Err(MapStoreError::Cancelled));
            }

            let Some(&position) = self.positions.get(self.next) else {
                self.finished = true;
                return None;
            };
            self.next += 1;

            match self.store.read_event_at(position) {
                Ok(event) if event.version < self.from_version => continue,
                Ok(event) => return Some(Ok(event)),
                Err(e) => {
                    self.finished = true;
                    return Some(Err(e));
                }
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.finished {
            (0, Some(0))
        } else {
            (0, Some(self.remaining() + 1))
        }
    }
}

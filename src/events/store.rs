//! Append-only event store
//!
//! ## Concurrency Model
//!
//! - `append` takes the exclusive lock for the write and index update
//! - Streams and lookups take the shared lock one record at a time
//! - `last_sequence` is an atomic so it can be read without the lock

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use uuid::Uuid;

use crate::cancel::CancellationToken;
use crate::codec::{decode_event, encode_event, EventHeader, EVENT_HEADER_SIZE};
use crate::config::{Config, SyncStrategy};
use crate::error::{MapStoreError, Result};
use crate::ring::RingBuffer;
use crate::storage::MappedFile;

use super::recovery::{self, RecoveryReport};
use super::{EventDescriptor, EventStream};

/// Zeroed header written after every record so the next scan stops there
const END_MARKER: [u8; EVENT_HEADER_SIZE] = [0u8; EVENT_HEADER_SIZE];

/// Insert-only event log over a memory-mapped file
pub struct EventStore {
    config: Config,
    path: PathBuf,
    state: RwLock<EventState>,
    /// Last assigned sequence (0 before the first append)
    last_sequence: AtomicU64,
    recovery: RecoveryReport,
}

struct EventState {
    file: MappedFile,
    index: EventIndex,
    /// Next append offset
    current_position: u64,
    writes_since_sync: usize,
}

/// In-memory indexes, rebuildable from the log at any time
struct EventIndex {
    aggregates: HashMap<Uuid, AggregateStream>,
    types: HashMap<String, Vec<u64>>,
    recent: RingBuffer<SequenceSlot>,
    event_count: u64,
}

struct AggregateStream {
    positions: Vec<u64>,
    last_version: i64,
}

#[derive(Debug, Clone, Copy)]
struct SequenceSlot {
    sequence: u64,
    position: u64,
}

impl EventIndex {
    fn new(ring_capacity: usize) -> Self {
        Self {
            aggregates: HashMap::new(),
            types: HashMap::new(),
            recent: RingBuffer::with_start_sequence(ring_capacity, 1),
            event_count: 0,
        }
    }

    fn record(&mut self, position: u64, sequence: u64, aggregate_id: Uuid, version: i64, event_type: &str) {
        let stream = self
            .aggregates
            .entry(aggregate_id)
            .or_insert_with(|| AggregateStream {
                positions: Vec::new(),
                last_version: i64::MIN,
            });
        stream.positions.push(position);
        stream.last_version = stream.last_version.max(version);

        match self.types.get_mut(event_type) {
            Some(positions) => positions.push(position),
            None => {
                self.types.insert(event_type.to_string(), vec![position]);
            }
        }

        self.recent.push(SequenceSlot { sequence, position });
        self.event_count += 1;
    }

    fn record_header(&mut self, position: u64, header: &EventHeader) {
        self.record(
            position,
            header.sequence,
            header.aggregate_id,
            header.version,
            &header.event_type,
        );
    }
}

impl EventStore {
    const EVENTS_FILENAME: &'static str = "events.log";

    /// Open or create the event log in `config.data_dir`, rebuilding indexes
    /// from whatever is already on disk
    pub fn open(config: Config) -> Result<Self> {
        Self::open_with_cancel(config, &CancellationToken::new())
    }

    /// Open with a path (convenience method)
    ///
    /// Uses default config with the specified data directory
    pub fn open_path(path: &Path) -> Result<Self> {
        let mut config = Config::default();
        config.data_dir = path.to_path_buf();
        Self::open(config)
    }

    /// Like `open`, but the startup scan aborts with `Cancelled` once `cancel`
    /// fires. Nothing on disk is modified by an aborted open.
    pub fn open_with_cancel(config: Config, cancel: &CancellationToken) -> Result<Self> {
        config.validate()?;
        fs::create_dir_all(&config.data_dir)?;

        let path = config.data_dir.join(Self::EVENTS_FILENAME);
        let file = MappedFile::open(&path, config.initial_file_size)?;

        let mut index = EventIndex::new(config.ring_buffer_capacity);
        let log = file.read(0, file.len() as usize)?;
        let report = recovery::scan(log, cancel, |position, header| {
            index.record_header(position, header)
        })?;

        if report.was_truncated {
            tracing::warn!(
                path = %path.display(),
                end_position = report.end_position,
                "event log had a torn tail; appends resume after the last complete record"
            );
        }
        tracing::info!(
            path = %path.display(),
            events = report.events_recovered,
            last_sequence = report.last_sequence,
            "event store opened"
        );

        Ok(Self {
            config,
            path,
            state: RwLock::new(EventState {
                file,
                index,
                current_position: report.end_position,
                writes_since_sync: 0,
            }),
            last_sequence: AtomicU64::new(report.last_sequence),
            recovery: report,
        })
    }

    /// Scan an event log file without opening a store over it
    pub fn verify(path: &Path) -> Result<RecoveryReport> {
        recovery::verify(path)
    }

    // =========================================================================
    // Core Operations
    // =========================================================================

    /// Append an event and return the sequence assigned to it.
    ///
    /// The payload goes to disk before the header, and the header before any
    /// index update, so the indexes never reference bytes that are not there.
    pub fn append(&self, mut event: EventDescriptor) -> Result<u64> {
        if event.payload.is_empty() {
            return Err(MapStoreError::InvalidEvent(
                "payload must not be empty".to_string(),
            ));
        }

        let mut state = self.state.write();

        if let Some(stream) = state.index.aggregates.get(&event.aggregate_id) {
            if event.version <= stream.last_version {
                return Err(MapStoreError::VersionConflict {
                    aggregate_id: event.aggregate_id,
                    last_version: stream.last_version,
                    attempted: event.version,
                });
            }
        }

        let sequence = self.last_sequence.load(Ordering::Acquire) + 1;
        event.sequence = sequence;
        let record = encode_event(&event)?;

        let position = state.current_position;
        state.write_record(position, &record, self.config.sync_strategy)?;

        state.index.record(
            position,
            sequence,
            event.aggregate_id,
            event.version,
            &event.event_type,
        );
        state.current_position = position + record.len() as u64;
        self.last_sequence.store(sequence, Ordering::Release);

        tracing::trace!(
            sequence,
            position,
            aggregate_id = %event.aggregate_id,
            version = event.version,
            "appended event"
        );
        Ok(sequence)
    }

    /// Events of `aggregate_id` with `version >= from_version`, in append
    /// order
    pub fn get_events(&self, aggregate_id: Uuid, from_version: i64) -> EventStream<'_> {
        let positions = self.aggregate_positions(aggregate_id);
        EventStream::new(self, positions, from_version, None)
    }

    /// Like `get_events`; the stream yields `Err(Cancelled)` and ends once
    /// `cancel` fires
    pub fn get_events_with_cancel(
        &self,
        aggregate_id: Uuid,
        from_version: i64,
        cancel: &CancellationToken,
    ) -> EventStream<'_> {
        let positions = self.aggregate_positions(aggregate_id);
        EventStream::new(self, positions, from_version, Some(cancel.clone()))
    }

    /// Every event of `event_type`, in append order
    pub fn get_events_by_type(&self, event_type: &str) -> EventStream<'_> {
        let positions = self.type_positions(event_type);
        EventStream::new(self, positions, i64::MIN, None)
    }

    /// Like `get_events_by_type`, stopping with `Err(Cancelled)` once
    /// `cancel` fires
    pub fn get_events_by_type_with_cancel(
        &self,
        event_type: &str,
        cancel: &CancellationToken,
    ) -> EventStream<'_> {
        let positions = self.type_positions(event_type);
        EventStream::new(self, positions, i64::MIN, Some(cancel.clone()))
    }

    /// Recent event by sequence, served from the sequence ring. `None` once
    /// the sequence has been evicted from the ring or was never written.
    pub fn get_event_by_sequence(&self, sequence: u64) -> Result<Option<EventDescriptor>> {
        let position = {
            let state = self.state.read();
            match state.index.recent.try_peek(sequence) {
                Some(slot) if slot.sequence == sequence => slot.position,
                _ => return Ok(None),
            }
        };
        self.read_event_at(position).map(Some)
    }

    /// Last sequence assigned by `append` (0 for an empty log).
    ///
    /// Backed by a dedicated counter, not by ring occupancy.
    pub fn get_last_sequence(&self) -> u64 {
        self.last_sequence.load(Ordering::Acquire)
    }

    /// Sequences currently resident in the ring (at most its capacity)
    pub fn buffered_sequence_count(&self) -> usize {
        self.state.read().index.recent.len()
    }

    /// Highest version appended for `aggregate_id`
    pub fn aggregate_version(&self, aggregate_id: Uuid) -> Option<i64> {
        self.state
            .read()
            .index
            .aggregates
            .get(&aggregate_id)
            .map(|stream| stream.last_version)
    }

    /// Flush the mapped region to disk
    pub fn flush(&self) -> Result<()> {
        let mut state = self.state.write();
        state.file.flush()?;
        state.writes_since_sync = 0;
        Ok(())
    }

    /// Flush and release the mapping
    pub fn close(self) -> Result<()> {
        self.flush()
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    pub fn event_count(&self) -> u64 {
        self.state.read().index.event_count
    }

    pub fn aggregate_count(&self) -> usize {
        self.state.read().index.aggregates.len()
    }

    /// Offset the next append will be written at
    pub fn current_position(&self) -> u64 {
        self.state.read().current_position
    }

    /// What the startup scan found
    pub fn recovery_report(&self) -> RecoveryReport {
        self.recovery
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn aggregate_positions(&self, aggregate_id: Uuid) -> Vec<u64> {
        self.state
            .read()
            .index
            .aggregates
            .get(&aggregate_id)
            .map(|stream| stream.positions.clone())
            .unwrap_or_default()
    }

    fn type_positions(&self, event_type: &str) -> Vec<u64> {
        self.state
            .read()
            .index
            .types
            .get(event_type)
            .cloned()
            .unwrap_or_default()
    }

    pub(crate) fn read_event_at(&self, position: u64) -> Result<EventDescriptor> {
        let state = self.state.read();
        let remaining = state.file.len().saturating_sub(position) as usize;
        let bytes = state.file.read(position, remaining)?;
        decode_event(bytes)
    }
}

impl Drop for EventStore {
    fn drop(&mut self) {
        if let Err(e) = self.state.get_mut().file.flush() {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to flush event log on drop");
        }
    }
}

impl EventState {
    /// Write payload, end marker, then header
    fn write_record(&mut self, position: u64, record: &[u8], strategy: SyncStrategy) -> Result<()> {
        let header_len = EVENT_HEADER_SIZE as u64;
        let end = position + record.len() as u64;

        self.file.write(position + header_len, &record[EVENT_HEADER_SIZE..])?;
        self.file.write(end, &END_MARKER)?;

        self.writes_since_sync += 1;
        let sync = strategy.should_sync(self.writes_since_sync);

        if sync && strategy == SyncStrategy::EveryWrite {
            let body_len = record.len() - EVENT_HEADER_SIZE + END_MARKER.len();
            self.file.flush_range(position + header_len, body_len)?;
        }

        self.file.write(position, &record[..EVENT_HEADER_SIZE])?;

        if sync {
            match strategy {
                SyncStrategy::EveryWrite => self.file.flush_range(position, EVENT_HEADER_SIZE)?,
                SyncStrategy::EveryNWrites { .. } => self.file.flush()?,
            }
            self.writes_since_sync = 0;
        }
        Ok(())
    }
}

//! Memory-mapped cache store
//!
//! Ties the mapped file, region allocator, value codec, and in-memory index
//! together.
//!
//! ## Concurrency Model
//!
//! - One `RwLock` guards the file, index, and allocator
//! - `get` takes the shared lock (access time is an atomic inside the entry);
//!   an expired hit re-acquires exclusively to evict, as does the first
//!   sliding hit after a flush
//! - `set`, `remove`, compaction, and flush take the exclusive lock
//! - `get_or_create` additionally serializes callers of the same key through
//!   a small set of striped mutexes, so concurrent misses run the factory once

use std::collections::BTreeMap;
use std::fs;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use parking_lot::{Mutex, RwLock};

use crate::cancel::CancellationToken;
use crate::clock::now_millis;
use crate::codec::{self, BincodeCodec, Codec};
use crate::config::{Config, SyncStrategy};
use crate::error::{MapStoreError, Result};
use crate::storage::{Allocation, MappedFile, RegionAllocator};

use super::entry::{CacheIndexEntry, Entry, EntryOptions};
use super::index::{self, CACHE_HEADER_SIZE};
use super::CacheKey;

/// Number of striped locks used by `get_or_create`
const CREATE_LOCK_STRIPES: usize = 16;

/// Point-in-time counters for a cache store
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CacheStats {
    /// Indexed entries (may include expired ones not yet read)
    pub entries: usize,
    pub write_cursor: u64,
    pub free_bytes: u64,
    pub free_blocks: usize,
    pub fragmentation_ratio: f64,
    pub file_len: u64,
    pub compactions: u64,
}

/// Outcome of one compaction pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompactionReport {
    pub entries_moved: usize,
    pub entries_expired: usize,
    /// How far the write cursor moved back
    pub bytes_reclaimed: u64,
    pub write_cursor: u64,
}

/// Persistent key/value cache over a single memory-mapped file
pub struct CacheStore<T, C = BincodeCodec<T>> {
    config: Config,
    path: PathBuf,
    state: RwLock<CacheState>,
    codec: C,
    create_locks: Vec<Mutex<()>>,
    _marker: PhantomData<fn() -> T>,
}

/// Everything the store lock protects
struct CacheState {
    file: MappedFile,
    index: BTreeMap<Vec<u8>, CacheIndexEntry>,
    allocator: RegionAllocator,
    writes_since_sync: usize,
    compactions: u64,
    /// The header currently references a persisted snapshot
    snapshot_on_disk: bool,
    closed: bool,
}

/// Outcome of the shared-lock half of `get`
enum Lookup {
    Hit(Vec<u8>, Entry<()>),
    Expired,
    /// Hit that must first invalidate the persisted snapshot
    Refresh,
}

/// Product of copying live entries into a fresh file
struct CompactedFile {
    file: MappedFile,
    moves: Vec<(Vec<u8>, u64)>,
    expired: Vec<Vec<u8>>,
    cursor: u64,
}

impl<T, C> CacheStore<T, C>
where
    C: Codec<T> + Default,
{
    /// Open or create a cache in `config.data_dir` with the default codec
    pub fn open(config: Config) -> Result<Self> {
        Self::open_with_codec(config, C::default())
    }

    /// Open with a path (convenience method)
    ///
    /// Uses default config with the specified data directory
    pub fn open_path(path: &Path) -> Result<Self> {
        let mut config = Config::default();
        config.data_dir = path.to_path_buf();
        Self::open(config)
    }
}

impl<T, C> CacheStore<T, C>
where
    C: Codec<T>,
{
    const CACHE_FILENAME: &'static str = "cache.dat";

    /// Open or create a cache using `codec` for every value
    ///
    /// On startup:
    /// 1. Create the data directory and map the cache file
    /// 2. Discard any leftover compaction file
    /// 3. Load the persisted index, dropping expired entries
    pub fn open_with_codec(config: Config, codec: C) -> Result<Self> {
        config.validate()?;

        fs::create_dir_all(&config.data_dir).map_err(|source| MapStoreError::CacheFile {
            path: config.data_dir.clone(),
            operation: "create data directory",
            source,
        })?;

        let path = config.data_dir.join(Self::CACHE_FILENAME);

        let leftover = compaction_path(&path);
        if leftover.exists() {
            tracing::warn!(path = %leftover.display(), "removing interrupted compaction file");
            fs::remove_file(&leftover).map_err(|source| MapStoreError::CacheFile {
                path: leftover.clone(),
                operation: "remove interrupted compaction",
                source,
            })?;
        }

        let mut file = MappedFile::open(&path, config.initial_file_size)
            .map_err(|e| file_error(&path, e))?
            .with_max_len(config.max_file_size);
        let (index, allocator) =
            Self::load_existing_index(&mut file).map_err(|e| file_error(&path, e))?;

        tracing::info!(
            path = %path.display(),
            entries = index.len(),
            write_cursor = allocator.write_cursor(),
            "cache store opened"
        );

        let create_locks = (0..CREATE_LOCK_STRIPES).map(|_| Mutex::new(())).collect();

        Ok(Self {
            config,
            path,
            state: RwLock::new(CacheState {
                file,
                index,
                allocator,
                writes_since_sync: 0,
                compactions: 0,
                snapshot_on_disk: false,
                closed: false,
            }),
            codec,
            create_locks,
            _marker: PhantomData,
        })
    }

    /// Rebuild the index and free-space bookkeeping from the persisted blob
    fn load_existing_index(
        file: &mut MappedFile,
    ) -> Result<(BTreeMap<Vec<u8>, CacheIndexEntry>, RegionAllocator)> {
        let mut index = BTreeMap::new();

        let snapshot = match index::read_snapshot(file)? {
            Some(snapshot) => snapshot,
            None => return Ok((index, RegionAllocator::new(CACHE_HEADER_SIZE))),
        };

        let now = now_millis();
        let cursor = snapshot.write_cursor;
        let mut allocator = RegionAllocator::restore(CACHE_HEADER_SIZE, cursor, snapshot.free);
        let mut expired = 0usize;
        let mut skipped = 0usize;

        for record in snapshot.entries {
            let (key, entry) = record.into_entry();

            if entry.position < CACHE_HEADER_SIZE || entry.position + entry.size as u64 > cursor {
                tracing::warn!(
                    position = entry.position,
                    size = entry.size,
                    "skipping index entry outside the written region"
                );
                skipped += 1;
                continue;
            }

            if entry.is_expired(now) {
                allocator.free(entry.position, entry.size);
                expired += 1;
                continue;
            }

            index.insert(key, entry);
        }

        // The snapshot is now in memory; stop referencing it on disk
        index::invalidate(file)?;

        if skipped > 0 {
            tracing::warn!(skipped, "persisted cache index referenced unwritten regions");
        }
        tracing::debug!(loaded = index.len(), expired, skipped, "loaded persisted cache index");
        Ok((index, allocator))
    }

    // =========================================================================
    // Core Operations
    // =========================================================================

    /// Look up a value.
    ///
    /// Expired entries are evicted here, lazily: the call returns `None` and
    /// the entry's region goes back to the free list.
    ///
    /// Reading a sliding entry moves its deadline, which makes a persisted
    /// snapshot stale. The first such read after a flush takes the exclusive
    /// lock and drops the on-disk reference.
    pub fn get(&self, key: &CacheKey) -> Result<Option<Entry<T>>> {
        let now = now_millis();

        let lookup = {
            let state = self.state.read();
            match state.index.get(key.as_bytes()) {
                None => return Ok(None),
                Some(entry) if entry.is_expired(now) => Lookup::Expired,
                Some(entry) if state.snapshot_on_disk && entry.sliding_expiration.is_some() => {
                    Lookup::Refresh
                }
                Some(entry) => {
                    let raw = state.file.read(entry.position, entry.size as usize)?.to_vec();
                    entry.touch(now);
                    Lookup::Hit(raw, entry.to_entry(()))
                }
            }
        };

        let (raw, view) = match lookup {
            Lookup::Hit(raw, view) => (raw, view),
            Lookup::Refresh => match self.read_exclusive(key, now)? {
                Some(hit) => hit,
                None => return Ok(None),
            },
            Lookup::Expired => {
                self.evict_expired(key, now)?;
                return Ok(None);
            }
        };

        let value = self.decode_payload(&raw, view.is_compressed)?;
        Ok(Some(view.with_value(value)))
    }

    /// Store a value, replacing any existing entry for `key`
    pub fn set(&self, key: &CacheKey, value: &T, options: EntryOptions) -> Result<()> {
        self.store_value(key, value, options).map(|_| ())
    }

    /// Drop an entry. Returns whether the key was present.
    ///
    /// The region is freed for reuse; the file does not shrink until the
    /// next compaction.
    pub fn remove(&self, key: &CacheKey) -> Result<bool> {
        let mut state = self.state.write();
        if !state.index.contains_key(key.as_bytes()) {
            return Ok(false);
        }

        state.before_mutation().map_err(|e| file_error(&self.path, e))?;
        state.remove_entry(key.as_bytes());
        Ok(true)
    }

    /// Return the cached value, or build it with `factory` and store it.
    ///
    /// A hit never calls `factory`. Concurrent callers for the same key are
    /// serialized, so only the first miss runs the factory.
    ///
    /// `factory` runs while a lock shared by several keys is held. It may call
    /// `get`, `set`, or `remove`, but must not call `get_or_create` on this
    /// store for any key.
    pub fn get_or_create<F>(&self, key: &CacheKey, factory: F, options: EntryOptions) -> Result<Entry<T>>
    where
        F: FnOnce() -> Result<T>,
    {
        let _guard = self.create_lock(key).lock();

        if let Some(entry) = self.get(key)? {
            return Ok(entry);
        }

        let value = factory()?;
        let view = self.store_value(key, &value, options)?;
        Ok(view.with_value(value))
    }

    /// Whether `key` is present and not expired
    pub fn contains_key(&self, key: &CacheKey) -> bool {
        let now = now_millis();
        self.state
            .read()
            .index
            .get(key.as_bytes())
            .map(|entry| !entry.is_expired(now))
            .unwrap_or(false)
    }

    // =========================================================================
    // Maintenance
    // =========================================================================

    /// Rewrite all live entries contiguously into a fresh file
    pub fn compact(&self) -> Result<CompactionReport> {
        self.compact_with_cancel(&CancellationToken::new())
    }

    /// Like `compact`, aborting between records once `cancel` fires. An
    /// aborted compaction leaves the store exactly as it was.
    pub fn compact_with_cancel(&self, cancel: &CancellationToken) -> Result<CompactionReport> {
        let mut state = self.state.write();
        state
            .compact(&self.config, cancel)
            .map_err(|e| file_error(&self.path, e))
    }

    /// Persist the index so a later `open` can restore it
    pub fn flush(&self) -> Result<()> {
        let mut state = self.state.write();
        state.persist().map_err(|e| file_error(&self.path, e))
    }

    /// Persist the index and release the mapping
    pub fn close(self) -> Result<()> {
        let mut state = self.state.write();
        state.persist().map_err(|e| file_error(&self.path, e))?;
        state.closed = true;
        Ok(())
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    /// Number of indexed entries
    pub fn len(&self) -> usize {
        self.state.read().index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.state.read();
        CacheStats {
            entries: state.index.len(),
            write_cursor: state.allocator.write_cursor(),
            free_bytes: state.allocator.free_bytes(),
            free_blocks: state.allocator.free_block_count(),
            fragmentation_ratio: state.allocator.fragmentation_ratio(),
            file_len: state.file.len(),
            compactions: state.compactions,
        }
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn store_value(&self, key: &CacheKey, value: &T, options: EntryOptions) -> Result<Entry<()>> {
        let encoded = self.codec.encode(value)?;

        let compress = options.enable_compression
            || self.config.compression_enabled
            || encoded.len() > self.config.compression_threshold;
        let payload = if compress {
            codec::compress(&encoded)?
        } else {
            encoded
        };

        let size = u32::try_from(payload.len()).map_err(|_| MapStoreError::CacheCapacity {
            requested: payload.len() as u64,
            available: u32::MAX as u64,
        })?;

        let now = now_millis();
        let mut entry = CacheIndexEntry::new(
            0,
            size,
            now,
            now,
            options.resolve_deadline(now, self.config.default_absolute_expiration),
            options
                .sliding_expiration
                .or(self.config.default_sliding_expiration),
            compress,
            options.priority.unwrap_or(self.config.default_priority),
            options.metadata,
        );

        let mut state = self.state.write();
        state
            .before_mutation()
            .map_err(|e| file_error(&self.path, e))?;

        let allocation = match state.allocate(size, self.config.max_file_size) {
            Ok(allocation) => allocation,
            Err(MapStoreError::CacheCapacity { .. }) if state.allocator.free_bytes() >= size as u64 => {
                tracing::debug!(size, "allocation over capacity; compacting before retry");
                state
                    .compact(&self.config, &CancellationToken::new())
                    .map_err(|e| file_error(&self.path, e))?;
                state.allocate(size, self.config.max_file_size)?
            }
            Err(e) => return Err(e),
        };

        // Write first; the index only learns about bytes that are in the file
        if let Err(e) = state.write_payload(allocation, &payload, self.config.sync_strategy) {
            state.allocator.rollback(allocation);
            return Err(file_error(&self.path, e));
        }

        entry.position = allocation.position;
        let view = entry.to_entry(());

        if let Some(old) = state.index.insert(key.as_bytes().to_vec(), entry) {
            state.allocator.free(old.position, old.size);
        }

        self.perform_cleanup_if_needed(&mut state);
        Ok(view)
    }

    fn decode_payload(&self, raw: &[u8], is_compressed: bool) -> Result<T> {
        if is_compressed {
            let plain = codec::decompress(raw)?;
            self.codec.decode(&plain)
        } else {
            self.codec.decode(raw)
        }
    }

    /// `get` under the exclusive lock, dropping the on-disk snapshot first
    fn read_exclusive(&self, key: &CacheKey, now: u64) -> Result<Option<(Vec<u8>, Entry<()>)>> {
        let mut state = self.state.write();
        let expired = match state.index.get(key.as_bytes()) {
            None => return Ok(None),
            Some(entry) => entry.is_expired(now),
        };

        state.before_mutation().map_err(|e| file_error(&self.path, e))?;
        if expired {
            state.remove_entry(key.as_bytes());
            return Ok(None);
        }

        let state = &*state;
        let Some(entry) = state.index.get(key.as_bytes()) else {
            return Ok(None);
        };
        let raw = state.file.read(entry.position, entry.size as usize)?.to_vec();
        entry.touch(now);
        Ok(Some((raw, entry.to_entry(()))))
    }

    fn evict_expired(&self, key: &CacheKey, now: u64) -> Result<()> {
        let mut state = self.state.write();

        // Another writer may have replaced the entry since the read lock
        let still_expired = state
            .index
            .get(key.as_bytes())
            .map(|entry| entry.is_expired(now))
            .unwrap_or(false);

        if still_expired {
            state.before_mutation().map_err(|e| file_error(&self.path, e))?;
            state.remove_entry(key.as_bytes());
            tracing::trace!(?key, "evicted expired entry");
        }
        Ok(())
    }

    /// Compact when fragmentation crosses the configured threshold.
    /// Failures are logged; the triggering write has already committed.
    fn perform_cleanup_if_needed(&self, state: &mut CacheState) {
        let ratio = state.allocator.fragmentation_ratio();
        if ratio < self.config.fragmentation_threshold {
            return;
        }

        tracing::debug!(ratio, "fragmentation threshold reached");
        if let Err(e) = state.compact(&self.config, &CancellationToken::new()) {
            tracing::warn!(error = %e, "automatic compaction failed");
        }
    }

    fn create_lock(&self, key: &CacheKey) -> &Mutex<()> {
        let stripe = crc32fast::hash(key.as_bytes()) as usize % self.create_locks.len();
        &self.create_locks[stripe]
    }
}

impl<T, C> Drop for CacheStore<T, C> {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        if state.closed {
            return;
        }
        if let Err(e) = state.persist() {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to persist cache index on drop");
        }
    }
}

impl CacheState {
    /// Stop referencing the on-disk snapshot before anything changes
    fn before_mutation(&mut self) -> Result<()> {
        if self.snapshot_on_disk {
            index::invalidate(&mut self.file)?;
            self.snapshot_on_disk = false;
        }
        Ok(())
    }

    fn allocate(&mut self, size: u32, max_file_size: u64) -> Result<Allocation> {
        if self.allocator.best_fit(size).is_none() {
            let cursor = self.allocator.write_cursor();
            if cursor + size as u64 > max_file_size {
                return Err(MapStoreError::CacheCapacity {
                    requested: size as u64,
                    available: max_file_size.saturating_sub(cursor),
                });
            }
        }
        Ok(self.allocator.allocate(size))
    }

    fn write_payload(&mut self, allocation: Allocation, payload: &[u8], strategy: SyncStrategy) -> Result<()> {
        self.file.write(allocation.position, payload)?;

        self.writes_since_sync += 1;
        if strategy.should_sync(self.writes_since_sync) {
            match strategy {
                SyncStrategy::EveryWrite => self.file.flush_range(allocation.position, payload.len())?,
                SyncStrategy::EveryNWrites { .. } => self.file.flush()?,
            }
            self.writes_since_sync = 0;
        }
        Ok(())
    }

    fn remove_entry(&mut self, key: &[u8]) -> Option<CacheIndexEntry> {
        let entry = self.index.remove(key)?;
        self.allocator.free(entry.position, entry.size);
        Some(entry)
    }

    fn persist(&mut self) -> Result<()> {
        index::write_snapshot(&mut self.file, &self.allocator, &self.index)?;
        self.snapshot_on_disk = true;
        Ok(())
    }

    /// Copy live entries into a new file, swap it in, and reset free space.
    ///
    /// Positions are only rewritten after the new file has replaced the old
    /// one, so any failure before that point leaves state untouched.
    fn compact(&mut self, config: &Config, cancel: &CancellationToken) -> Result<CompactionReport> {
        let now = now_millis();
        let cursor_before = self.allocator.write_cursor();
        let live_bytes: u64 = self
            .index
            .values()
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.size as u64)
            .sum();
        let target_len = (CACHE_HEADER_SIZE + live_bytes).max(config.initial_file_size);

        let live_path = self.file.path().to_path_buf();
        let temp_path = compaction_path(&live_path);

        tracing::info!(
            entries = self.index.len(),
            live_bytes,
            free_bytes = self.allocator.free_bytes(),
            "compaction started"
        );

        let mut compacted = match self.copy_live(config, &temp_path, target_len, now, cancel) {
            Ok(compacted) => compacted,
            Err(e) => {
                let _ = fs::remove_file(&temp_path);
                return Err(e);
            }
        };

        let swapped = compacted
            .file
            .flush()
            .and_then(|_| compacted.file.rename_to(&live_path));
        if let Err(e) = swapped {
            drop(compacted);
            let _ = fs::remove_file(&temp_path);
            return Err(e);
        }

        let old = std::mem::replace(&mut self.file, compacted.file);
        drop(old);

        let entries_moved = compacted.moves.len();
        for (key, position) in compacted.moves {
            if let Some(entry) = self.index.get_mut(&key) {
                entry.position = position;
            }
        }
        let entries_expired = compacted.expired.len();
        for key in &compacted.expired {
            self.index.remove(key);
        }

        self.allocator.reset(compacted.cursor);
        self.compactions += 1;
        self.snapshot_on_disk = false;

        let report = CompactionReport {
            entries_moved,
            entries_expired,
            bytes_reclaimed: cursor_before.saturating_sub(compacted.cursor),
            write_cursor: compacted.cursor,
        };
        tracing::info!(?report, "compaction finished");
        Ok(report)
    }

    fn copy_live(
        &self,
        config: &Config,
        temp_path: &Path,
        target_len: u64,
        now: u64,
        cancel: &CancellationToken,
    ) -> Result<CompactedFile> {
        let mut file =
            MappedFile::create(temp_path, target_len)?.with_max_len(config.max_file_size);
        let mut cursor = CACHE_HEADER_SIZE;
        let mut moves = Vec::with_capacity(self.index.len());
        let mut expired = Vec::new();

        for (key, entry) in &self.index {
            cancel.check()?;

            if entry.is_expired(now) {
                expired.push(key.clone());
                continue;
            }

            let bytes = self.file.read(entry.position, entry.size as usize)?;
            file.write(cursor, bytes)?;
            moves.push((key.clone(), cursor));
            cursor += entry.size as u64;
        }

        Ok(CompactedFile {
            file,
            moves,
            expired,
            cursor,
        })
    }
}

fn compaction_path(path: &Path) -> PathBuf {
    path.with_extension("compact")
}

/// Attach the cache file path to low-level storage failures
fn file_error(path: &Path, err: MapStoreError) -> MapStoreError {
    match err {
        MapStoreError::StorageIo { operation, source } => MapStoreError::CacheFile {
            path: path.to_path_buf(),
            operation,
            source,
        },
        other => other,
    }
}

//! Persisted cache index
//!
//! The authoritative index lives in memory. On flush/close a snapshot is
//! serialized with bincode into the region just past the write cursor and
//! referenced from a small header at offset 0:
//!
//! ```text
//! ┌──────────┬─────────────┬──────────┬──────────────────┬────────────────┬───────────────┐
//! │Magic (4) │ Version (2) │ Rsvd (2) │ IndexOffset (8)  │ IndexLen (8)   │ IndexCRC (4)  │
//! └──────────┴─────────────┴──────────┴──────────────────┴────────────────┴───────────────┘
//! ```
//!
//! The header is zeroed as soon as the store mutates again, so a stale
//! snapshot can never be loaded over newer data.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{MapStoreError, Result};
use crate::storage::{FreeSpaceEntry, MappedFile, RegionAllocator};

use super::entry::{CacheIndexEntry, Metadata, Priority};

/// Bytes reserved at the start of the cache file
pub const CACHE_HEADER_SIZE: u64 = 64;

const MAGIC: &[u8; 4] = b"MSCI";
const FORMAT_VERSION: u16 = 1;

/// Serialized form of a `CacheIndexEntry`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct IndexRecord {
    pub key: Vec<u8>,
    pub position: u64,
    pub size: u32,
    pub created_at: u64,
    pub last_accessed: u64,
    pub absolute_expiration: Option<u64>,
    pub sliding_expiration_ms: Option<u64>,
    pub is_compressed: bool,
    pub priority: Priority,
    pub metadata: Metadata,
}

impl IndexRecord {
    fn from_entry(key: &[u8], entry: &CacheIndexEntry) -> Self {
        Self {
            key: key.to_vec(),
            position: entry.position,
            size: entry.size,
            created_at: entry.created_at,
            last_accessed: entry.last_accessed(),
            absolute_expiration: entry.absolute_expiration,
            sliding_expiration_ms: entry.sliding_expiration.map(|d| d.as_millis() as u64),
            is_compressed: entry.is_compressed,
            priority: entry.priority,
            metadata: entry.metadata.clone(),
        }
    }

    pub(crate) fn into_entry(self) -> (Vec<u8>, CacheIndexEntry) {
        let entry = CacheIndexEntry::new(
            self.position,
            self.size,
            self.created_at,
            self.last_accessed,
            self.absolute_expiration,
            self.sliding_expiration_ms.map(Duration::from_millis),
            self.is_compressed,
            self.priority,
            self.metadata,
        );
        (self.key, entry)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct IndexSnapshot {
    pub write_cursor: u64,
    pub free: Vec<FreeSpaceEntry>,
    pub entries: Vec<IndexRecord>,
}

/// Serialize the index past the write cursor and point the header at it
pub(crate) fn write_snapshot(
    file: &mut MappedFile,
    allocator: &RegionAllocator,
    index: &BTreeMap<Vec<u8>, CacheIndexEntry>,
) -> Result<()> {
    let snapshot = IndexSnapshot {
        write_cursor: allocator.write_cursor(),
        free: allocator.free_entries(),
        entries: index
            .iter()
            .map(|(key, entry)| IndexRecord::from_entry(key, entry))
            .collect(),
    };

    let blob = bincode::serialize(&snapshot).map_err(|e| MapStoreError::CacheSerialization {
        value_type: "IndexSnapshot",
        operation: "serialize",
        reason: e.to_string(),
    })?;

    let offset = allocator.write_cursor();
    file.write(offset, &blob)?;

    let mut header = [0u8; CACHE_HEADER_SIZE as usize];
    header[0..4].copy_from_slice(MAGIC);
    header[4..6].copy_from_slice(&FORMAT_VERSION.to_le_bytes());
    header[8..16].copy_from_slice(&offset.to_le_bytes());
    header[16..24].copy_from_slice(&(blob.len() as u64).to_le_bytes());
    header[24..28].copy_from_slice(&crc32fast::hash(&blob).to_le_bytes());
    file.write(0, &header)?;

    file.flush()
}

/// Load the snapshot referenced by the header.
///
/// A missing, stale, or corrupt snapshot yields `Ok(None)`: the cache then
/// starts empty.
pub(crate) fn read_snapshot(file: &MappedFile) -> Result<Option<IndexSnapshot>> {
    let header = file.read(0, CACHE_HEADER_SIZE as usize)?;

    if &header[0..4] != MAGIC {
        return Ok(None);
    }

    let version = u16::from_le_bytes([header[4], header[5]]);
    if version != FORMAT_VERSION {
        tracing::warn!(version, "unsupported cache index version; starting empty");
        return Ok(None);
    }

    let offset = read_u64(&header[8..16]);
    let len = read_u64(&header[16..24]);
    let stored_crc = u32::from_le_bytes([header[24], header[25], header[26], header[27]]);

    if len == 0 {
        return Ok(None);
    }
    if offset < CACHE_HEADER_SIZE || offset.saturating_add(len) > file.len() {
        tracing::warn!(offset, len, file_len = file.len(), "cache index out of bounds; starting empty");
        return Ok(None);
    }

    let blob = file.read(offset, len as usize)?;
    if crc32fast::hash(blob) != stored_crc {
        tracing::warn!(offset, len, "cache index checksum mismatch; starting empty");
        return Ok(None);
    }

    match bincode::deserialize::<IndexSnapshot>(blob) {
        Ok(snapshot) => Ok(Some(snapshot)),
        Err(e) => {
            tracing::warn!(error = %e, "cache index undecodable; starting empty");
            Ok(None)
        }
    }
}

/// Zero the header so the on-disk snapshot is no longer referenced
pub(crate) fn invalidate(file: &mut MappedFile) -> Result<()> {
    file.write(0, &[0u8; CACHE_HEADER_SIZE as usize])?;
    file.flush_range(0, CACHE_HEADER_SIZE as usize)
}

fn read_u64(bytes: &[u8]) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(bytes);
    u64::from_le_bytes(raw)
}

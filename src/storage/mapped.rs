//! Memory-mapped backing file
//!
//! A single read/write mapping over a file that grows on demand. Growing
//! remaps the file, which is why every mutation takes `&mut self`: the borrow
//! checker guarantees no slice handed out by `read()` survives a remap.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use memmap2::MmapMut;

use crate::error::{MapStoreError, Result};

/// Exclusive owner of a file and its mapping
#[derive(Debug)]
pub struct MappedFile {
    path: PathBuf,
    file: File,
    mmap: MmapMut,
    len: u64,
    /// Growth never takes the file past this length
    max_len: Option<u64>,
}

impl MappedFile {
    /// Open an existing file, or create one, ensuring it is at least
    /// `min_len` bytes long. Existing content is preserved.
    pub fn open(path: &Path, min_len: u64) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|e| MapStoreError::storage("open", e))?;

        let current = file
            .metadata()
            .map_err(|e| MapStoreError::storage("stat", e))?
            .len();

        let len = current.max(min_len);
        if len > current {
            file.set_len(len)
                .map_err(|e| MapStoreError::storage("grow", e))?;
        }

        Self::map(path.to_path_buf(), file, len)
    }

    /// Create a fresh, zero-filled file of `len` bytes, replacing any
    /// existing file at `path`
    pub fn create(path: &Path, len: u64) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .map_err(|e| MapStoreError::storage("create", e))?;

        file.set_len(len)
            .map_err(|e| MapStoreError::storage("grow", e))?;

        Self::map(path.to_path_buf(), file, len)
    }

    fn map(path: PathBuf, file: File, len: u64) -> Result<Self> {
        // SAFETY: the file is opened read/write and exclusively owned by this
        // instance; cross-process sharing of a store file is unsupported. The
        // mapping is replaced only through `&mut self`, so no outstanding
        // slices can observe the old mapping.
        let mmap = unsafe { MmapMut::map_mut(&file) }
            .map_err(|e| MapStoreError::storage("mmap", e))?;

        Ok(Self {
            path,
            file,
            mmap,
            len,
            max_len: None,
        })
    }

    /// Cap future growth at `max_len` bytes. A file already longer than the
    /// cap keeps its length but will not grow further.
    pub fn with_max_len(mut self, max_len: u64) -> Self {
        self.max_len = Some(max_len);
        self
    }

    /// Borrow `len` bytes starting at `position`
    pub fn read(&self, position: u64, len: usize) -> Result<&[u8]> {
        let end = position
            .checked_add(len as u64)
            .filter(|end| *end <= self.len)
            .ok_or_else(|| {
                MapStoreError::CorruptRecord(format!(
                    "read of {} bytes at {} exceeds file length {}",
                    len, position, self.len
                ))
            })?;

        Ok(&self.mmap[position as usize..end as usize])
    }

    /// Copy `bytes` into the mapping at `position`, growing the file first if
    /// the write would run past its end
    pub fn write(&mut self, position: u64, bytes: &[u8]) -> Result<()> {
        let end = position + bytes.len() as u64;
        self.ensure_len(end)?;
        self.mmap[position as usize..end as usize].copy_from_slice(bytes);
        Ok(())
    }

    /// Grow the file to at least `required` bytes. Growth doubles the
    /// current length to keep remaps rare, clamped to the cap if one is set.
    ///
    /// Returns `CacheCapacity` when `required` is past the cap.
    pub fn ensure_len(&mut self, required: u64) -> Result<()> {
        if required <= self.len {
            return Ok(());
        }

        let doubled = self.len.saturating_mul(2);
        let target = match self.max_len {
            Some(max) if required > max => {
                return Err(MapStoreError::CacheCapacity {
                    requested: required - self.len,
                    available: max.saturating_sub(self.len),
                });
            }
            Some(max) => doubled.min(max),
            None => doubled,
        };
        let new_len = required.max(target);

        self.mmap
            .flush()
            .map_err(|e| MapStoreError::storage("flush before grow", e))?;
        self.file
            .set_len(new_len)
            .map_err(|e| MapStoreError::storage("grow", e))?;

        // SAFETY: see `map`; `&mut self` guarantees the old mapping is unused.
        self.mmap = unsafe { MmapMut::map_mut(&self.file) }
            .map_err(|e| MapStoreError::storage("remap", e))?;
        self.len = new_len;

        tracing::debug!(path = %self.path.display(), len = new_len, "grew mapped file");
        Ok(())
    }

    /// Flush a sub-range of the mapping to disk
    pub fn flush_range(&self, position: u64, len: usize) -> Result<()> {
        if len == 0 {
            return Ok(());
        }
        self.mmap
            .flush_range(position as usize, len)
            .map_err(|e| MapStoreError::storage("flush", e))
    }

    /// Flush the whole mapping to disk
    pub fn flush(&self) -> Result<()> {
        self.mmap
            .flush()
            .map_err(|e| MapStoreError::storage("flush", e))
    }

    /// Move the file to `target`, replacing whatever is there. The mapping
    /// stays valid: it follows the inode, not the name.
    pub fn rename_to(&mut self, target: &Path) -> Result<()> {
        fs::rename(&self.path, target).map_err(|e| MapStoreError::storage("rename", e))?;
        self.path = target.to_path_buf();
        Ok(())
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

//! Bounds-checked little-endian reader
//!
//! Every read validates the declared length against what is left in the
//! buffer and fails with `CorruptRecord` instead of panicking.

use uuid::Uuid;

use crate::error::{MapStoreError, Result};

pub(crate) struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub(crate) fn take(&mut self, len: usize, field: &str) -> Result<&'a [u8]> {
        let remaining = self.buf.len() - self.pos;
        if len > remaining {
            return Err(MapStoreError::CorruptRecord(format!(
                "{}: declared {} bytes at offset {}, only {} remain",
                field, len, self.pos, remaining
            )));
        }
        let slice = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    pub(crate) fn u32(&mut self, field: &str) -> Result<u32> {
        let bytes = self.take(4, field)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub(crate) fn u64(&mut self, field: &str) -> Result<u64> {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(self.take(8, field)?);
        Ok(u64::from_le_bytes(raw))
    }

    pub(crate) fn i64(&mut self, field: &str) -> Result<i64> {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(self.take(8, field)?);
        Ok(i64::from_le_bytes(raw))
    }

    pub(crate) fn uuid(&mut self, field: &str) -> Result<Uuid> {
        let mut raw = [0u8; 16];
        raw.copy_from_slice(self.take(16, field)?);
        Ok(Uuid::from_bytes(raw))
    }

    /// Length-prefixed UTF-8 string
    pub(crate) fn string(&mut self, field: &str) -> Result<String> {
        let len = self.u32(field)? as usize;
        let bytes = self.take(len, field)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| {
            MapStoreError::CorruptRecord(format!("{}: invalid UTF-8", field))
        })
    }
}

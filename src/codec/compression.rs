//! LZ4 block compression for cache payloads
//!
//! The uncompressed size is prepended to each block so decompression needs
//! no side channel.

use crate::error::{MapStoreError, Result};

pub fn compress(data: &[u8]) -> Result<Vec<u8>> {
    lz4::block::compress(data, Some(lz4::block::CompressionMode::DEFAULT), true)
        .map_err(|e| MapStoreError::Compression(format!("LZ4 compress: {}", e)))
}

pub fn decompress(data: &[u8]) -> Result<Vec<u8>> {
    lz4::block::decompress(data, None)
        .map_err(|e| MapStoreError::Compression(format!("LZ4 decompress: {}", e)))
}

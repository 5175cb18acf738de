//! Event record encoding/decoding
//!
//! Fixed 128-byte header followed by the payload. See the module docs in
//! `codec/mod.rs` for the byte layout.

use std::collections::BTreeMap;

use bytes::Bytes;
use uuid::Uuid;

use crate::error::{MapStoreError, Result};
use crate::events::EventDescriptor;

use super::ByteReader;

/// Size of every event header on disk
pub const EVENT_HEADER_SIZE: usize = 128;

/// Bytes available to header fields; the last 4 hold the payload CRC
pub const HEADER_FIELD_BUDGET: usize = EVENT_HEADER_SIZE - 4;

/// Offset of `data_length` within the header
const DATA_LENGTH_OFFSET: usize = 24;

/// Every field of an event record except the payload itself
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventHeader {
    pub event_id: Uuid,
    pub sequence: u64,
    pub data_length: u32,
    pub event_type: String,
    pub timestamp: i64,
    pub aggregate_type: String,
    pub aggregate_id: Uuid,
    pub version: i64,
    pub metadata: BTreeMap<String, String>,
    pub payload_crc: u32,
}

impl EventHeader {
    /// Header + payload length
    pub fn record_len(&self) -> u64 {
        EVENT_HEADER_SIZE as u64 + self.data_length as u64
    }

    /// Check `payload` against the stored checksum
    pub fn verify_payload(&self, payload: &[u8]) -> Result<()> {
        if payload.len() != self.data_length as usize {
            return Err(MapStoreError::CorruptRecord(format!(
                "payload length {} does not match declared {}",
                payload.len(),
                self.data_length
            )));
        }
        let actual = crc32fast::hash(payload);
        if actual != self.payload_crc {
            return Err(MapStoreError::CorruptRecord(format!(
                "payload checksum mismatch for event {} (stored {:#010x}, computed {:#010x})",
                self.event_id, self.payload_crc, actual
            )));
        }
        Ok(())
    }

    fn into_descriptor(self, payload: &[u8]) -> EventDescriptor {
        EventDescriptor {
            event_id: self.event_id,
            sequence: self.sequence,
            event_type: self.event_type,
            timestamp: self.timestamp,
            aggregate_type: self.aggregate_type,
            aggregate_id: self.aggregate_id,
            version: self.version,
            payload: Bytes::copy_from_slice(payload),
            metadata: self.metadata,
        }
    }
}

/// Bytes the variable header fields of `event` need (excluding padding and
/// the checksum)
pub fn encoded_header_len(event: &EventDescriptor) -> usize {
    let metadata: usize = event
        .metadata
        .iter()
        .map(|(key, value)| 8 + key.len() + value.len())
        .sum();

    16 + 8 + 4                              // event_id, sequence, data_length
        + 4 + event.event_type.len()        // event_type
        + 8                                 // timestamp
        + 4 + event.aggregate_type.len()    // aggregate_type
        + 16 + 8                            // aggregate_id, version
        + 4 + metadata                      // metadata
}

/// Encode an event into header + payload bytes.
///
/// Fails with `HeaderOverflow` if the string fields do not fit in the
/// header; nothing is ever truncated.
pub fn encode_event(event: &EventDescriptor) -> Result<Vec<u8>> {
    let required = encoded_header_len(event);
    if required > HEADER_FIELD_BUDGET {
        return Err(MapStoreError::HeaderOverflow {
            required,
            budget: HEADER_FIELD_BUDGET,
        });
    }

    let data_length = u32::try_from(event.payload.len()).map_err(|_| {
        MapStoreError::InvalidEvent(format!(
            "payload of {} bytes exceeds the u32 length field",
            event.payload.len()
        ))
    })?;

    let mut out = Vec::with_capacity(EVENT_HEADER_SIZE + event.payload.len());
    out.extend_from_slice(event.event_id.as_bytes());
    out.extend_from_slice(&event.sequence.to_le_bytes());
    out.extend_from_slice(&data_length.to_le_bytes());
    put_str(&mut out, &event.event_type);
    out.extend_from_slice(&event.timestamp.to_le_bytes());
    put_str(&mut out, &event.aggregate_type);
    out.extend_from_slice(event.aggregate_id.as_bytes());
    out.extend_from_slice(&event.version.to_le_bytes());
    out.extend_from_slice(&(event.metadata.len() as u32).to_le_bytes());
    for (key, value) in &event.metadata {
        put_str(&mut out, key);
        put_str(&mut out, value);
    }

    out.resize(HEADER_FIELD_BUDGET, 0);
    out.extend_from_slice(&crc32fast::hash(&event.payload).to_le_bytes());
    out.extend_from_slice(&event.payload);

    Ok(out)
}

/// Decode the fixed header at the start of `buf`
pub fn decode_header(buf: &[u8]) -> Result<EventHeader> {
    if buf.len() < EVENT_HEADER_SIZE {
        return Err(MapStoreError::CorruptRecord(format!(
            "event header needs {} bytes, got {}",
            EVENT_HEADER_SIZE,
            buf.len()
        )));
    }

    let mut reader = ByteReader::new(&buf[..HEADER_FIELD_BUDGET]);
    let event_id = reader.uuid("event_id")?;
    let sequence = reader.u64("sequence")?;
    let data_length = reader.u32("data_length")?;
    let event_type = reader.string("event_type")?;
    let timestamp = reader.i64("timestamp")?;
    let aggregate_type = reader.string("aggregate_type")?;
    let aggregate_id = reader.uuid("aggregate_id")?;
    let version = reader.i64("version")?;

    let count = reader.u32("metadata_count")?;
    let mut metadata = BTreeMap::new();
    for _ in 0..count {
        let key = reader.string("metadata key")?;
        let value = reader.string("metadata value")?;
        metadata.insert(key, value);
    }

    let crc = &buf[HEADER_FIELD_BUDGET..EVENT_HEADER_SIZE];
    let payload_crc = u32::from_le_bytes([crc[0], crc[1], crc[2], crc[3]]);

    Ok(EventHeader {
        event_id,
        sequence,
        data_length,
        event_type,
        timestamp,
        aggregate_type,
        aggregate_id,
        version,
        metadata,
        payload_crc,
    })
}

/// Decode a full record (header + payload) from the start of `buf`
pub fn decode_event(buf: &[u8]) -> Result<EventDescriptor> {
    let header = decode_header(buf)?;
    let end = header.record_len() as usize;
    if end > buf.len() {
        return Err(MapStoreError::CorruptRecord(format!(
            "payload of {} bytes exceeds remaining {}",
            header.data_length,
            buf.len() - EVENT_HEADER_SIZE
        )));
    }

    let payload = &buf[EVENT_HEADER_SIZE..end];
    header.verify_payload(payload)?;
    Ok(header.into_descriptor(payload))
}

/// `data_length` of the header at the start of `buf`, without decoding the
/// rest. Zero marks the end of written data.
pub fn peek_data_length(buf: &[u8]) -> Option<u32> {
    let raw = buf.get(DATA_LENGTH_OFFSET..DATA_LENGTH_OFFSET + 4)?;
    Some(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
}

fn put_str(out: &mut Vec<u8>, value: &str) {
    out.extend_from_slice(&(value.len() as u32).to_le_bytes());
    out.extend_from_slice(value.as_bytes());
}

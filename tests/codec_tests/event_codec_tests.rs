//! Tests for event record encoding/decoding
//!
//! These tests verify:
//! - Round trip of every header field and the payload
//! - Header budget enforcement (overflow is an error, never truncation)
//! - Checksum and bounds failures on damaged records

use mapstore::codec::{
    decode_event, decode_header, encode_event, encoded_header_len, peek_data_length,
    EVENT_HEADER_SIZE, HEADER_FIELD_BUDGET,
};
use mapstore::{EventDescriptor, MapStoreError};
use proptest::prelude::*;
use uuid::Uuid;

// =============================================================================
// Helper Functions
// =============================================================================

fn sample_event() -> EventDescriptor {
    let mut event = EventDescriptor::new("order", Uuid::new_v4(), 3, "created", b"{\"total\":42}".to_vec())
        .with_metadata("user", "u1");
    event.sequence = 17;
    event
}

// =============================================================================
// Round-Trip Tests
// =============================================================================

#[test]
fn test_encode_decode_round_trip() {
    let event = sample_event();

    let bytes = encode_event(&event).unwrap();
    let decoded = decode_event(&bytes).unwrap();

    assert_eq!(decoded, event);
}

#[test]
fn test_record_layout() {
    let event = sample_event();
    let bytes = encode_event(&event).unwrap();

    assert_eq!(bytes.len(), EVENT_HEADER_SIZE + event.payload.len());
    assert_eq!(peek_data_length(&bytes), Some(event.payload.len() as u32));

    let header = decode_header(&bytes).unwrap();
    assert_eq!(header.sequence, 17);
    assert_eq!(header.record_len(), bytes.len() as u64);
    assert_eq!(header.payload_crc, crc32fast::hash(&event.payload));
}

#[test]
fn test_decode_ignores_trailing_bytes() {
    let event = sample_event();
    let mut bytes = encode_event(&event).unwrap();
    bytes.extend_from_slice(&[0u8; EVENT_HEADER_SIZE]);

    assert_eq!(decode_event(&bytes).unwrap(), event);
}

// =============================================================================
// Header Budget Tests
// =============================================================================

#[test]
fn test_header_exactly_at_budget() {
    let mut event = EventDescriptor::new("", Uuid::new_v4(), 1, "", vec![1u8]);
    let base = encoded_header_len(&event);
    event.event_type = "x".repeat(HEADER_FIELD_BUDGET - base);

    assert_eq!(encoded_header_len(&event), HEADER_FIELD_BUDGET);
    let bytes = encode_event(&event).unwrap();
    assert_eq!(decode_event(&bytes).unwrap(), event);
}

#[test]
fn test_header_overflow_is_error() {
    let event = EventDescriptor::new("order", Uuid::new_v4(), 1, "t".repeat(200), vec![1u8]);

    let result = encode_event(&event);

    match result {
        Err(MapStoreError::HeaderOverflow { required, budget }) => {
            assert!(required > budget);
            assert_eq!(budget, HEADER_FIELD_BUDGET);
        }
        other => panic!("expected HeaderOverflow, got {:?}", other),
    }
}

#[test]
fn test_metadata_counts_against_budget() {
    let mut event = EventDescriptor::new("order", Uuid::new_v4(), 1, "created", vec![1u8]);
    for i in 0..10 {
        event = event.with_metadata(format!("key{}", i), "value");
    }

    assert!(matches!(
        encode_event(&event),
        Err(MapStoreError::HeaderOverflow { .. })
    ));
}

// =============================================================================
// Corruption Tests
// =============================================================================

#[test]
fn test_payload_corruption_detected() {
    let event = sample_event();
    let mut bytes = encode_event(&event).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0xFF;

    assert!(matches!(
        decode_event(&bytes),
        Err(MapStoreError::CorruptRecord(_))
    ));
}

#[test]
fn test_truncated_payload_detected() {
    let event = sample_event();
    let bytes = encode_event(&event).unwrap();

    let result = decode_event(&bytes[..bytes.len() - 2]);
    assert!(matches!(result, Err(MapStoreError::CorruptRecord(_))));
}

#[test]
fn test_short_header_detected() {
    let result = decode_header(&[0u8; 40]);
    assert!(matches!(result, Err(MapStoreError::CorruptRecord(_))));
}

#[test]
fn test_corrupt_string_length_detected() {
    let event = sample_event();
    let mut bytes = encode_event(&event).unwrap();
    // event_type length prefix follows event_id, sequence and data_length
    bytes[28..32].copy_from_slice(&1000u32.to_le_bytes());

    assert!(matches!(
        decode_header(&bytes),
        Err(MapStoreError::CorruptRecord(_))
    ));
}

#[test]
fn test_zeroed_header_reads_as_end_marker() {
    assert_eq!(peek_data_length(&[0u8; EVENT_HEADER_SIZE]), Some(0));
    assert_eq!(peek_data_length(&[0u8; 10]), None);
}

// =============================================================================
// Property Tests
// =============================================================================

proptest! {
    #[test]
    fn prop_round_trip(
        event_type in "[a-z]{0,12}",
        aggregate_type in "[a-z]{0,12}",
        version in any::<i64>(),
        sequence in any::<u64>(),
        timestamp in any::<i64>(),
        payload in prop::collection::vec(any::<u8>(), 1..512),
        meta_value in "[a-z0-9]{0,10}",
    ) {
        let mut event = EventDescriptor::new(aggregate_type, Uuid::new_v4(), version, event_type, payload)
            .with_timestamp(timestamp)
            .with_metadata("k", meta_value);
        event.sequence = sequence;

        let bytes = encode_event(&event).unwrap();
        prop_assert_eq!(decode_event(&bytes).unwrap(), event);
    }
}

//! Tests for the append-only event store
//!
//! These tests verify:
//! - Sequence assignment and per-aggregate ordering
//! - Version conflicts and rejected events
//! - Type and sequence lookups, including ring eviction
//! - Stream snapshots and cancellation
//! - Concurrent appends

use std::collections::HashSet;
use std::sync::Arc;
use std::thread;

use mapstore::config::SyncStrategy;
use mapstore::{CancellationToken, Config, EventDescriptor, EventStore, MapStoreError};
use tempfile::TempDir;
use uuid::Uuid;

// =============================================================================
// Helper Functions
// =============================================================================

fn test_config(dir: &TempDir) -> Config {
    Config::builder()
        .data_dir(dir.path())
        .sync_strategy(SyncStrategy::EveryWrite)
        .build()
}

fn event(aggregate_id: Uuid, version: i64, event_type: &str) -> EventDescriptor {
    let payload = format!("{{\"v\":{}}}", version).into_bytes();
    EventDescriptor::new("order", aggregate_id, version, event_type, payload)
}

// =============================================================================
// Append and Ordering Tests
// =============================================================================

#[test]
fn test_append_assigns_increasing_sequences() {
    let dir = TempDir::new().unwrap();
    let store = EventStore::open(test_config(&dir)).unwrap();
    let id = Uuid::new_v4();

    assert_eq!(store.get_last_sequence(), 0);
    assert_eq!(store.append(event(id, 1, "created")).unwrap(), 1);
    assert_eq!(store.append(event(id, 2, "paid")).unwrap(), 2);
    assert_eq!(store.append(event(Uuid::new_v4(), 1, "created")).unwrap(), 3);

    assert_eq!(store.get_last_sequence(), 3);
    assert_eq!(store.event_count(), 3);
    assert_eq!(store.aggregate_count(), 2);
}

#[test]
fn test_caller_sequence_is_overwritten() {
    let dir = TempDir::new().unwrap();
    let store = EventStore::open(test_config(&dir)).unwrap();
    let id = Uuid::new_v4();

    let mut e = event(id, 1, "created");
    e.sequence = 999;
    store.append(e).unwrap();

    let stored = store.get_events(id, 0).next().unwrap().unwrap();
    assert_eq!(stored.sequence, 1);
}

#[test]
fn test_get_events_in_version_order() {
    let dir = TempDir::new().unwrap();
    let store = EventStore::open(test_config(&dir)).unwrap();
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();

    for version in 1..=5 {
        store.append(event(a, version, "step")).unwrap();
        store.append(event(b, version * 10, "step")).unwrap();
    }

    let events: Vec<EventDescriptor> = store.get_events(a, 0).map(|e| e.unwrap()).collect();
    let versions: Vec<i64> = events.iter().map(|e| e.version).collect();
    assert_eq!(versions, vec![1, 2, 3, 4, 5]);
    assert!(events.iter().all(|e| e.aggregate_id == a));
    assert!(events.windows(2).all(|w| w[0].sequence < w[1].sequence));
}

#[test]
fn test_get_events_from_version() {
    let dir = TempDir::new().unwrap();
    let store = EventStore::open(test_config(&dir)).unwrap();
    let id = Uuid::new_v4();
    for version in 1..=6 {
        store.append(event(id, version, "step")).unwrap();
    }

    let versions: Vec<i64> = store.get_events(id, 4).map(|e| e.unwrap().version).collect();
    assert_eq!(versions, vec![4, 5, 6]);
}

#[test]
fn test_get_events_unknown_aggregate() {
    let dir = TempDir::new().unwrap();
    let store = EventStore::open(test_config(&dir)).unwrap();

    assert_eq!(store.get_events(Uuid::new_v4(), 0).count(), 0);
}

#[test]
fn test_event_fields_round_trip_through_store() {
    let dir = TempDir::new().unwrap();
    let store = EventStore::open(test_config(&dir)).unwrap();
    let id = Uuid::new_v4();
    let event_id = Uuid::new_v4();

    let original = EventDescriptor::new("invoice", id, 7, "issued", b"payload".to_vec())
        .with_event_id(event_id)
        .with_timestamp(1_700_000_000_000)
        .with_metadata("actor", "system");
    store.append(original.clone()).unwrap();

    let stored = store.get_events(id, 0).next().unwrap().unwrap();
    assert_eq!(stored.event_id, event_id);
    assert_eq!(stored.aggregate_type, "invoice");
    assert_eq!(stored.event_type, "issued");
    assert_eq!(stored.timestamp, 1_700_000_000_000);
    assert_eq!(&stored.payload[..], b"payload");
    assert_eq!(stored.metadata.get("actor").map(String::as_str), Some("system"));
}

// =============================================================================
// Rejection Tests
// =============================================================================

#[test]
fn test_version_conflict() {
    let dir = TempDir::new().unwrap();
    let store = EventStore::open(test_config(&dir)).unwrap();
    let id = Uuid::new_v4();
    store.append(event(id, 1, "created")).unwrap();
    store.append(event(id, 2, "paid")).unwrap();

    let result = store.append(event(id, 2, "paid"));

    match result {
        Err(MapStoreError::VersionConflict {
            aggregate_id,
            last_version,
            attempted,
        }) => {
            assert_eq!(aggregate_id, id);
            assert_eq!(last_version, 2);
            assert_eq!(attempted, 2);
        }
        other => panic!("expected VersionConflict, got {:?}", other),
    }
    assert!(matches!(
        store.append(event(id, 1, "late")),
        Err(MapStoreError::VersionConflict { .. })
    ));
    assert_eq!(store.get_last_sequence(), 2);
    assert_eq!(store.aggregate_version(id), Some(2));
}

#[test]
fn test_version_gaps_allowed() {
    let dir = TempDir::new().unwrap();
    let store = EventStore::open(test_config(&dir)).unwrap();
    let id = Uuid::new_v4();

    store.append(event(id, 1, "a")).unwrap();
    store.append(event(id, 10, "b")).unwrap();

    assert_eq!(store.aggregate_version(id), Some(10));
}

#[test]
fn test_empty_payload_rejected() {
    let dir = TempDir::new().unwrap();
    let store = EventStore::open(test_config(&dir)).unwrap();

    let result = store.append(EventDescriptor::new("order", Uuid::new_v4(), 1, "empty", Vec::<u8>::new()));

    assert!(matches!(result, Err(MapStoreError::InvalidEvent(_))));
    assert_eq!(store.event_count(), 0);
    assert_eq!(store.current_position(), 0);
}

#[test]
fn test_header_overflow_writes_nothing() {
    let dir = TempDir::new().unwrap();
    let store = EventStore::open(test_config(&dir)).unwrap();
    let id = Uuid::new_v4();

    let oversized = EventDescriptor::new("order", id, 1, "x".repeat(500), b"data".to_vec());
    let result = store.append(oversized);

    assert!(matches!(result, Err(MapStoreError::HeaderOverflow { .. })));
    assert_eq!(store.current_position(), 0);
    assert_eq!(store.get_last_sequence(), 0);

    // The failed append leaves the aggregate free to start at version 1
    assert_eq!(store.append(event(id, 1, "created")).unwrap(), 1);
}

// =============================================================================
// Type and Sequence Lookup Tests
// =============================================================================

#[test]
fn test_get_events_by_type() {
    let dir = TempDir::new().unwrap();
    let store = EventStore::open(test_config(&dir)).unwrap();
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();

    store.append(event(a, 1, "created")).unwrap();
    store.append(event(a, 2, "paid")).unwrap();
    store.append(event(b, 1, "created")).unwrap();

    let created: Vec<Uuid> = store
        .get_events_by_type("created")
        .map(|e| e.unwrap().aggregate_id)
        .collect();
    assert_eq!(created, vec![a, b]);
    assert_eq!(store.get_events_by_type("refunded").count(), 0);
}

#[test]
fn test_get_event_by_sequence_after_ring_eviction() {
    let dir = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(dir.path())
        .ring_buffer_capacity(4)
        .build();
    let store = EventStore::open(config).unwrap();
    let id = Uuid::new_v4();

    for version in 1..=6 {
        store.append(event(id, version, "step")).unwrap();
    }

    assert_eq!(store.buffered_sequence_count(), 4);
    assert_eq!(store.get_last_sequence(), 6);
    assert!(store.get_event_by_sequence(1).unwrap().is_none());
    assert!(store.get_event_by_sequence(2).unwrap().is_none());
    for sequence in 3..=6u64 {
        let found = store.get_event_by_sequence(sequence).unwrap().unwrap();
        assert_eq!(found.sequence, sequence);
        assert_eq!(found.version, sequence as i64);
    }
    assert!(store.get_event_by_sequence(7).unwrap().is_none());

    // Evicted from the ring but still on disk
    assert_eq!(store.get_events(id, 0).count(), 6);
}

// =============================================================================
// Stream Tests
// =============================================================================

#[test]
fn test_stream_is_a_snapshot() {
    let dir = TempDir::new().unwrap();
    let store = EventStore::open(test_config(&dir)).unwrap();
    let id = Uuid::new_v4();
    store.append(event(id, 1, "a")).unwrap();
    store.append(event(id, 2, "b")).unwrap();

    let mut stream = store.get_events(id, 0);
    assert_eq!(stream.remaining(), 2);
    assert_eq!(stream.next().unwrap().unwrap().version, 1);

    store.append(event(id, 3, "c")).unwrap();

    assert_eq!(stream.next().unwrap().unwrap().version, 2);
    assert!(stream.next().is_none());
}

#[test]
fn test_stream_cancellation() {
    let dir = TempDir::new().unwrap();
    let store = EventStore::open(test_config(&dir)).unwrap();
    let id = Uuid::new_v4();
    for version in 1..=5 {
        store.append(event(id, version, "step")).unwrap();
    }

    let token = CancellationToken::new();
    let mut stream = store.get_events_with_cancel(id, 0, &token);

    assert_eq!(stream.next().unwrap().unwrap().version, 1);
    token.cancel();
    assert!(matches!(stream.next(), Some(Err(MapStoreError::Cancelled))));
    assert!(stream.next().is_none());
}

#[test]
fn test_type_stream_cancellation() {
    let dir = TempDir::new().unwrap();
    let store = EventStore::open(test_config(&dir)).unwrap();
    for _ in 0..3 {
        store.append(event(Uuid::new_v4(), 1, "created")).unwrap();
    }

    let token = CancellationToken::new();
    let mut stream = store.get_events_by_type_with_cancel("created", &token);

    assert_eq!(stream.remaining(), 3);
    assert!(stream.next().unwrap().is_ok());
    token.cancel();
    assert!(matches!(stream.next(), Some(Err(MapStoreError::Cancelled))));
    assert!(stream.next().is_none());
}

// =============================================================================
// Growth and Concurrency Tests
// =============================================================================

#[test]
fn test_log_grows_past_initial_size() {
    let dir = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(dir.path())
        .initial_file_size(4096)
        .build();
    let store = EventStore::open(config).unwrap();
    let id = Uuid::new_v4();

    for version in 1..=20 {
        let e = EventDescriptor::new("blob", id, version, "chunk", vec![version as u8; 1000]);
        store.append(e).unwrap();
    }

    assert!(store.current_position() > 20_000);
    let payloads: Vec<u8> = store.get_events(id, 0).map(|e| e.unwrap().payload[0]).collect();
    assert_eq!(payloads, (1..=20u8).collect::<Vec<_>>());
}

#[test]
fn test_concurrent_appends_get_unique_sequences() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(EventStore::open(test_config(&dir)).unwrap());

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                let id = Uuid::new_v4();
                (1..=25)
                    .map(|version| store.append(event(id, version, "tick")).unwrap())
                    .collect::<Vec<u64>>()
            })
        })
        .collect();

    let mut sequences = HashSet::new();
    for handle in handles {
        let mine = handle.join().unwrap();
        assert!(mine.windows(2).all(|w| w[0] < w[1]));
        sequences.extend(mine);
    }

    assert_eq!(sequences.len(), 100);
    assert_eq!(store.get_last_sequence(), 100);
    assert_eq!(sequences.iter().max(), Some(&100));
}

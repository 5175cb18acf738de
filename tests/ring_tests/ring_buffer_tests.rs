//! Tests for the sequence-addressed ring buffer
//!
//! These tests verify:
//! - Capacity rounding
//! - Push/peek by sequence
//! - Overwrite-oldest once full
//! - Iteration order and clearing

use mapstore::ring::RingBuffer;

// =============================================================================
// Capacity Tests
// =============================================================================

#[test]
fn test_capacity_rounds_up_to_power_of_two() {
    assert_eq!(RingBuffer::<u32>::new(5).capacity(), 8);
    assert_eq!(RingBuffer::<u32>::new(8).capacity(), 8);
    assert_eq!(RingBuffer::<u32>::new(1000).capacity(), 1024);
}

#[test]
fn test_zero_capacity_becomes_one() {
    let mut ring = RingBuffer::new(0);
    assert_eq!(ring.capacity(), 1);

    ring.push("a");
    ring.push("b");
    assert_eq!(ring.len(), 1);
    assert_eq!(ring.newest(), Some(&"b"));
}

// =============================================================================
// Push / Peek Tests
// =============================================================================

#[test]
fn test_push_returns_sequences() {
    let mut ring = RingBuffer::new(4);

    assert_eq!(ring.push('a'), 0);
    assert_eq!(ring.push('b'), 1);
    assert_eq!(ring.try_peek(0), Some(&'a'));
    assert_eq!(ring.try_peek(1), Some(&'b'));
    assert_eq!(ring.try_peek(2), None);
}

#[test]
fn test_custom_start_sequence() {
    let mut ring = RingBuffer::with_start_sequence(4, 1);

    assert_eq!(ring.push(10), 1);
    assert_eq!(ring.try_peek(0), None);
    assert_eq!(ring.try_peek(1), Some(&10));
    assert_eq!(ring.next_sequence(), 2);
}

#[test]
fn test_empty_ring() {
    let ring: RingBuffer<u8> = RingBuffer::new(4);

    assert!(ring.is_empty());
    assert_eq!(ring.oldest_sequence(), None);
    assert_eq!(ring.newest(), None);
    assert_eq!(ring.try_peek(0), None);
}

// =============================================================================
// Overwrite Tests
// =============================================================================

#[test]
fn test_overwrite_evicts_oldest() {
    let mut ring = RingBuffer::new(4);
    for i in 0..5u64 {
        ring.push(i * 10);
    }

    assert!(ring.is_full());
    assert_eq!(ring.len(), 4);
    assert_eq!(ring.try_peek(0), None);
    for seq in 1..5u64 {
        assert_eq!(ring.try_peek(seq), Some(&(seq * 10)));
    }
    assert_eq!(ring.oldest_sequence(), Some(1));
}

#[test]
fn test_pop_oldest() {
    let mut ring = RingBuffer::new(4);
    ring.push("x");
    ring.push("y");

    assert_eq!(ring.pop_oldest(), Some("x"));
    assert_eq!(ring.try_peek(0), None);
    assert_eq!(ring.try_peek(1), Some(&"y"));
    assert_eq!(ring.pop_oldest(), Some("y"));
    assert_eq!(ring.pop_oldest(), None);
}

// =============================================================================
// Iteration Tests
// =============================================================================

#[test]
fn test_iter_oldest_first_after_wrap() {
    let mut ring = RingBuffer::new(4);
    for i in 0..6 {
        ring.push(i);
    }

    let items: Vec<(u64, i32)> = ring.iter().map(|(seq, v)| (seq, *v)).collect();
    assert_eq!(items, vec![(2, 2), (3, 3), (4, 4), (5, 5)]);
}

#[test]
fn test_clear_keeps_numbering() {
    let mut ring = RingBuffer::new(4);
    ring.push(1);
    ring.push(2);
    ring.clear();

    assert!(ring.is_empty());
    assert_eq!(ring.try_peek(1), None);
    assert_eq!(ring.push(3), 2);
}

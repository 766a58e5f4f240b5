//! Property tests for the ring buffer

use daudio_common::{DAudioError, RingBuffer};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Insert(Vec<u8>),
    Read(usize),
}

fn op_strategy(capacity: usize) -> impl Strategy<Value = Op> {
    prop_oneof![
        prop::collection::vec(any::<u8>(), 0..=capacity).prop_map(Op::Insert),
        (0..=capacity).prop_map(Op::Read),
    ]
}

proptest! {
    /// The buffer behaves exactly like a bounded FIFO of bytes
    #[test]
    fn behaves_like_bounded_fifo(ops in prop::collection::vec(op_strategy(64), 1..200)) {
        let capacity = 64;
        let mut ring = RingBuffer::with_capacity(capacity).unwrap();
        let mut model: std::collections::VecDeque<u8> = Default::default();

        for op in ops {
            match op {
                Op::Insert(data) => {
                    let fits = model.len() + data.len() <= capacity;
                    let result = ring.insert(&data);
                    if data.is_empty() || fits {
                        prop_assert!(result.is_ok());
                        model.extend(data.iter().copied());
                    } else {
                        let is_full_err = matches!(result, Err(DAudioError::BufferFull { .. }));
                        prop_assert!(is_full_err);
                    }
                }
                Op::Read(len) => {
                    let mut out = vec![0u8; len];
                    let result = ring.get_data(&mut out);
                    if len <= model.len() {
                        prop_assert!(result.is_ok());
                        let expected: Vec<u8> = model.drain(..len).collect();
                        prop_assert_eq!(out, expected);
                    } else {
                        prop_assert!(result.is_err());
                    }
                }
            }

            // Capacity invariant
            for n in [0, 1, model.len(), model.len() + 1, capacity] {
                prop_assert_eq!(ring.can_buffer_read_len(n), n <= model.len());
            }
            // Full/empty exclusivity
            prop_assert!(!(ring.is_full() && !ring.can_buffer_read_len(capacity)));
            prop_assert!(!(ring.is_empty() && ring.can_buffer_read_len(1)));
            prop_assert_eq!(ring.is_full(), model.len() == capacity);
            prop_assert_eq!(ring.is_empty(), model.is_empty());
        }
    }

    /// A sequence written across the array boundary reads back unchanged
    #[test]
    fn round_trip_across_boundary(offset in 1usize..40960, payload in prop::collection::vec(any::<u8>(), 1..4096)) {
        let mut ring = RingBuffer::init().unwrap();
        let capacity = ring.capacity();
        let offset = offset.min(capacity - 1);

        // Move both positions to `offset`
        let filler = vec![0u8; offset];
        ring.insert(&filler).unwrap();
        let mut drained = vec![0u8; offset];
        ring.get_data(&mut drained).unwrap();

        ring.insert(&payload).unwrap();
        let mut out = vec![0u8; payload.len()];
        ring.get_data(&mut out).unwrap();
        prop_assert_eq!(out, payload);
        prop_assert!(ring.is_empty());
    }
}

#[test]
fn wrap_with_small_tail() {
    let mut ring = RingBuffer::init().unwrap();
    let capacity = ring.capacity();
    let k = 3;

    let filler = vec![0u8; capacity - k];
    ring.insert(&filler).unwrap();
    let mut drained = vec![0u8; capacity - k];
    ring.get_data(&mut drained).unwrap();

    let payload: Vec<u8> = (0..=255u8).cycle().take(1000).collect();
    ring.insert(&payload).unwrap();
    assert!(ring.can_buffer_read_len(1000));
    assert!(!ring.can_buffer_read_len(1001));

    let mut out = vec![0u8; 1000];
    ring.get_data(&mut out).unwrap();
    assert_eq!(out, payload);
}

#[test]
fn fill_to_exact_capacity() {
    let mut ring = RingBuffer::with_capacity(16).unwrap();
    ring.insert(&[7u8; 10]).unwrap();
    let mut out = [0u8; 5];
    ring.get_data(&mut out).unwrap();
    ring.insert(&[8u8; 11]).unwrap();
    assert!(ring.is_full());
    assert!(ring.can_buffer_read_len(16));

    let mut all = [0u8; 16];
    ring.get_data(&mut all).unwrap();
    assert_eq!(&all[..5], &[7u8; 5]);
    assert_eq!(&all[5..], &[8u8; 11]);
    assert!(ring.is_empty());
}

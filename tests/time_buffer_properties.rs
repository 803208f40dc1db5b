//! Property-based tests for time buffer indexing

use proptest::prelude::*;
use signal_fusion::{BufferError, SampleKind, StreamDescriptor, TimeBuffer};

/// 2-dim i16 buffer at 100 Hz holding `capacity` samples
fn buffer(capacity: usize) -> TimeBuffer {
    let descriptor = StreamDescriptor::new(SampleKind::I16, 2, 100.0);
    TimeBuffer::new("prop", descriptor, capacity as f64 / 100.0)
}

/// Sample `i` encoded so every byte identifies its position
fn sample_bytes(i: u32) -> [u8; 4] {
    let a = (i as i16).to_le_bytes();
    let b = ((i as i16).wrapping_neg()).to_le_bytes();
    [a[0], a[1], b[0], b[1]]
}

fn write(buffer: &TimeBuffer, total: u32, chunk: usize) {
    let all: Vec<u8> = (0..total).flat_map(sample_bytes).collect();
    for piece in all.chunks(chunk * 4) {
        buffer.push(piece);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn retained_window_reads_back_what_was_written(
        capacity in 4usize..64,
        total in 1u32..400,
        chunk in 1usize..32,
        back in 0usize..64,
        len in 1usize..64,
    ) {
        let buffer = buffer(capacity);
        write(&buffer, total, chunk);
        prop_assert_eq!(buffer.position_samples(), total as i64);

        let len = len.min(capacity).min(total as usize);
        let oldest = (total as i64 - capacity as i64).max(0);
        let start = (total as i64 - len as i64 - back as i64).max(oldest);

        let mut dst = vec![0u8; len * 4];
        buffer.try_get(&mut dst, start, len).unwrap();
        let expected: Vec<u8> = (start as u32..start as u32 + len as u32)
            .flat_map(sample_bytes)
            .collect();
        prop_assert_eq!(dst, expected);
    }

    #[test]
    fn reads_below_the_retained_window_are_evicted(
        capacity in 4usize..64,
        overflow in 1u32..200,
        chunk in 1usize..32,
        below in 1i64..50,
    ) {
        let buffer = buffer(capacity);
        let total = capacity as u32 + overflow;
        write(&buffer, total, chunk);

        let oldest = total as i64 - capacity as i64;
        let start = (oldest - below).max(0);
        let mut dst = vec![0u8; 4];
        let result = buffer.try_get(&mut dst, start, 1);
        prop_assert_eq!(
            result,
            Err(BufferError::Evicted { requested_start: start, oldest })
        );
    }

    #[test]
    fn reads_past_the_write_position_are_not_yet_available(
        capacity in 4usize..64,
        total in 0u32..100,
        ahead in 1usize..4,
    ) {
        let buffer = buffer(capacity);
        write(&buffer, total, 8);

        let mut dst = vec![0u8; ahead * 4];
        let result = buffer.try_get(&mut dst, total as i64, ahead);
        let not_yet = matches!(result, Err(BufferError::NotYetAvailable { .. }));
        prop_assert!(not_yet, "{:?}", result);
    }
}

//! Integration tests for the buffering engine at realistic scale:
//! a 2 MB source pushed through a 256 KB window with disk spill.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rebuf::buffer::InputStreamBuffer;
use rebuf::store::{FileStore, TempFileManager};
use std::io::Cursor;
use std::sync::Arc;

const KB_256: usize = 256 * 1024;
const MB_2: usize = 2 * 1024 * 1024;

fn random_payload(len: usize, seed: u64) -> Vec<u8> {
    let mut rng = SmallRng::seed_from_u64(seed);
    (0..len).map(|_| rng.gen()).collect()
}

fn buffer_over(data: Vec<u8>, capacity: usize) -> InputStreamBuffer {
    let store = Box::new(FileStore::new(Arc::new(TempFileManager::new())).unwrap());
    InputStreamBuffer::new(Box::new(Cursor::new(data)), capacity, store)
}

/// Loop `get` until `dest` is full or end-of-data, the way any caller of
/// a streaming source must.
fn read_fully(buffer: &InputStreamBuffer, dest: &mut [u8], position: u64) -> usize {
    let mut total = 0;
    while total < dest.len() {
        match buffer
            .get(&mut dest[total..], position + total as u64)
            .unwrap()
        {
            Some(read) => total += read,
            None => break,
        }
    }
    total
}

#[test]
fn slice_inside_first_window_segment() {
    let data = random_payload(MB_2, 1);
    let buffer = buffer_over(data.clone(), KB_256);

    // Entirely inside the first window: one fast-path copy.
    let position = KB_256 / 4;
    let len = (KB_256 / 2) - position;
    let mut dest = vec![0u8; len];

    let read = buffer.get(&mut dest, position as u64).unwrap();
    assert_eq!(read, Some(len));
    assert_eq!(&dest[..], &data[position..position + len]);
}

#[test]
fn slice_spanning_window_boundary() {
    let data = random_payload(MB_2, 2);
    let buffer = buffer_over(data.clone(), KB_256);

    // Starts 10 bytes before the current window end, runs half a window
    // past it. Must be assembled across multiple short reads.
    let position = KB_256 - 10;
    let len = KB_256 / 2;
    let mut dest = vec![0u8; len];

    let read = read_fully(&buffer, &mut dest, position as u64);
    assert_eq!(read, len);
    assert_eq!(&dest[..], &data[position..position + len]);
}

#[test]
fn seek_back_to_zero_reads_through_off_heap() {
    let data = random_payload(MB_2, 3);
    let buffer = buffer_over(data.clone(), KB_256);

    // Drag the window deep into the stream.
    let mut sink = vec![0u8; 64 * 1024];
    let position = (MB_2 - sink.len()) as u64;
    read_fully(&buffer, &mut sink, position);
    assert!(buffer.buffer_range().start > 0);

    // Offset 0 is long gone from memory; the spill file must reproduce
    // it byte-for-byte.
    let mut dest = vec![0u8; KB_256];
    let read = read_fully(&buffer, &mut dest, 0);
    assert_eq!(read, KB_256);
    assert_eq!(&dest[..], &data[..KB_256]);
}

#[test]
fn arbitrary_positions_reproduce_source_bytes() {
    let data = random_payload(MB_2, 4);
    let buffer = buffer_over(data.clone(), KB_256);

    let mut rng = SmallRng::seed_from_u64(42);
    for _ in 0..50 {
        let position = rng.gen_range(0..MB_2 as u64);
        let len = rng
            .gen_range(1..=64 * 1024)
            .min(MB_2 as u64 - position) as usize;

        let mut dest = vec![0u8; len];
        let read = read_fully(&buffer, &mut dest, position);
        assert_eq!(read, len, "at position {position}");
        let p = position as usize;
        assert_eq!(&dest[..], &data[p..p + len], "at position {position}");
    }
}

#[test]
fn window_start_never_regresses() {
    let data = random_payload(MB_2, 5);
    let buffer = buffer_over(data, KB_256);

    let mut rng = SmallRng::seed_from_u64(7);
    let mut last_start = 0;
    let mut dest = vec![0u8; 4096];
    for _ in 0..200 {
        let position = rng.gen_range(0..(MB_2 - dest.len()) as u64);
        read_fully(&buffer, &mut dest, position);

        let start = buffer.buffer_range().start;
        assert!(start >= last_start, "window start regressed");
        last_start = start;
    }
}

#[test]
fn oversized_request_yields_short_count_not_error() {
    let data = random_payload(1000, 6);
    let buffer = buffer_over(data.clone(), 256);

    // Ask for far more than remains near the tail.
    let mut dest = vec![0u8; 4096];
    let read = read_fully(&buffer, &mut dest, 900);
    assert_eq!(read, 100);
    assert_eq!(&dest[..100], &data[900..]);

    // And past the end: clean EOF.
    assert_eq!(buffer.get(&mut dest, 1000).unwrap(), None);
}

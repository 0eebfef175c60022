//! Tests for inbound chunk reassembly, limits and eviction.

use std::{
    num::NonZeroUsize,
    time::{Duration, Instant},
};

use rstest::{fixture, rstest};

use crate::frame::{
    AssemblyError,
    BatchId,
    ChunkAssembler,
    Encoded,
    Frame,
    FrameCodec,
    FrameError,
};

const ALPHABET: &str = "abcdefghijklmnopqrstuvwxyz";

#[fixture]
fn assembler() -> ChunkAssembler {
    ChunkAssembler::new(
        NonZeroUsize::new(64).expect("non-zero"),
        Duration::from_secs(30),
    )
}

fn batch(start: u32, text: &str) -> Vec<Frame> {
    let codec =
        FrameCodec::with_starting_batch_id(NonZeroUsize::new(23), BatchId::new(start));
    match codec.encode(text).expect("encode") {
        Encoded::Chunked(frames) => frames,
        Encoded::Single(_) => panic!("expected chunked output"),
    }
}

#[rstest]
fn completes_after_last_chunk(mut assembler: ChunkAssembler) {
    let mut frames = batch(1, ALPHABET).into_iter();
    let first = frames.next().expect("first");
    let second = frames.next().expect("second");
    let third = frames.next().expect("third");

    assert_eq!(assembler.push(first).expect("push"), None);
    assert_eq!(assembler.push(second).expect("push"), None);
    assert_eq!(assembler.buffered_len(), 1);
    assert_eq!(
        assembler.push(third).expect("push").as_deref(),
        Some(ALPHABET)
    );
    assert_eq!(assembler.buffered_len(), 0);
}

#[rstest]
fn tolerates_out_of_order_delivery(mut assembler: ChunkAssembler) {
    let mut frames = batch(2, ALPHABET);
    frames.swap(0, 2);
    let mut result = None;
    for frame in frames {
        result = assembler.push(frame).expect("push");
    }
    assert_eq!(result.as_deref(), Some(ALPHABET));
}

#[rstest]
fn interleaved_batches_are_kept_apart(mut assembler: ChunkAssembler) {
    let upper = ALPHABET.to_uppercase();
    let first = batch(10, ALPHABET);
    let second = batch(11, &upper);

    let mut completed = Vec::new();
    for (a, b) in first.into_iter().zip(second) {
        completed.extend(assembler.push(a).expect("push"));
        completed.extend(assembler.push(b).expect("push"));
    }
    assert_eq!(completed, vec![ALPHABET.to_owned(), upper]);
}

#[rstest]
fn duplicate_chunk_discards_batch(mut assembler: ChunkAssembler) {
    let frames = batch(3, ALPHABET);
    assembler.push(frames[0].clone()).expect("push");
    let err = assembler
        .push(frames[0].clone())
        .expect_err("duplicate must fail");
    assert_eq!(
        err,
        AssemblyError::Frame(FrameError::DuplicateChunk { index: 0 })
    );
    assert_eq!(assembler.buffered_len(), 0);
}

#[rstest]
fn single_frame_is_rejected(mut assembler: ChunkAssembler) {
    let single = FrameCodec::unbounded().encode("hi").expect("encode");
    let err = assembler
        .push(single.frames()[0].clone())
        .expect_err("single frames are not chunks");
    assert!(matches!(
        err,
        AssemblyError::Frame(FrameError::TypeMismatch { .. })
    ));
}

#[test]
fn oversized_batch_is_rejected() {
    let mut assembler = ChunkAssembler::new(
        NonZeroUsize::new(15).expect("non-zero"),
        Duration::from_secs(30),
    );
    let frames = batch(4, ALPHABET);
    assembler.push(frames[0].clone()).expect("first fits");
    let err = assembler
        .push(frames[1].clone())
        .expect_err("second chunk exceeds cap");
    assert!(matches!(
        err,
        AssemblyError::MessageTooLarge { attempted: 20, .. }
    ));
    assert_eq!(assembler.buffered_len(), 0);
}

#[rstest]
fn stale_batches_are_evicted(mut assembler: ChunkAssembler) {
    let start = Instant::now();
    let frames = batch(5, ALPHABET);
    assembler
        .push_at(frames[0].clone(), start)
        .expect("push");

    assert!(
        assembler
            .purge_expired_at(start + Duration::from_secs(29))
            .is_empty()
    );
    assert_eq!(
        assembler.purge_expired_at(start + Duration::from_secs(30)),
        vec![BatchId::new(5)]
    );
    assert_eq!(assembler.buffered_len(), 0);
}

#[rstest]
fn late_chunks_start_a_fresh_batch_after_eviction(mut assembler: ChunkAssembler) {
    let start = Instant::now();
    let frames = batch(6, ALPHABET);
    assembler.push_at(frames[0].clone(), start).expect("push");

    let later = start + Duration::from_secs(31);
    assert_eq!(assembler.push_at(frames[1].clone(), later).expect("push"), None);
    assert_eq!(assembler.push_at(frames[2].clone(), later).expect("push"), None);
    assert_eq!(assembler.buffered_len(), 1);
}

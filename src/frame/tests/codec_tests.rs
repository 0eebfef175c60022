//! Tests for frame encoding, decoding and header helpers.

use std::num::NonZeroUsize;

use rstest::rstest;

use crate::frame::{
    BatchId,
    CHUNK_HEADER_SIZE,
    ChunkHeader,
    Encoded,
    Frame,
    FrameCodec,
    FrameError,
    FrameKind,
    decode,
    decode_batch,
    is_final_message,
    is_partial_message,
};

const ALPHABET: &str = "abcdefghijklmnopqrstuvwxyz";

fn limit(bytes: usize) -> Option<NonZeroUsize> { NonZeroUsize::new(bytes) }

fn chunked(text: &str, max: usize) -> Vec<Frame> {
    let codec = FrameCodec::with_starting_batch_id(limit(max), BatchId::new(77));
    match codec.encode(text).expect("encode") {
        Encoded::Chunked(frames) => frames,
        Encoded::Single(_) => panic!("expected a chunked batch for {} bytes", text.len()),
    }
}

#[test]
fn header_size_is_thirteen_bytes() {
    assert_eq!(CHUNK_HEADER_SIZE, 13);
}

#[test]
fn unbounded_codec_emits_single_frame() {
    let encoded = FrameCodec::unbounded().encode(ALPHABET).expect("encode");
    let Encoded::Single(frame) = &encoded else {
        panic!("expected single frame");
    };
    assert_eq!(frame.as_bytes()[0], FrameKind::SINGLE_TAG);
    assert_eq!(&frame.as_bytes()[1..], ALPHABET.as_bytes());
    assert_eq!(decode(frame).expect("decode"), ALPHABET);
}

#[rstest]
#[case::exact_fit(27)]
#[case::spare_room(64)]
fn message_within_limit_stays_single(#[case] max: usize) {
    let encoded = FrameCodec::new(NonZeroUsize::new(max).expect("non-zero"))
        .encode(ALPHABET)
        .expect("encode");
    assert!(!encoded.is_chunked());
    assert_eq!(encoded.frames()[0].len(), ALPHABET.len() + 1);
}

#[test]
fn alphabet_splits_into_three_chunks() {
    let frames = chunked(ALPHABET, 23);

    let sizes: Vec<usize> = frames.iter().map(Frame::len).collect();
    assert_eq!(sizes, vec![23, 23, 19]);

    let slices = [&ALPHABET[0..10], &ALPHABET[10..20], &ALPHABET[20..26]];
    for (expected_index, (frame, slice)) in frames.iter().zip(slices).enumerate() {
        let header = frame.chunk_header().expect("chunk header");
        assert_eq!(header.index() as usize, expected_index);
        assert_eq!(header.total_chunks(), 3);
        assert_eq!(header.batch_id(), BatchId::new(77));
        assert_eq!(frame.payload(), slice.as_bytes());
    }
    assert_eq!(decode_batch(&frames).expect("decode"), ALPHABET);
}

#[test]
fn chunk_header_is_big_endian() {
    let frames = chunked(ALPHABET, 23);
    let second = frames[1].as_bytes();
    assert_eq!(second[0], FrameKind::CHUNK_TAG);
    assert_eq!(&second[1..5], &77u32.to_be_bytes());
    assert_eq!(&second[5..9], &1u32.to_be_bytes());
    assert_eq!(&second[9..13], &3u32.to_be_bytes());
}

#[test]
fn no_frame_exceeds_limit() {
    let text = "ü".repeat(100);
    for max in 14..40 {
        for frame in chunked(&text, max) {
            assert!(frame.len() <= max, "frame of {} bytes exceeds {max}", frame.len());
        }
    }
}

#[test]
fn batch_ids_advance_per_call() {
    let codec = FrameCodec::with_starting_batch_id(limit(20), BatchId::new(5));
    let first = codec.encode(ALPHABET).expect("encode");
    let second = codec.encode(ALPHABET).expect("encode");
    let id = |encoded: &Encoded| encoded.frames()[0].chunk_header().expect("header").batch_id();
    assert_eq!(id(&first), BatchId::new(5));
    assert_eq!(id(&second), BatchId::new(6));
}

#[test]
fn finality_only_for_last_chunk() {
    let frames = chunked(ALPHABET, 23);
    let finals: Vec<bool> = frames
        .iter()
        .map(|frame| is_final_message(&frame.chunk_header().expect("header")))
        .collect();
    assert_eq!(finals, vec![false, false, true]);
}

#[test]
fn partial_message_detection_checks_tag() {
    let frames = chunked(ALPHABET, 23);
    assert!(frames.iter().all(is_partial_message));
    let single = FrameCodec::unbounded().encode("hi").expect("encode");
    assert!(!is_partial_message(&single.frames()[0]));
}

#[test]
fn decoding_chunk_as_single_fails() {
    let frames = chunked(ALPHABET, 23);
    assert_eq!(
        decode(&frames[0]),
        Err(FrameError::TypeMismatch {
            expected: FrameKind::Single,
            found: FrameKind::Chunk,
        })
    );
}

#[test]
fn decoding_single_as_batch_fails() {
    let single = FrameCodec::unbounded().encode("hello").expect("encode");
    assert_eq!(
        decode_batch(single.frames()),
        Err(FrameError::TypeMismatch {
            expected: FrameKind::Chunk,
            found: FrameKind::Single,
        })
    );
}

#[test]
fn mixed_batch_is_rejected() {
    let mut frames = chunked(ALPHABET, 23);
    let single = FrameCodec::unbounded().encode("x").expect("encode");
    frames.push(single.frames()[0].clone());
    assert!(matches!(
        decode_batch(&frames),
        Err(FrameError::TypeMismatch { .. })
    ));
}

#[rstest]
#[case(0)]
#[case(1)]
#[case(2)]
fn removing_any_chunk_fails(#[case] removed: usize) {
    let mut frames = chunked(ALPHABET, 23);
    frames.remove(removed);
    assert_eq!(
        decode_batch(&frames),
        Err(FrameError::MissingChunk {
            index: u32::try_from(removed).expect("small index"),
            total: 3,
        })
    );
}

#[test]
fn chunks_decode_in_any_order() {
    let mut frames = chunked(ALPHABET, 23);
    frames.reverse();
    assert_eq!(decode_batch(&frames).expect("decode"), ALPHABET);
}

#[test]
fn duplicate_chunk_is_rejected() {
    let mut frames = chunked(ALPHABET, 23);
    frames.push(frames[1].clone());
    assert_eq!(
        decode_batch(&frames),
        Err(FrameError::DuplicateChunk { index: 1 })
    );
}

#[test]
fn chunks_from_different_batches_are_rejected() {
    let mut frames = chunked(ALPHABET, 23);
    let other = FrameCodec::with_starting_batch_id(limit(23), BatchId::new(900))
        .encode(ALPHABET)
        .expect("encode");
    frames[2] = other.frames()[2].clone();
    assert_eq!(
        decode_batch(&frames),
        Err(FrameError::BatchMismatch {
            expected: BatchId::new(77),
            found: BatchId::new(900),
        })
    );
}

#[test]
fn out_of_range_index_is_rejected() {
    let mut buf = Vec::new();
    ChunkHeader::new(BatchId::new(1), 4, 2).write_to(&mut buf);
    let frame = Frame::from_bytes(buf);
    assert_eq!(
        decode_batch(&[frame]),
        Err(FrameError::IndexOutOfRange { index: 4, total: 2 })
    );
}

#[rstest]
#[case::empty(Vec::new(), FrameError::EmptyFrame)]
#[case::unknown(vec![0x7f, 1, 2], FrameError::UnknownKind { tag: 0x7f })]
#[case::truncated(vec![FrameKind::CHUNK_TAG, 0, 0], FrameError::Truncated { len: 3 })]
fn malformed_frames_are_rejected(#[case] bytes: Vec<u8>, #[case] expected: FrameError) {
    assert_eq!(decode_batch(&[Frame::from_bytes(bytes)]), Err(expected));
}

#[test]
fn empty_batch_is_rejected() {
    assert_eq!(decode_batch(&[]), Err(FrameError::EmptyBatch));
}

#[rstest]
#[case(1)]
#[case(13)]
fn limit_without_payload_room_is_rejected(#[case] max: usize) {
    let codec = FrameCodec::new(NonZeroUsize::new(max).expect("non-zero"));
    assert_eq!(
        codec.encode(ALPHABET),
        Err(FrameError::FrameTooSmall {
            max_frame_bytes: max
        })
    );
}

#[test]
fn invalid_utf8_single_frame_is_rejected() {
    let frame = Frame::from_bytes(vec![FrameKind::SINGLE_TAG, 0xff, 0xfe]);
    assert!(matches!(decode(&frame), Err(FrameError::InvalidUtf8(_))));
}

#[test]
fn multibyte_characters_survive_chunk_boundaries() {
    let text = "héllo wörld ✓ ünïcödé";
    let frames = chunked(text, 15);
    assert!(frames.len() > 1);
    assert_eq!(decode_batch(&frames).expect("decode"), text);
}

#[test]
fn empty_message_round_trips() {
    let encoded = FrameCodec::new(NonZeroUsize::new(14).expect("non-zero"))
        .encode("")
        .expect("encode");
    assert_eq!(encoded.decode().expect("decode"), "");
}

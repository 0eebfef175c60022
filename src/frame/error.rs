//! Error types emitted by the framing layer.
//!
//! Decode failures are reported synchronously and precisely so callers can
//! tell a malformed frame apart from an incomplete batch.

use std::{num::NonZeroUsize, str::Utf8Error};

use thiserror::Error;

use super::{BatchId, FrameKind};

/// Errors produced while encoding or decoding frames.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    /// The frame contained no bytes at all.
    #[error("frame is empty")]
    EmptyFrame,
    /// The first byte did not match a known frame kind.
    #[error("unknown frame tag {tag:#04x}")]
    UnknownKind { tag: u8 },
    /// A frame carried a different kind than the decode mode requires.
    #[error("frame type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: FrameKind, found: FrameKind },
    /// A chunk frame was shorter than its fixed header.
    #[error("chunk frame truncated: {len} bytes")]
    Truncated { len: usize },
    /// An empty frame sequence was passed to batch decoding.
    #[error("chunk batch contains no frames")]
    EmptyBatch,
    /// A chunk belonged to a different batch than the first one.
    #[error("chunk batch mismatch: expected {expected}, found {found}")]
    BatchMismatch { expected: BatchId, found: BatchId },
    /// Chunks disagreed on the number of chunks in the batch.
    #[error("chunk total mismatch: expected {expected}, found {found}")]
    TotalMismatch { expected: u32, found: u32 },
    /// A chunk index lay outside `0..total`.
    #[error("chunk index {index} out of range for {total} chunks")]
    IndexOutOfRange { index: u32, total: u32 },
    /// The same chunk index appeared more than once.
    #[error("duplicate chunk index {index}")]
    DuplicateChunk { index: u32 },
    /// A chunk index was absent from the batch.
    #[error("missing chunk {index} of {total}")]
    MissingChunk { index: u32, total: u32 },
    /// The frame limit leaves no room for chunk payload bytes.
    #[error("max frame size {max_frame_bytes} cannot hold a chunk header and payload")]
    FrameTooSmall { max_frame_bytes: usize },
    /// The message needs more chunks than a `u32` index can address.
    #[error("message requires {chunks} chunks which exceeds u32::MAX")]
    TooManyChunks { chunks: usize },
    /// The reassembled payload was not valid UTF-8.
    #[error("frame payload is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] Utf8Error),
}

/// Errors produced by the stateful [`ChunkAssembler`](crate::frame::ChunkAssembler).
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum AssemblyError {
    /// The frame or the completed batch failed to decode.
    #[error(transparent)]
    Frame(#[from] FrameError),
    /// Buffering the chunk would exceed the configured message cap.
    #[error("batch {batch_id} too large: attempted {attempted} bytes (limit {limit})")]
    MessageTooLarge {
        batch_id: BatchId,
        attempted: usize,
        limit: NonZeroUsize,
    },
}

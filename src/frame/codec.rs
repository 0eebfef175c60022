//! Stateless conversion between text messages and bounded binary frames.
//!
//! [`FrameCodec`] turns a UTF-8 message into either one `SINGLE` frame or a
//! batch of `CHUNK` frames that each fit within the configured frame limit.
//! Decoding is the exact inverse and rejects mixed, incomplete or malformed
//! input instead of guessing.

use std::{
    num::NonZeroUsize,
    sync::atomic::{AtomicU32, Ordering},
};

use bytes::{BufMut, Bytes, BytesMut};

use super::{BatchId, CHUNK_HEADER_SIZE, ChunkHeader, FrameError, FrameKind};

/// One bounded unit written to the transport.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Frame(Bytes);

impl Frame {
    /// Wrap raw bytes received from the transport.
    ///
    /// No validation happens here; decoding reports malformed frames.
    #[must_use]
    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self { Self(bytes.into()) }

    fn single(payload: &[u8]) -> Self {
        let mut buf = BytesMut::with_capacity(1 + payload.len());
        buf.put_u8(FrameKind::Single.tag());
        buf.put_slice(payload);
        Self(buf.freeze())
    }

    fn chunk(header: ChunkHeader, payload: &[u8]) -> Self {
        let mut buf = BytesMut::with_capacity(CHUNK_HEADER_SIZE + payload.len());
        header.write_to(&mut buf);
        buf.put_slice(payload);
        Self(buf.freeze())
    }

    /// Return the frame kind, or `None` for empty or unknown frames.
    #[must_use]
    pub fn kind(&self) -> Option<FrameKind> { self.0.first().copied().and_then(FrameKind::from_tag) }

    /// Validate and return the frame kind.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::EmptyFrame`] or [`FrameError::UnknownKind`].
    pub fn try_kind(&self) -> Result<FrameKind, FrameError> {
        let tag = *self.0.first().ok_or(FrameError::EmptyFrame)?;
        FrameKind::from_tag(tag).ok_or(FrameError::UnknownKind { tag })
    }

    /// Parse the chunk header of a `CHUNK` frame.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::TypeMismatch`] for `SINGLE` frames and
    /// [`FrameError::Truncated`] when the header is incomplete.
    pub fn chunk_header(&self) -> Result<ChunkHeader, FrameError> {
        expect_kind(self, FrameKind::Chunk)?;
        ChunkHeader::read_from(&self.0)
    }

    /// Borrow the payload that follows the tag and any header.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        match self.kind() {
            Some(FrameKind::Single) => &self.0[1..],
            Some(FrameKind::Chunk) => self.0.get(CHUNK_HEADER_SIZE..).unwrap_or_default(),
            None => &[],
        }
    }

    /// Borrow the complete encoded frame.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] { &self.0 }

    /// Consume the frame, returning its encoded bytes.
    #[must_use]
    pub fn into_bytes(self) -> Bytes { self.0 }

    /// Encoded length in bytes, including tag and header.
    #[must_use]
    #[expect(clippy::len_without_is_empty, reason = "encoded frames always carry a tag")]
    pub fn len(&self) -> usize { self.0.len() }
}

impl From<Bytes> for Frame {
    fn from(bytes: Bytes) -> Self { Self(bytes) }
}

/// Output of [`FrameCodec::encode`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Encoded {
    /// The message fit in one `SINGLE` frame.
    Single(Frame),
    /// The message was split into a batch of `CHUNK` frames.
    Chunked(Vec<Frame>),
}

impl Encoded {
    /// Borrow the frames in transmission order.
    #[must_use]
    pub fn frames(&self) -> &[Frame] {
        match self {
            Self::Single(frame) => std::slice::from_ref(frame),
            Self::Chunked(frames) => frames,
        }
    }

    /// Consume the output, returning the frames in transmission order.
    #[must_use]
    pub fn into_frames(self) -> Vec<Frame> {
        match self {
            Self::Single(frame) => vec![frame],
            Self::Chunked(frames) => frames,
        }
    }

    /// Whether the message required chunking.
    #[must_use]
    pub fn is_chunked(&self) -> bool { matches!(self, Self::Chunked(_)) }

    /// Decode the frames back into text.
    ///
    /// # Errors
    ///
    /// Propagates any [`FrameError`] raised by [`decode`] or [`decode_batch`].
    pub fn decode(&self) -> Result<String, FrameError> {
        match self {
            Self::Single(frame) => decode(frame),
            Self::Chunked(frames) => decode_batch(frames),
        }
    }
}

/// Splits text messages into frames no larger than a configured limit.
///
/// Each chunked message receives a fresh [`BatchId`] from an internal
/// counter, so concurrent batches from one codec never collide until the
/// `u32` space wraps.
#[derive(Debug)]
pub struct FrameCodec {
    max_frame_bytes: Option<NonZeroUsize>,
    next_batch_id: AtomicU32,
}

impl Default for FrameCodec {
    fn default() -> Self { Self::unbounded() }
}

impl FrameCodec {
    /// Create a codec that never splits messages.
    #[must_use]
    pub const fn unbounded() -> Self {
        Self {
            max_frame_bytes: None,
            next_batch_id: AtomicU32::new(0),
        }
    }

    /// Create a codec capping every frame at `max_frame_bytes`.
    #[must_use]
    pub const fn new(max_frame_bytes: NonZeroUsize) -> Self {
        Self::with_starting_batch_id(Some(max_frame_bytes), BatchId::new(0))
    }

    /// Create a codec whose batch identifiers start at `start_at`.
    #[must_use]
    pub const fn with_starting_batch_id(
        max_frame_bytes: Option<NonZeroUsize>,
        start_at: BatchId,
    ) -> Self {
        Self {
            max_frame_bytes,
            next_batch_id: AtomicU32::new(start_at.get()),
        }
    }

    /// Return the configured frame limit, if any.
    #[must_use]
    pub const fn max_frame_bytes(&self) -> Option<NonZeroUsize> { self.max_frame_bytes }

    /// Generate the next [`BatchId`], wrapping at `u32::MAX`.
    pub fn next_batch_id(&self) -> BatchId {
        BatchId::new(self.next_batch_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Encode `text` into one or more frames.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::FrameTooSmall`] when chunking is needed but the
    /// limit cannot hold a header plus at least one payload byte, or
    /// [`FrameError::TooManyChunks`] when the index space is exhausted.
    pub fn encode(&self, text: &str) -> Result<Encoded, FrameError> {
        let bytes = text.as_bytes();
        let Some(limit) = self.max_frame_bytes else {
            return Ok(Encoded::Single(Frame::single(bytes)));
        };
        let max = limit.get();
        if bytes.len() < max {
            return Ok(Encoded::Single(Frame::single(bytes)));
        }

        let chunk_size = max
            .checked_sub(CHUNK_HEADER_SIZE)
            .filter(|size| *size > 0)
            .ok_or(FrameError::FrameTooSmall {
                max_frame_bytes: max,
            })?;
        let chunks = bytes.len().div_ceil(chunk_size);
        let total_chunks =
            u32::try_from(chunks).map_err(|_| FrameError::TooManyChunks { chunks })?;
        let batch_id = self.next_batch_id();

        let frames = (0..total_chunks)
            .zip(bytes.chunks(chunk_size))
            .map(|(index, slice)| {
                Frame::chunk(ChunkHeader::new(batch_id, index, total_chunks), slice)
            })
            .collect();
        Ok(Encoded::Chunked(frames))
    }
}

/// Encode `text` with an optional frame limit using a random batch id.
///
/// Prefer a long-lived [`FrameCodec`] when encoding many messages.
///
/// # Errors
///
/// See [`FrameCodec::encode`].
///
/// # Examples
///
/// ```
/// use std::num::NonZeroUsize;
///
/// use relayframe::frame::{decode_batch, encode};
///
/// let encoded = encode("abcdefghijklmnopqrstuvwxyz", NonZeroUsize::new(23)).unwrap();
/// assert_eq!(encoded.frames().len(), 3);
/// assert_eq!(decode_batch(encoded.frames()).unwrap(), "abcdefghijklmnopqrstuvwxyz");
/// ```
pub fn encode(text: &str, max_frame_bytes: Option<NonZeroUsize>) -> Result<Encoded, FrameError> {
    FrameCodec::with_starting_batch_id(max_frame_bytes, BatchId::new(rand::random())).encode(text)
}

/// Decode a single `SINGLE` frame.
///
/// # Errors
///
/// Returns [`FrameError::TypeMismatch`] for `CHUNK` frames and
/// [`FrameError::InvalidUtf8`] for malformed text.
pub fn decode(frame: &Frame) -> Result<String, FrameError> {
    expect_kind(frame, FrameKind::Single)?;
    Ok(std::str::from_utf8(frame.payload())?.to_owned())
}

/// Decode a complete batch of `CHUNK` frames in any order.
///
/// # Errors
///
/// Returns [`FrameError::TypeMismatch`] if any frame is not a chunk,
/// [`FrameError::MissingChunk`] if an index is absent, and the other
/// [`FrameError`] variants for inconsistent headers.
pub fn decode_batch(frames: &[Frame]) -> Result<String, FrameError> {
    let first = frames.first().ok_or(FrameError::EmptyBatch)?;
    let lead = first.chunk_header()?;
    let total = lead.total_chunks();

    let mut parts = Vec::with_capacity(frames.len());
    for frame in frames {
        let header = frame.chunk_header()?;
        if header.batch_id() != lead.batch_id() {
            return Err(FrameError::BatchMismatch {
                expected: lead.batch_id(),
                found: header.batch_id(),
            });
        }
        if header.total_chunks() != total {
            return Err(FrameError::TotalMismatch {
                expected: total,
                found: header.total_chunks(),
            });
        }
        if header.index() >= total {
            return Err(FrameError::IndexOutOfRange {
                index: header.index(),
                total,
            });
        }
        parts.push((header.index(), frame.payload()));
    }
    parts.sort_unstable_by_key(|(index, _)| *index);

    let mut expected = 0u32;
    let mut buf = Vec::with_capacity(parts.iter().map(|(_, payload)| payload.len()).sum());
    for (index, payload) in parts {
        if index < expected {
            return Err(FrameError::DuplicateChunk { index });
        }
        if index > expected {
            return Err(FrameError::MissingChunk {
                index: expected,
                total,
            });
        }
        buf.extend_from_slice(payload);
        expected += 1;
    }
    if expected < total {
        return Err(FrameError::MissingChunk {
            index: expected,
            total,
        });
    }

    String::from_utf8(buf).map_err(|err| FrameError::InvalidUtf8(err.utf8_error()))
}

/// Report whether `frame` is one chunk of a larger batch.
#[must_use]
pub fn is_partial_message(frame: &Frame) -> bool { frame.kind() == Some(FrameKind::Chunk) }

fn expect_kind(frame: &Frame, expected: FrameKind) -> Result<(), FrameError> {
    let found = frame.try_kind()?;
    if found == expected {
        Ok(())
    } else {
        Err(FrameError::TypeMismatch { expected, found })
    }
}

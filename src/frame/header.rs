//! Fixed-size header carried by every `CHUNK` frame.
//!
//! Layout after the tag byte: `batch_id`, `index` and `total_chunks`, each a
//! big-endian `u32`. The tag plus the three fields make up
//! [`CHUNK_HEADER_SIZE`] bytes.

use bytes::{Buf, BufMut};
use derive_more::{Display, From, Into};

use super::{FrameError, FrameKind};

/// Bytes occupied by the tag and the chunk header fields.
pub const CHUNK_HEADER_SIZE: usize = 1 + 3 * size_of::<u32>();

/// Identifier shared by every chunk of one logical message.
///
/// # Examples
///
/// ```
/// use relayframe::frame::BatchId;
/// let id = BatchId::new(9);
/// assert_eq!(id.get(), 9);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Display, From, Into)]
#[display("{_0}")]
pub struct BatchId(u32);

impl BatchId {
    /// Create a new identifier.
    #[must_use]
    pub const fn new(value: u32) -> Self { Self(value) }

    /// Return the inner numeric identifier.
    #[must_use]
    pub const fn get(self) -> u32 { self.0 }
}

/// Header describing a single chunk within a batch.
///
/// # Examples
///
/// ```
/// use relayframe::frame::{BatchId, ChunkHeader};
/// let header = ChunkHeader::new(BatchId::new(3), 2, 3);
/// assert!(header.is_final());
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChunkHeader {
    batch_id: BatchId,
    index: u32,
    total_chunks: u32,
}

impl ChunkHeader {
    /// Create a new chunk header.
    #[must_use]
    pub const fn new(batch_id: BatchId, index: u32, total_chunks: u32) -> Self {
        Self {
            batch_id,
            index,
            total_chunks,
        }
    }

    /// Return the batch this chunk belongs to.
    #[must_use]
    pub const fn batch_id(&self) -> BatchId { self.batch_id }

    /// Return the zero-based position of this chunk.
    #[must_use]
    pub const fn index(&self) -> u32 { self.index }

    /// Return the number of chunks in the batch.
    #[must_use]
    pub const fn total_chunks(&self) -> u32 { self.total_chunks }

    /// Report whether this is the last chunk of its batch.
    #[must_use]
    pub const fn is_final(&self) -> bool {
        self.total_chunks > 0 && self.index == self.total_chunks - 1
    }

    /// Write the tag byte and header fields into `dst`.
    pub fn write_to(&self, dst: &mut impl BufMut) {
        dst.put_u8(FrameKind::Chunk.tag());
        dst.put_u32(self.batch_id.get());
        dst.put_u32(self.index);
        dst.put_u32(self.total_chunks);
    }

    /// Parse the header from the start of a raw `CHUNK` frame.
    ///
    /// The caller is expected to have checked the tag already; this only
    /// verifies that enough bytes are present.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::Truncated`] if `frame` is shorter than
    /// [`CHUNK_HEADER_SIZE`].
    pub fn read_from(frame: &[u8]) -> Result<Self, FrameError> {
        if frame.len() < CHUNK_HEADER_SIZE {
            return Err(FrameError::Truncated { len: frame.len() });
        }
        let mut fields = &frame[1..CHUNK_HEADER_SIZE];
        let batch_id = BatchId::new(fields.get_u32());
        let index = fields.get_u32();
        let total_chunks = fields.get_u32();
        Ok(Self::new(batch_id, index, total_chunks))
    }
}

/// Report whether `header` describes the final chunk of its batch.
#[must_use]
pub const fn is_final_message(header: &ChunkHeader) -> bool { header.is_final() }

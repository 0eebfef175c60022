//! Binary framing and chunking for size-capped transports.
//!
//! A `SINGLE` frame is the tag byte followed by the UTF-8 message. A `CHUNK`
//! frame is the tag byte, a 12-byte [`ChunkHeader`] and a slice of the
//! message. Chunk headers carry explicit indices so receivers can reassemble
//! a batch regardless of arrival order.

pub mod assembler;
pub mod codec;
pub mod error;
pub mod header;
pub mod kind;

pub use assembler::ChunkAssembler;
pub use codec::{
    Encoded,
    Frame,
    FrameCodec,
    decode,
    decode_batch,
    encode,
    is_partial_message,
};
pub use error::{AssemblyError, FrameError};
pub use header::{BatchId, CHUNK_HEADER_SIZE, ChunkHeader, is_final_message};
pub use kind::FrameKind;

#![doc(html_root_url = "https://docs.rs/relayframe/latest")]
//! Public API for the `relayframe` library.
//!
//! This crate provides the pieces of a horizontally scaled WebSocket
//! fleet: a binary framing codec that splits oversize text into chunks, a
//! per-process connection registry with cross-process fan-out over pub/sub,
//! and an upload/download indirection for payloads above the transport's
//! message ceiling.

pub mod config;
pub mod event;
pub mod frame;
pub mod metrics;
pub mod oversized;
pub mod registry;
pub mod relay;
pub mod server;
pub mod socket;

pub use event::{EventKind, HttpTarget, RequestId, WebsocketEvent};
pub use frame::{
    AssemblyError,
    BatchId,
    CHUNK_HEADER_SIZE,
    ChunkAssembler,
    ChunkHeader,
    Encoded,
    Frame,
    FrameCodec,
    FrameError,
    FrameKind,
    decode,
    decode_batch,
    encode,
    is_final_message,
    is_partial_message,
};
pub use crate::metrics::{CONNECTIONS_ACTIVE, DELIVERY_MISSES, Direction, ERRORS_TOTAL, FRAMES_PROCESSED};
pub use oversized::{CeilingGuard, OversizedConfig, OversizedPayloadRelay};
pub use registry::{ConnectionId, ConnectionRegistry, ConnectionRouter, OutboundGuard};
pub use relay::{DistributedRelay, InProcessBroker, Topic};
pub use server::{MessageHandler, RelayContext, RelayServer};
pub use socket::{ChannelSocket, Socket, SocketError, WireMessage};

//! Per-process registry of live connection sockets.
//!
//! `ConnectionRegistry` maps [`ConnectionId`]s to the sockets this process
//! owns. It is an explicit value created at startup and handed to whatever
//! accepts connections; clones share the same map. Text messages pass
//! through the registry's [`OutboundGuard`], if any, and then its
//! [`FrameCodec`] on their way out: a text that fits one frame is written as
//! a text message, a larger one as a run of binary `CHUNK` frames.

mod guard;
mod id;
mod router;

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::{debug, warn};

pub use guard::{OutboundGuard, Screened};
pub use id::ConnectionId;
pub use router::ConnectionRouter;

use crate::{
    frame::{Encoded, FrameCodec, FrameError},
    metrics::{self, Direction, MissReason},
    socket::{Socket, WireMessage},
};

/// Outcome of a local delivery attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LocalDelivery {
    /// Every frame was queued on the socket.
    Delivered,
    /// The id is not registered in this process.
    NotLocal,
    /// The socket was registered but refused the write.
    Failed,
    /// The guard refused the message.
    Rejected,
}

/// Concurrent map of sockets keyed by [`ConnectionId`].
#[derive(Clone)]
pub struct ConnectionRegistry {
    connections: Arc<DashMap<ConnectionId, Arc<dyn Socket>>>,
    codec: Arc<FrameCodec>,
    guard: Option<Arc<dyn OutboundGuard>>,
}

impl Default for ConnectionRegistry {
    fn default() -> Self { Self::new() }
}

impl ConnectionRegistry {
    /// Create an empty registry that writes text messages unframed.
    #[must_use]
    pub fn new() -> Self { Self::with_codec(FrameCodec::unbounded()) }

    /// Create an empty registry that frames text messages with `codec`.
    #[must_use]
    pub fn with_codec(codec: FrameCodec) -> Self {
        Self {
            connections: Arc::new(DashMap::new()),
            codec: Arc::new(codec),
            guard: None,
        }
    }

    /// Screen every outgoing text with `guard` before it is framed.
    #[must_use]
    pub fn with_guard(mut self, guard: Arc<dyn OutboundGuard>) -> Self {
        self.guard = Some(guard);
        self
    }

    /// Borrow the codec applied to outgoing text.
    #[must_use]
    pub fn codec(&self) -> &FrameCodec { &self.codec }

    /// Store `socket` under a fresh id.
    pub fn insert(&self, socket: Arc<dyn Socket>) -> ConnectionId {
        let id = ConnectionId::generate();
        self.connections.insert(id.clone(), socket);
        metrics::inc_connections();
        debug!(connection_id = %id, "connection registered");
        id
    }

    /// Drop the mapping for `id`, returning the socket if it was present.
    pub fn remove(&self, id: &ConnectionId) -> Option<Arc<dyn Socket>> {
        let removed = self.connections.remove(id).map(|(_, socket)| socket);
        if removed.is_some() {
            metrics::dec_connections();
            debug!(connection_id = %id, "connection removed");
        }
        removed
    }

    /// Return the socket for `id` if this process owns it.
    #[must_use]
    pub fn get(&self, id: &ConnectionId) -> Option<Arc<dyn Socket>> {
        self.connections.get(id).map(|entry| Arc::clone(entry.value()))
    }

    /// Whether `id` is owned by this process.
    #[must_use]
    pub fn contains(&self, id: &ConnectionId) -> bool { self.connections.contains_key(id) }

    /// Ids of all locally owned connections.
    #[must_use]
    pub fn connection_ids(&self) -> Vec<ConnectionId> {
        self.connections
            .iter()
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Number of locally owned connections.
    #[must_use]
    pub fn len(&self) -> usize { self.connections.len() }

    /// Whether no connections are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.connections.is_empty() }

    /// Write `message` to the local socket for `id`, screening and framing
    /// text first.
    ///
    /// Frames of one message are queued back to back, so a single caller's
    /// writes reach the socket in call order.
    pub async fn deliver_local(&self, id: &ConnectionId, message: WireMessage) -> LocalDelivery {
        let Some(socket) = self.get(id) else {
            return LocalDelivery::NotLocal;
        };
        let message = match (message, &self.guard) {
            (WireMessage::Text(text), Some(guard)) => match guard.screen(id, text) {
                Screened::Pass(text) | Screened::Replace(text) => WireMessage::Text(text),
                Screened::Reject => return LocalDelivery::Rejected,
            },
            (message, _) => message,
        };
        let outgoing = match self.frame(message) {
            Ok(outgoing) => outgoing,
            Err(error) => {
                warn!(connection_id = %id, %error, "failed to frame outgoing message");
                metrics::inc_errors();
                return LocalDelivery::Failed;
            }
        };
        for message in outgoing {
            if socket.send(message).await.is_err() {
                return LocalDelivery::Failed;
            }
            metrics::inc_frames(Direction::Outbound);
        }
        LocalDelivery::Delivered
    }

    /// Close the local socket for `id`. Returns `false` if `id` is not local.
    pub async fn close_local(&self, id: &ConnectionId) -> bool {
        let Some(socket) = self.get(id) else {
            return false;
        };
        socket.close().await;
        true
    }

    /// Texts that fit one frame stay text; larger ones become `CHUNK` frames.
    fn frame(&self, message: WireMessage) -> Result<Vec<WireMessage>, FrameError> {
        let WireMessage::Text(text) = message else {
            return Ok(vec![message]);
        };
        match self.codec.encode(&text)? {
            Encoded::Single(_) => Ok(vec![WireMessage::Text(text)]),
            Encoded::Chunked(frames) => Ok(frames
                .into_iter()
                .map(|frame| WireMessage::Binary(frame.into_bytes()))
                .collect()),
        }
    }
}

/// Log and count a send or close that reached no socket.
pub(crate) fn record_miss(id: &ConnectionId, reason: MissReason) {
    warn!(connection_id = %id, reason = reason.as_str(), "message not delivered");
    metrics::inc_delivery_misses(reason);
}

#[async_trait]
impl ConnectionRouter for ConnectionRegistry {
    async fn register_connection(&self, socket: Arc<dyn Socket>) -> ConnectionId {
        self.insert(socket)
    }

    async fn remove_connection(&self, id: &ConnectionId) { self.remove(id); }

    async fn send_to_connection(&self, id: &ConnectionId, message: WireMessage) {
        match self.deliver_local(id, message).await {
            LocalDelivery::Delivered | LocalDelivery::Rejected => {}
            LocalDelivery::NotLocal => record_miss(id, MissReason::UnknownConnection),
            LocalDelivery::Failed => record_miss(id, MissReason::SocketClosed),
        }
    }

    async fn disconnect(&self, id: &ConnectionId) {
        if !self.close_local(id).await {
            debug!(connection_id = %id, "disconnect ignored for non-local connection");
        }
    }

    fn local_connection_ids(&self) -> Vec<ConnectionId> { self.connection_ids() }
}

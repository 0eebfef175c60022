//! Transport boundary between the registry and a live connection.
//!
//! The registry only needs to write messages and close the connection; the
//! concrete WebSocket lives behind the [`Socket`] trait. [`ChannelSocket`]
//! is the implementation used by the server: writes are queued on a bounded
//! channel and drained in FIFO order by the connection's writer task, which
//! keeps per-connection delivery ordered.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;

/// Highest allowed queue capacity for [`ChannelSocket::bounded`].
pub const MAX_QUEUE_CAPACITY: usize = 10_000;

/// One message written to the transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WireMessage {
    /// A UTF-8 text message.
    Text(String),
    /// A binary message, typically an encoded frame.
    Binary(Bytes),
}

impl WireMessage {
    /// Size of the message body in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Text(text) => text.len(),
            Self::Binary(bytes) => bytes.len(),
        }
    }

    /// Whether the message body is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.len() == 0 }
}

/// Errors raised when writing to a socket.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum SocketError {
    /// The connection has been closed.
    #[error("socket closed")]
    Closed,
}

/// Write side of a live connection.
#[async_trait]
pub trait Socket: Send + Sync {
    /// Queue `message` for delivery.
    ///
    /// # Errors
    ///
    /// Returns [`SocketError::Closed`] once the connection is gone.
    async fn send(&self, message: WireMessage) -> Result<(), SocketError>;

    /// Close the connection. Closing twice is a no-op.
    async fn close(&self);
}

/// Item drained by a connection's writer task.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outbound {
    /// Write a message.
    Message(WireMessage),
    /// Send a close frame and stop writing.
    Close,
}

/// [`Socket`] backed by a bounded channel.
#[derive(Clone, Debug)]
pub struct ChannelSocket {
    tx: mpsc::Sender<Outbound>,
    closed: Arc<AtomicBool>,
}

/// Receiving half paired with a [`ChannelSocket`].
#[derive(Debug)]
pub struct SocketOutbox {
    rx: mpsc::Receiver<Outbound>,
}

impl ChannelSocket {
    /// Create a socket and its outbox with room for `capacity` queued items.
    ///
    /// `capacity` is clamped to `1..=MAX_QUEUE_CAPACITY`.
    #[must_use]
    pub fn bounded(capacity: usize) -> (Self, SocketOutbox) {
        let (tx, rx) = mpsc::channel(capacity.clamp(1, MAX_QUEUE_CAPACITY));
        let socket = Self {
            tx,
            closed: Arc::new(AtomicBool::new(false)),
        };
        (socket, SocketOutbox { rx })
    }

    /// Whether [`Socket::close`] has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool { self.closed.load(Ordering::Acquire) || self.tx.is_closed() }
}

#[async_trait]
impl Socket for ChannelSocket {
    async fn send(&self, message: WireMessage) -> Result<(), SocketError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SocketError::Closed);
        }
        self.tx
            .send(Outbound::Message(message))
            .await
            .map_err(|_| SocketError::Closed)
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if self.tx.send(Outbound::Close).await.is_err() {
            debug!("socket writer already gone on close");
        }
    }
}

impl SocketOutbox {
    /// Receive the next queued item, or `None` once every sender is dropped.
    pub async fn recv(&mut self) -> Option<Outbound> { self.rx.recv().await }

    /// Take a queued item without waiting.
    pub fn try_recv(&mut self) -> Option<Outbound> { self.rx.try_recv().ok() }
}

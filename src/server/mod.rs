//! Tokio WebSocket server feeding connections into the relay.
//!
//! `RelayServer` spawns worker tasks that accept TCP connections, upgrade
//! them to WebSockets and register each one with the configured
//! [`ConnectionRouter`]. Inbound text events and binary frames are decoded,
//! passed through the [`OversizedPayloadRelay`] and handed to the
//! application's [`MessageHandler`].

use std::{num::NonZeroUsize, sync::Arc, time::Duration};

use tokio::{net::TcpListener, sync::oneshot};

use crate::{oversized::OversizedPayloadRelay, registry::ConnectionRouter};

mod binding;
mod connection;
pub mod error;
mod handler;
mod runtime;
#[cfg(test)]
pub(crate) mod test_util;

pub use error::ServerError;
pub use handler::{BroadcastHandler, EchoHandler, MessageHandler, RelayContext};
pub use runtime::BackoffConfig;

/// Default cap on a reassembled inbound message.
pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 4 * 1024 * 1024;
/// Default time an incomplete chunk batch may wait for its remaining chunks.
pub const DEFAULT_ASSEMBLY_TIMEOUT: Duration = Duration::from_secs(30);
/// Default number of outbound messages queued per connection.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Limits applied to inbound chunked messages.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameLimits {
    /// Largest message the chunk assembler will buffer.
    pub max_message_bytes: NonZeroUsize,
    /// How long a partial batch is kept before being discarded.
    pub assembly_timeout: Duration,
}

impl Default for FrameLimits {
    fn default() -> Self {
        Self {
            max_message_bytes: NonZeroUsize::new(DEFAULT_MAX_MESSAGE_BYTES)
                .unwrap_or(NonZeroUsize::MIN),
            assembly_timeout: DEFAULT_ASSEMBLY_TIMEOUT,
        }
    }
}

/// Everything a connection task needs, cloned once per connection.
#[derive(Clone)]
pub(crate) struct ConnectionServices {
    pub(crate) oversized: OversizedPayloadRelay,
    pub(crate) handler: Arc<dyn MessageHandler>,
    pub(crate) limits: FrameLimits,
    pub(crate) queue_capacity: usize,
}

impl ConnectionServices {
    pub(crate) fn router(&self) -> &Arc<dyn ConnectionRouter> { self.oversized.router() }
}

/// WebSocket server for the relay.
///
/// The server carries a typestate `S` indicating whether it is [`Unbound`]
/// or [`Bound`]. New servers start `Unbound` and must call
/// [`RelayServer::bind`] or [`RelayServer::bind_existing_listener`] before
/// running.
pub struct RelayServer<S = Unbound>
where
    S: ServerState,
{
    pub(crate) services: ConnectionServices,
    pub(crate) workers: usize,
    pub(crate) backoff_config: BackoffConfig,
    /// Fired once every worker has been spawned. Single use.
    pub(crate) ready_tx: Option<oneshot::Sender<()>>,
    pub(crate) state: S,
}

/// Marker indicating the server has not yet bound a listener.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unbound;

/// Marker indicating the server is bound to a TCP listener.
#[derive(Debug, Clone)]
pub struct Bound {
    pub(crate) listener: Arc<TcpListener>,
}

/// Trait implemented by [`Unbound`] and [`Bound`] to model binding typestate.
pub trait ServerState: sealed::Sealed {}

mod sealed {
    pub trait Sealed {}
    impl Sealed for super::Unbound {}
    impl Sealed for super::Bound {}
}

impl ServerState for Unbound {}
impl ServerState for Bound {}

impl RelayServer<Unbound> {
    /// Create a server that routes through `oversized` and dispatches
    /// messages to `handler`.
    ///
    /// Defaults to one worker per available CPU.
    #[must_use]
    pub fn new(oversized: OversizedPayloadRelay, handler: Arc<dyn MessageHandler>) -> Self {
        let workers = std::thread::available_parallelism().map_or(1, NonZeroUsize::get);
        Self {
            services: ConnectionServices {
                oversized,
                handler,
                limits: FrameLimits::default(),
                queue_capacity: DEFAULT_QUEUE_CAPACITY,
            },
            workers,
            backoff_config: BackoffConfig::default(),
            ready_tx: None,
            state: Unbound,
        }
    }
}

impl<S: ServerState> RelayServer<S> {
    /// Set the number of accept workers. Zero is raised to one.
    #[must_use]
    pub fn workers(mut self, count: usize) -> Self {
        self.workers = count.max(1);
        self
    }

    /// Configured number of accept workers.
    #[must_use]
    pub fn worker_count(&self) -> usize { self.workers }

    /// Configure accept-loop back-off.
    #[must_use]
    pub fn accept_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff_config = backoff.normalized();
        self
    }

    /// Configure inbound chunk reassembly.
    #[must_use]
    pub fn frame_limits(mut self, limits: FrameLimits) -> Self {
        self.services.limits = limits;
        self
    }

    /// Configure the outbound queue length per connection.
    #[must_use]
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.services.queue_capacity = capacity;
        self
    }

    /// Notify `tx` once the server has started accepting.
    #[must_use]
    pub fn ready_signal(mut self, tx: oneshot::Sender<()>) -> Self {
        self.ready_tx = Some(tx);
        self
    }
}

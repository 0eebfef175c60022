//! Application hooks invoked by connection tasks.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::{
    oversized::OversizedPayloadRelay,
    registry::{ConnectionId, ConnectionRouter},
};

/// Handle to the relay scoped to one connection.
#[derive(Clone)]
pub struct RelayContext {
    connection_id: ConnectionId,
    oversized: OversizedPayloadRelay,
}

impl RelayContext {
    pub(crate) fn new(connection_id: ConnectionId, oversized: OversizedPayloadRelay) -> Self {
        Self {
            connection_id,
            oversized,
        }
    }

    /// Id of the connection this context belongs to.
    #[must_use]
    pub fn connection_id(&self) -> &ConnectionId { &self.connection_id }

    /// Router used for every send.
    #[must_use]
    pub fn router(&self) -> &Arc<dyn ConnectionRouter> { self.oversized.router() }

    /// Send `payload` back to this connection.
    pub async fn reply(&self, payload: Value) { self.oversized.send(&self.connection_id, payload).await; }

    /// Send `payload` to any connection, local or remote.
    ///
    /// Oversized payloads are diverted by whichever process owns `id`.
    pub async fn send_to(&self, id: &ConnectionId, payload: Value) {
        self.oversized.send(id, payload).await;
    }

    /// Send `payload` to every other connection held by this process.
    ///
    /// Each target is checked against the ceiling on its own.
    pub async fn broadcast(&self, payload: Value) {
        let ids = self.router().local_connection_ids();
        self.router()
            .send_message(&ids, payload, Some(&self.connection_id))
            .await;
    }
}

/// Application logic for decoded message payloads.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Called once the connection is registered.
    async fn on_connect(&self, _ctx: &RelayContext) {}

    /// Called for each message payload, including downloaded blobs.
    async fn on_message(&self, ctx: &RelayContext, payload: Value);

    /// Called after the connection has been removed from the router.
    async fn on_disconnect(&self, _ctx: &RelayContext) {}
}

/// Replies to every message with the same payload.
#[derive(Clone, Copy, Debug, Default)]
pub struct EchoHandler;

#[async_trait]
impl MessageHandler for EchoHandler {
    async fn on_message(&self, ctx: &RelayContext, payload: Value) { ctx.reply(payload).await; }
}

/// Forwards every message to all other local connections.
#[derive(Clone, Copy, Debug, Default)]
pub struct BroadcastHandler;

#[async_trait]
impl MessageHandler for BroadcastHandler {
    async fn on_message(&self, ctx: &RelayContext, payload: Value) { ctx.broadcast(payload).await; }
}

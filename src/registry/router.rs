//! Addressing surface shared by the local registry and the distributed relay.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;
use tracing::warn;

use super::ConnectionId;
use crate::{
    event::WebsocketEvent,
    metrics,
    socket::{Socket, WireMessage},
};

/// Send, close and register operations keyed by [`ConnectionId`].
///
/// Implementors decide how a message reaches the socket; the provided
/// methods only shape payloads. Every send is fire-and-forget: failures are
/// logged and counted, never returned.
#[async_trait]
pub trait ConnectionRouter: Send + Sync {
    /// Store `socket` under a freshly minted id and return the id.
    async fn register_connection(&self, socket: Arc<dyn Socket>) -> ConnectionId;

    /// Forget `id`. The socket is not closed.
    async fn remove_connection(&self, id: &ConnectionId);

    /// Deliver `message` to the connection, wherever it lives.
    async fn send_to_connection(&self, id: &ConnectionId, message: WireMessage);

    /// Close the connection, wherever it lives.
    async fn disconnect(&self, id: &ConnectionId);

    /// Ids of connections whose sockets this process holds.
    fn local_connection_ids(&self) -> Vec<ConnectionId>;

    /// Wrap `payload` as a message event and send it to every id except
    /// `exclude`. The event is serialized once for all targets.
    async fn send_message(
        &self,
        ids: &[ConnectionId],
        payload: Value,
        exclude: Option<&ConnectionId>,
    ) {
        let text = match WebsocketEvent::message(payload).to_json() {
            Ok(text) => text,
            Err(error) => {
                warn!(%error, "dropping unserializable message");
                metrics::inc_errors();
                return;
            }
        };
        for id in ids.iter().filter(|id| Some(*id) != exclude) {
            self.send_to_connection(id, WireMessage::Text(text.clone()))
                .await;
        }
    }

    /// Serialize `event` and send it to a single connection.
    async fn send_event(&self, id: &ConnectionId, event: &WebsocketEvent) {
        match event.to_json() {
            Ok(text) => self.send_to_connection(id, WireMessage::Text(text)).await,
            Err(error) => {
                warn!(connection_id = %id, kind = ?event.kind(), %error, "dropping unserializable event");
                metrics::inc_errors();
            }
        }
    }

    /// Send pre-encoded bytes to a single connection.
    async fn send_raw(&self, id: &ConnectionId, bytes: Bytes) {
        self.send_to_connection(id, WireMessage::Binary(bytes))
            .await;
    }
}

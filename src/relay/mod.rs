//! Cross-process routing on top of a [`ConnectionRegistry`].
//!
//! Each process subscribes to one topic per connection it owns. Sends and
//! closes for ids that are not local are published on the owner's topic;
//! the owner's listener task applies them to the socket. Remote delivery is
//! fire-and-forget and keeps only whatever ordering the broker provides.
//! Relayed messages reach the socket through the owner's registry, so its
//! guard screens them the same as local sends.

mod broker;
mod topic;

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub use broker::{BrokerError, InProcessBroker, Publisher, Subscriber, Subscription, TOPIC_CAPACITY};
pub use topic::{CommandError, RelayCommand, Topic};

use crate::{
    metrics::{self, MissReason},
    registry::{ConnectionId, ConnectionRegistry, ConnectionRouter, LocalDelivery, record_miss},
    socket::{Socket, WireMessage},
};

/// Namespace used when none is configured.
pub const DEFAULT_NAMESPACE: &str = "relayframe";

/// [`ConnectionRouter`] that reaches connections owned by other processes.
#[derive(Clone)]
pub struct DistributedRelay {
    registry: ConnectionRegistry,
    namespace: Arc<str>,
    subscriber: Arc<dyn Subscriber>,
    publisher: Option<Arc<dyn Publisher>>,
    listeners: Arc<DashMap<ConnectionId, JoinHandle<()>>>,
}

impl DistributedRelay {
    /// Wrap `registry`, listening for commands through `subscriber`.
    ///
    /// Without a publisher, sends to non-local ids are logged and dropped.
    #[must_use]
    pub fn new(
        registry: ConnectionRegistry,
        namespace: impl Into<Arc<str>>,
        subscriber: Arc<dyn Subscriber>,
    ) -> Self {
        Self {
            registry,
            namespace: namespace.into(),
            subscriber,
            publisher: None,
            listeners: Arc::new(DashMap::new()),
        }
    }

    /// Publish commands for non-local ids through `publisher`.
    #[must_use]
    pub fn with_publisher(mut self, publisher: Arc<dyn Publisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    /// Registry holding this process's sockets.
    #[must_use]
    pub fn registry(&self) -> &ConnectionRegistry { &self.registry }

    /// Namespace prefixed to every topic.
    #[must_use]
    pub fn namespace(&self) -> &str { &self.namespace }

    /// Topic on which the owner of `id` listens.
    #[must_use]
    pub fn topic_for(&self, id: &ConnectionId) -> Topic { Topic::new(&self.namespace, id) }

    /// Number of running listener tasks.
    #[must_use]
    pub fn listener_count(&self) -> usize { self.listeners.len() }

    async fn publish(&self, id: &ConnectionId, command: &RelayCommand) {
        let Some(publisher) = &self.publisher else {
            record_miss(id, MissReason::UnknownConnection);
            return;
        };
        let topic = self.topic_for(id);
        match publisher.publish(&topic, command.encode()).await {
            Ok(receivers) => {
                metrics::inc_relay_publishes();
                debug!(%topic, receivers, "relay command published");
            }
            Err(error) => {
                warn!(%topic, %error, "relay publish failed");
                record_miss(id, MissReason::PublishFailed);
            }
        }
    }
}

/// Apply commands published for `id` until the topic closes.
async fn listen(
    registry: ConnectionRegistry,
    subscriber: Arc<dyn Subscriber>,
    id: ConnectionId,
    mut subscription: Subscription,
) {
    while let Some(payload) = subscription.next().await {
        match RelayCommand::parse(&payload) {
            Ok(RelayCommand::Close) => {
                debug!(connection_id = %id, "remote close received");
                registry.close_local(&id).await;
                subscriber.unsubscribe(subscription.topic()).await;
                break;
            }
            Ok(RelayCommand::Deliver(text)) => {
                registry
                    .send_to_connection(&id, WireMessage::Text(text))
                    .await;
            }
            Ok(RelayCommand::Binary(bytes)) => {
                registry
                    .send_to_connection(&id, WireMessage::Binary(bytes))
                    .await;
            }
            Err(error) => {
                warn!(connection_id = %id, %error, "ignoring relay payload");
                metrics::inc_errors();
            }
        }
    }
    debug!(connection_id = %id, "relay listener stopped");
}

#[async_trait]
impl ConnectionRouter for DistributedRelay {
    async fn register_connection(&self, socket: Arc<dyn Socket>) -> ConnectionId {
        let id = self.registry.insert(socket);
        let topic = self.topic_for(&id);
        match self.subscriber.subscribe(&topic).await {
            Ok(subscription) => {
                let handle = tokio::spawn(listen(
                    self.registry.clone(),
                    Arc::clone(&self.subscriber),
                    id.clone(),
                    subscription,
                ));
                self.listeners.insert(id.clone(), handle);
                info!(connection_id = %id, %topic, "connection subscribed");
            }
            Err(error) => {
                warn!(connection_id = %id, %topic, %error, "subscribe failed; connection is local only");
                metrics::inc_errors();
            }
        }
        id
    }

    async fn remove_connection(&self, id: &ConnectionId) {
        self.registry.remove(id);
        self.subscriber.unsubscribe(&self.topic_for(id)).await;
        if let Some((_, handle)) = self.listeners.remove(id) {
            handle.abort();
        }
    }

    async fn send_to_connection(&self, id: &ConnectionId, message: WireMessage) {
        if !self.registry.contains(id) {
            let command = match message {
                WireMessage::Text(text) => RelayCommand::Deliver(text),
                WireMessage::Binary(bytes) => RelayCommand::Binary(bytes),
            };
            self.publish(id, &command).await;
            return;
        }
        match self.registry.deliver_local(id, message).await {
            LocalDelivery::Delivered | LocalDelivery::Rejected => {}
            LocalDelivery::Failed => record_miss(id, MissReason::SocketClosed),
            // removed between the lookup and the write
            LocalDelivery::NotLocal => record_miss(id, MissReason::UnknownConnection),
        }
    }

    async fn disconnect(&self, id: &ConnectionId) {
        if self.registry.close_local(id).await {
            return;
        }
        if self.publisher.is_some() {
            self.publish(id, &RelayCommand::Close).await;
        } else {
            debug!(connection_id = %id, "disconnect ignored for non-local connection");
        }
    }

    fn local_connection_ids(&self) -> Vec<ConnectionId> { self.registry.connection_ids() }
}

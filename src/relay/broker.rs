//! Pub/sub seams used by [`DistributedRelay`](super::DistributedRelay).
//!
//! Production deployments plug a shared broker in behind [`Publisher`] and
//! [`Subscriber`]. [`InProcessBroker`] implements both over broadcast
//! channels so several relays in one process behave like several processes
//! sharing a broker.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::warn;

use super::Topic;

/// Messages buffered per topic before slow subscribers start lagging.
pub const TOPIC_CAPACITY: usize = 256;

/// Errors raised by broker implementations.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// The broker connection is gone.
    #[error("broker unavailable: {0}")]
    Unavailable(String),
}

/// Publishing half of a broker.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Publish `payload` on `topic`, returning the number of receivers.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError`] if the broker cannot accept the message.
    async fn publish(&self, topic: &Topic, payload: String) -> Result<usize, BrokerError>;
}

/// Subscribing half of a broker.
#[async_trait]
pub trait Subscriber: Send + Sync {
    /// Start receiving messages published on `topic`.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError`] if the subscription cannot be created.
    async fn subscribe(&self, topic: &Topic) -> Result<Subscription, BrokerError>;

    /// Stop delivering `topic`. Open [`Subscription`]s end.
    async fn unsubscribe(&self, topic: &Topic);
}

/// Stream of payloads for one topic.
#[derive(Debug)]
pub struct Subscription {
    topic: Topic,
    rx: broadcast::Receiver<String>,
}

impl Subscription {
    /// Wrap a broadcast receiver.
    #[must_use]
    pub fn new(topic: Topic, rx: broadcast::Receiver<String>) -> Self { Self { topic, rx } }

    /// Topic this subscription listens on.
    #[must_use]
    pub fn topic(&self) -> &Topic { &self.topic }

    /// Wait for the next payload. Returns `None` once the topic is dropped.
    ///
    /// Payloads skipped because the receiver lagged are logged and lost.
    pub async fn next(&mut self) -> Option<String> {
        loop {
            match self.rx.recv().await {
                Ok(payload) => return Some(payload),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(topic = %self.topic, skipped, "subscription lagged");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}

/// Broker living entirely in this process.
///
/// Clones share the same topic table.
#[derive(Clone, Debug, Default)]
pub struct InProcessBroker {
    topics: Arc<DashMap<Topic, broadcast::Sender<String>>>,
}

impl InProcessBroker {
    /// Create an empty broker.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Whether anyone is subscribed to `topic`.
    #[must_use]
    pub fn has_topic(&self, topic: &Topic) -> bool { self.topics.contains_key(topic) }

    /// Number of subscribed topics.
    #[must_use]
    pub fn topic_count(&self) -> usize { self.topics.len() }
}

#[async_trait]
impl Publisher for InProcessBroker {
    async fn publish(&self, topic: &Topic, payload: String) -> Result<usize, BrokerError> {
        let Some(sender) = self.topics.get(topic).map(|entry| entry.value().clone()) else {
            return Ok(0);
        };
        Ok(sender.send(payload).unwrap_or(0))
    }
}

#[async_trait]
impl Subscriber for InProcessBroker {
    async fn subscribe(&self, topic: &Topic) -> Result<Subscription, BrokerError> {
        let rx = self
            .topics
            .entry(topic.clone())
            .or_insert_with(|| broadcast::channel(TOPIC_CAPACITY).0)
            .subscribe();
        Ok(Subscription::new(topic.clone(), rx))
    }

    async fn unsubscribe(&self, topic: &Topic) { self.topics.remove(topic); }
}

#[cfg(test)]
mod tests {
    use rstest::{fixture, rstest};

    use super::*;
    use crate::registry::ConnectionId;

    #[fixture]
    fn topic() -> Topic { Topic::new("test", &ConnectionId::from("c-1")) }

    #[rstest]
    #[tokio::test]
    async fn published_payloads_reach_subscribers(topic: Topic) {
        let broker = InProcessBroker::new();
        let mut sub = broker.subscribe(&topic).await.expect("subscribe");
        let receivers = broker
            .publish(&topic, "msg:hello".into())
            .await
            .expect("publish");
        assert_eq!(receivers, 1);
        assert_eq!(sub.next().await.as_deref(), Some("msg:hello"));
    }

    #[rstest]
    #[tokio::test]
    async fn publishing_without_subscribers_reaches_nobody(topic: Topic) {
        let broker = InProcessBroker::new();
        assert_eq!(broker.publish(&topic, "close".into()).await.expect("publish"), 0);
    }

    #[rstest]
    #[tokio::test]
    async fn unsubscribe_ends_the_subscription(topic: Topic) {
        let broker = InProcessBroker::new();
        let mut sub = broker.subscribe(&topic).await.expect("subscribe");
        broker.unsubscribe(&topic).await;
        assert!(!broker.has_topic(&topic));
        assert_eq!(sub.next().await, None);
    }

    #[rstest]
    #[tokio::test]
    async fn clones_share_topics(topic: Topic) {
        let broker = InProcessBroker::new();
        let other = broker.clone();
        let mut sub = broker.subscribe(&topic).await.expect("subscribe");
        other.publish(&topic, "close".into()).await.expect("publish");
        assert_eq!(sub.next().await.as_deref(), Some("close"));
        assert_eq!(other.topic_count(), 1);
    }
}

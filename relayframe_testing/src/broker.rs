use std::sync::{
    Arc,
    Mutex,
    atomic::{AtomicBool, Ordering},
};

use async_trait::async_trait;
use relayframe::relay::{BrokerError, Publisher, Topic};

/// [`Publisher`] that records every publication instead of sending it.
#[derive(Clone, Debug, Default)]
pub struct RecordingPublisher {
    published: Arc<Mutex<Vec<(Topic, String)>>>,
    failing: Arc<AtomicBool>,
}

impl RecordingPublisher {
    pub fn new() -> Self { Self::default() }

    /// A publisher whose every call fails.
    pub fn failing() -> Self {
        let publisher = Self::default();
        publisher.failing.store(true, Ordering::SeqCst);
        publisher
    }

    /// `(topic, payload)` pairs in publication order.
    pub fn published(&self) -> Vec<(Topic, String)> {
        self.published.lock().expect("published lock").clone()
    }
}

#[async_trait]
impl Publisher for RecordingPublisher {
    async fn publish(&self, topic: &Topic, payload: String) -> Result<usize, BrokerError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(BrokerError::Unavailable("recording publisher set to fail".into()));
        }
        self.published
            .lock()
            .expect("published lock")
            .push((topic.clone(), payload));
        Ok(1)
    }
}

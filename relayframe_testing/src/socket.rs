use std::sync::{
    Arc,
    Mutex,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};

use async_trait::async_trait;
use relayframe::{Socket, SocketError, WireMessage};

/// [`Socket`] that keeps every write for later assertions.
///
/// Clones share state, so a test can keep one handle and register another.
#[derive(Clone, Debug, Default)]
pub struct RecordingSocket {
    sent: Arc<Mutex<Vec<WireMessage>>>,
    closed: Arc<AtomicBool>,
    close_calls: Arc<AtomicUsize>,
}

impl RecordingSocket {
    pub fn new() -> Self { Self::default() }

    /// A shared handle suitable for `register_connection`.
    pub fn handle(&self) -> Arc<dyn Socket> { Arc::new(self.clone()) }

    /// Messages written so far, in order.
    pub fn sent(&self) -> Vec<WireMessage> { self.sent.lock().expect("sent lock").clone() }

    /// Text messages written so far, in order.
    pub fn sent_texts(&self) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter_map(|message| match message {
                WireMessage::Text(text) => Some(text),
                WireMessage::Binary(_) => None,
            })
            .collect()
    }

    pub fn is_closed(&self) -> bool { self.closed.load(Ordering::SeqCst) }

    pub fn close_calls(&self) -> usize { self.close_calls.load(Ordering::SeqCst) }

    /// Make later writes fail as if the peer had gone away.
    pub fn mark_closed(&self) { self.closed.store(true, Ordering::SeqCst); }
}

#[async_trait]
impl Socket for RecordingSocket {
    async fn send(&self, message: WireMessage) -> Result<(), SocketError> {
        if self.is_closed() {
            return Err(SocketError::Closed);
        }
        self.sent.lock().expect("sent lock").push(message);
        Ok(())
    }

    async fn close(&self) {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        self.closed.store(true, Ordering::SeqCst);
    }
}

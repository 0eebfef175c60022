//! Test doubles for the `relayframe` transport, broker and blob seams.
//!
//! ```rust
//! use relayframe::{ConnectionRegistry, ConnectionRouter, WireMessage};
//! use relayframe_testing::RecordingSocket;
//!
//! # async fn example() {
//! let registry = ConnectionRegistry::new();
//! let socket = RecordingSocket::new();
//! let id = registry.register_connection(socket.handle()).await;
//! registry
//!     .send_to_connection(&id, WireMessage::Text("hi".into()))
//!     .await;
//! assert_eq!(socket.sent(), vec![WireMessage::Text("hi".into())]);
//! # }
//! ```

mod blob;
mod broker;
mod recorder;
mod socket;
mod websocket;

pub use blob::{FakeBlobClient, RecordedUpload};
pub use broker::RecordingPublisher;
pub use recorder::{MetricsCapture, counter_value};
pub use socket::RecordingSocket;
pub use websocket::{WsClient, connect};

//! Topic keys and the commands carried on them.

use std::fmt;

use base64::{Engine, engine::general_purpose::STANDARD};
use bytes::Bytes;
use thiserror::Error;

use crate::registry::ConnectionId;

const CLOSE: &str = "close";
const TEXT_PREFIX: &str = "msg:";
const BINARY_PREFIX: &str = "bin:";

/// Pub/sub topic owned by exactly one connection.
///
/// Rendered as `"{namespace}/{connection_id}"`.
///
/// # Examples
///
/// ```
/// use relayframe::{registry::ConnectionId, relay::Topic};
/// let topic = Topic::new("relay", &ConnectionId::from("c-1"));
/// assert_eq!(topic.as_str(), "relay/c-1");
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Topic(String);

impl Topic {
    /// Build the topic for `id` under `namespace`.
    #[must_use]
    pub fn new(namespace: &str, id: &ConnectionId) -> Self { Self(format!("{namespace}/{id}")) }

    /// Borrow the rendered topic.
    #[must_use]
    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

/// Instruction published to a connection's owning process.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RelayCommand {
    /// Close the socket and stop listening.
    Close,
    /// Write a text message to the socket.
    Deliver(String),
    /// Write a binary message to the socket.
    Binary(Bytes),
}

/// A published payload that is not a known command.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    /// The payload carries no recognised prefix.
    #[error("unrecognised relay command: {0:?}")]
    Unknown(String),
    /// The `bin:` body is not valid base64.
    #[error("invalid binary relay payload: {0}")]
    Base64(#[from] base64::DecodeError),
}

impl RelayCommand {
    /// Render the command as a broker payload.
    #[must_use]
    pub fn encode(&self) -> String {
        match self {
            Self::Close => CLOSE.to_owned(),
            Self::Deliver(text) => format!("{TEXT_PREFIX}{text}"),
            Self::Binary(bytes) => format!("{BINARY_PREFIX}{}", STANDARD.encode(bytes)),
        }
    }

    /// Parse a broker payload.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError`] if the payload is neither `close` nor carries
    /// a `msg:` or `bin:` prefix.
    pub fn parse(payload: &str) -> Result<Self, CommandError> {
        if payload == CLOSE {
            return Ok(Self::Close);
        }
        if let Some(text) = payload.strip_prefix(TEXT_PREFIX) {
            return Ok(Self::Deliver(text.to_owned()));
        }
        if let Some(encoded) = payload.strip_prefix(BINARY_PREFIX) {
            return Ok(Self::Binary(Bytes::from(STANDARD.decode(encoded)?)));
        }
        Err(CommandError::Unknown(payload.to_owned()))
    }
}

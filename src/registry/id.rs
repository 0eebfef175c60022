//! Globally unique connection identifiers.

use std::{fmt, sync::Arc};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier assigned to a connection.
///
/// Ids are minted by the process that accepts the connection and are the
/// only handle other processes ever see.
///
/// # Examples
///
/// ```
/// use relayframe::registry::ConnectionId;
/// let id = ConnectionId::from("c-1");
/// assert_eq!(id.as_str(), "c-1");
/// assert_ne!(ConnectionId::generate(), ConnectionId::generate());
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(Arc<str>);

impl ConnectionId {
    /// Mint a fresh, time-ordered identifier.
    #[must_use]
    pub fn generate() -> Self { Self(Arc::from(Uuid::now_v7().to_string())) }

    /// Borrow the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str { &self.0 }
}

impl From<&str> for ConnectionId {
    fn from(value: &str) -> Self { Self(Arc::from(value)) }
}

impl From<String> for ConnectionId {
    fn from(value: String) -> Self { Self(Arc::from(value)) }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

//! Errors raised by [`RelayServer`](super::RelayServer) operations.

use std::io;

use thiserror::Error;

/// Errors that may occur while binding the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Binding the listener failed.
    #[error("bind error: {0}")]
    Bind(#[source] io::Error),
}

//! Last check on text leaving for a local socket.

use super::ConnectionId;

/// What a guard decided about an outgoing text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Screened {
    /// Write the text unchanged.
    Pass(String),
    /// Write this text in its place.
    Replace(String),
    /// Write nothing. The guard has already logged why.
    Reject,
}

/// Inspects every text the registry is about to write to a local socket.
///
/// The registry consults its guard on the owning process only, after any
/// cross-process hop, so a guard sees each delivery exactly once no matter
/// where the send started.
pub trait OutboundGuard: Send + Sync {
    /// Decide what to write to `id` in place of `text`.
    fn screen(&self, id: &ConnectionId, text: String) -> Screened;
}

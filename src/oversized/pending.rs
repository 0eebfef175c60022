//! Payloads waiting for an upload target.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use bytes::Bytes;
use dashmap::DashMap;

use crate::{event::RequestId, registry::ConnectionId};

/// A serialized message held until the peer answers with an upload target.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingUpload {
    connection: ConnectionId,
    body: Bytes,
    created_at: Instant,
}

impl PendingUpload {
    /// Connection the payload is destined for.
    #[must_use]
    pub fn connection(&self) -> &ConnectionId { &self.connection }

    /// Serialized message event to upload.
    #[must_use]
    pub fn body(&self) -> &Bytes { &self.body }

    /// When the upload was requested.
    #[must_use]
    pub fn created_at(&self) -> Instant { self.created_at }
}

/// Pending uploads keyed by request id, dropped after `ttl`.
#[derive(Clone, Debug)]
pub struct PendingUploads {
    entries: Arc<DashMap<RequestId, PendingUpload>>,
    ttl: Duration,
}

impl PendingUploads {
    /// Create an empty table whose entries expire after `ttl`.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            ttl,
        }
    }

    /// Time-to-live applied to entries.
    #[must_use]
    pub fn ttl(&self) -> Duration { self.ttl }

    /// Record `body` for `connection` under `request_id`.
    pub fn insert(&self, request_id: RequestId, connection: ConnectionId, body: impl Into<Bytes>) {
        self.insert_at(request_id, connection, body, Instant::now());
    }

    /// Record an entry as if it were created at `now`.
    pub fn insert_at(
        &self,
        request_id: RequestId,
        connection: ConnectionId,
        body: impl Into<Bytes>,
        now: Instant,
    ) {
        self.entries.insert(
            request_id,
            PendingUpload {
                connection,
                body: body.into(),
                created_at: now,
            },
        );
    }

    /// Remove and return the entry for `request_id` if it is destined for
    /// `connection` and has not expired.
    ///
    /// An entry owned by another connection is left in place.
    pub fn take(&self, request_id: &RequestId, connection: &ConnectionId) -> Option<PendingUpload> {
        self.take_at(request_id, connection, Instant::now())
    }

    /// [`take`](Self::take) evaluated at `now`.
    pub fn take_at(
        &self,
        request_id: &RequestId,
        connection: &ConnectionId,
        now: Instant,
    ) -> Option<PendingUpload> {
        let (_, pending) = self
            .entries
            .remove_if(request_id, |_, pending| pending.connection == *connection)?;
        (now.saturating_duration_since(pending.created_at) < self.ttl).then_some(pending)
    }

    /// Put a taken entry back, keeping its original creation time.
    pub fn restore(&self, request_id: RequestId, pending: PendingUpload) {
        self.entries.insert(request_id, pending);
    }

    /// Drop every entry destined for `connection`, returning how many went.
    pub fn forget_connection(&self, connection: &ConnectionId) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, pending| pending.connection != *connection);
        before.saturating_sub(self.entries.len())
    }

    /// Drop entries older than the TTL at `now`, returning how many went.
    pub fn purge_expired_at(&self, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, pending| now.saturating_duration_since(pending.created_at) < self.ttl);
        before.saturating_sub(self.entries.len())
    }

    /// Whether `request_id` is pending.
    #[must_use]
    pub fn contains(&self, request_id: &RequestId) -> bool { self.entries.contains_key(request_id) }

    /// Number of pending entries.
    #[must_use]
    pub fn len(&self) -> usize { self.entries.len() }

    /// Whether nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.entries.is_empty() }
}

#[cfg(test)]
mod tests {
    use rstest::{fixture, rstest};

    use super::*;

    #[fixture]
    fn pending() -> PendingUploads { PendingUploads::new(Duration::from_secs(60)) }

    #[rstest]
    fn take_removes_the_entry(pending: PendingUploads) {
        let id = RequestId::from("r");
        pending.insert(id.clone(), ConnectionId::from("c"), "body");
        let owner = ConnectionId::from("c");
        let taken = pending.take(&id, &owner).expect("pending entry");
        assert_eq!(taken.body(), "body");
        assert_eq!(taken.connection(), &owner);
        assert!(pending.take(&id, &owner).is_none());
    }

    #[rstest]
    fn take_ignores_other_connections(pending: PendingUploads) {
        let id = RequestId::from("r");
        pending.insert(id.clone(), ConnectionId::from("owner"), "body");
        assert!(pending.take(&id, &ConnectionId::from("intruder")).is_none());
        assert!(pending.contains(&id));
        assert!(pending.take(&id, &ConnectionId::from("owner")).is_some());
    }

    #[rstest]
    fn expired_entries_are_not_returned(pending: PendingUploads) {
        let start = Instant::now();
        let id = RequestId::from("r");
        pending.insert_at(id.clone(), ConnectionId::from("c"), "body", start);
        assert!(
            pending
                .take_at(&id, &ConnectionId::from("c"), start + Duration::from_secs(61))
                .is_none()
        );
        assert!(pending.is_empty());
    }

    #[rstest]
    fn restore_keeps_creation_time(pending: PendingUploads) {
        let start = Instant::now();
        let id = RequestId::from("r");
        pending.insert_at(id.clone(), ConnectionId::from("c"), "body", start);
        let taken = pending
            .take_at(&id, &ConnectionId::from("c"), start)
            .expect("pending entry");
        pending.restore(id.clone(), taken);
        assert_eq!(pending.purge_expired_at(start + Duration::from_secs(60)), 1);
    }

    #[rstest]
    fn forget_connection_only_drops_its_entries(pending: PendingUploads) {
        pending.insert("a".into(), ConnectionId::from("c1"), "");
        pending.insert("b".into(), ConnectionId::from("c1"), "");
        pending.insert("c".into(), ConnectionId::from("c2"), "");
        assert_eq!(pending.forget_connection(&ConnectionId::from("c1")), 2);
        assert!(pending.contains(&RequestId::from("c")));
        assert_eq!(pending.len(), 1);
    }
}

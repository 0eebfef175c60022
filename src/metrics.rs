//! Metric helpers for `relayframe`.
//!
//! This module defines metric names and simple helper functions
//! wrapping the [`metrics`](https://docs.rs/metrics) crate. Delivery misses
//! never surface as errors to callers, so the counters here are the
//! observable record of best-effort failures.

use metrics::{counter, gauge};

/// Name of the gauge tracking locally registered connections.
pub const CONNECTIONS_ACTIVE: &str = "relayframe_connections_active";
/// Name of the counter tracking processed transport messages.
pub const FRAMES_PROCESSED: &str = "relayframe_frames_processed_total";
/// Name of the counter tracking sends that reached no socket.
pub const DELIVERY_MISSES: &str = "relayframe_delivery_misses_total";
/// Name of the counter tracking publications to the relay broker.
pub const RELAY_PUBLISHES: &str = "relayframe_relay_publishes_total";
/// Name of the counter tracking payloads diverted through blob uploads.
pub const OVERSIZED_UPLOADS: &str = "relayframe_oversized_uploads_total";
/// Name of the counter tracking error occurrences.
pub const ERRORS_TOTAL: &str = "relayframe_errors_total";

/// Direction of frame processing.
#[derive(Clone, Copy)]
pub enum Direction {
    /// Inbound messages received from a client.
    Inbound,
    /// Outbound messages sent to a client.
    Outbound,
}

impl Direction {
    fn as_str(self) -> &'static str {
        match self {
            Direction::Inbound => "inbound",
            Direction::Outbound => "outbound",
        }
    }
}

/// Why a send or close reached no socket.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MissReason {
    /// The id is not registered here and no publisher is configured.
    UnknownConnection,
    /// The socket was registered but had already closed.
    SocketClosed,
    /// Publishing to the owning process failed.
    PublishFailed,
}

impl MissReason {
    /// Label value recorded with [`DELIVERY_MISSES`].
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            MissReason::UnknownConnection => "unknown_connection",
            MissReason::SocketClosed => "socket_closed",
            MissReason::PublishFailed => "publish_failed",
        }
    }
}

/// Increment the active connections gauge.
pub fn inc_connections() { gauge!(CONNECTIONS_ACTIVE).increment(1.0); }

/// Decrement the active connections gauge.
pub fn dec_connections() { gauge!(CONNECTIONS_ACTIVE).decrement(1.0); }

/// Record a processed frame for the given direction.
pub fn inc_frames(direction: Direction) {
    counter!(FRAMES_PROCESSED, "direction" => direction.as_str()).increment(1);
}

/// Record a send or close that reached no socket.
pub fn inc_delivery_misses(reason: MissReason) {
    counter!(DELIVERY_MISSES, "reason" => reason.as_str()).increment(1);
}

/// Record a message published towards another process.
pub fn inc_relay_publishes() { counter!(RELAY_PUBLISHES).increment(1); }

/// Record a payload diverted through the upload/download path.
pub fn inc_oversized_uploads() { counter!(OVERSIZED_UPLOADS).increment(1); }

/// Record an error occurrence.
pub fn inc_errors() { counter!(ERRORS_TOTAL).increment(1); }

/// Install the Prometheus exporter listening on `addr`.
///
/// # Errors
///
/// Returns the exporter's build error if the recorder cannot be installed.
#[cfg(feature = "metrics")]
pub fn install_prometheus(
    addr: std::net::SocketAddr,
) -> Result<(), metrics_exporter_prometheus::BuildError> {
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
}

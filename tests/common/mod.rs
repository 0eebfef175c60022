//! Shared utilities for integration tests.

#![allow(
    dead_code,
    reason = "shared test utilities are not used by all test binaries"
)]

use std::{
    net::{Ipv4Addr, SocketAddr, TcpListener as StdTcpListener},
    time::Duration,
};

use relayframe::{ConnectionId, WebsocketEvent, WireMessage};

pub type TestResult<T = ()> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Create a TCP listener bound to a free local port.
pub fn unused_listener() -> StdTcpListener {
    let addr = SocketAddr::new(Ipv4Addr::LOCALHOST.into(), 0);
    StdTcpListener::bind(addr).expect("failed to bind port")
}

/// Parse every text message in `sent` as an event.
pub fn events(sent: &[WireMessage]) -> TestResult<Vec<WebsocketEvent>> {
    sent.iter()
        .filter_map(|message| match message {
            WireMessage::Text(text) => Some(text),
            WireMessage::Binary(_) => None,
        })
        .map(|text| WebsocketEvent::from_json(text).map_err(Into::into))
        .collect()
}

/// Yield until `check` holds or `limit` passes.
pub async fn eventually(limit: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    check()
}

pub fn connection(name: &str) -> ConnectionId { ConnectionId::from(name) }

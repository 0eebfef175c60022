//! Test helpers shared across server modules.

use std::{
    net::{Ipv4Addr, SocketAddr, TcpListener as StdTcpListener},
    sync::Arc,
};

use rstest::fixture;

use super::{Bound, EchoHandler, RelayServer};
use crate::{
    oversized::{CeilingGuard, HttpBlobClient, OversizedConfig, OversizedPayloadRelay},
    registry::ConnectionRegistry,
};

/// Oversized relay over a fresh local registry.
#[fixture]
pub fn oversized() -> OversizedPayloadRelay {
    let ceiling = CeilingGuard::new(OversizedConfig::default());
    OversizedPayloadRelay::new(
        Arc::new(ConnectionRegistry::new().with_guard(Arc::new(ceiling.clone()))),
        Arc::new(HttpBlobClient::default()),
        ceiling,
    )
}

/// A bound listener on a free localhost port.
///
/// Keeping the listener bound prevents another process from claiming the
/// port between discovery and use.
#[fixture]
pub fn free_listener() -> StdTcpListener {
    let addr = SocketAddr::new(Ipv4Addr::LOCALHOST.into(), 0);
    StdTcpListener::bind(addr).expect("failed to bind free port listener")
}

pub fn bind_server(oversized: OversizedPayloadRelay, listener: StdTcpListener) -> RelayServer<Bound> {
    RelayServer::new(oversized, Arc::new(EchoHandler))
        .workers(1)
        .bind_existing_listener(listener)
        .expect("failed to bind")
}

//! `relayframe` server binary.
//!
//! Loads configuration, wires a registry, an in-process broker and the
//! oversized payload relay together, and serves WebSocket clients until
//! Ctrl+C.

mod cli;

use std::{process::ExitCode, sync::Arc, time::Duration};

use clap::Parser;
use relayframe::{
    config::RelayConfig,
    oversized::{CeilingGuard, HttpBlobClient, OversizedPayloadRelay, PrefixPresigner},
    registry::{ConnectionRegistry, ConnectionRouter},
    relay::{DistributedRelay, InProcessBroker},
    server::{BroadcastHandler, EchoHandler, MessageHandler, RelayServer},
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Mode};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            error!(%error, "relayframe exited with an error");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = match &cli.config {
        Some(path) => RelayConfig::load(path)?,
        None => RelayConfig::default(),
    };
    if let Some(bind) = cli.bind {
        config.server.bind = bind;
    }
    if let Some(max) = cli.max_frame_bytes {
        config.frames.max_frame_bytes = Some(max);
    }
    if let Some(addr) = cli.metrics_addr {
        config.server.metrics_addr = Some(addr);
    }
    config.validate()?;

    if let Some(addr) = config.server.metrics_addr {
        install_metrics(addr)?;
    }

    let ceiling = CeilingGuard::new(config.oversized_config());
    let registry =
        ConnectionRegistry::with_codec(config.codec()).with_guard(Arc::new(ceiling.clone()));
    let broker = InProcessBroker::new();
    let relay = DistributedRelay::new(
        registry,
        config.relay.namespace.as_str(),
        Arc::new(broker.clone()),
    )
    .with_publisher(Arc::new(broker));
    let router: Arc<dyn ConnectionRouter> = Arc::new(relay);

    let blobs = HttpBlobClient::with_timeout(config.http_timeout())?;
    let mut oversized = OversizedPayloadRelay::new(router, Arc::new(blobs), ceiling);
    if let Some(base_url) = &config.oversized.upload_base_url {
        oversized = oversized.with_presigner(Arc::new(PrefixPresigner::new(base_url.as_str())));
    }
    spawn_pending_sweeper(oversized.clone(), config.oversized_config().pending_ttl);

    let handler: Arc<dyn MessageHandler> = match cli.mode {
        Mode::Echo => Arc::new(EchoHandler),
        Mode::Broadcast => Arc::new(BroadcastHandler),
    };
    let mut server = RelayServer::new(oversized, handler)
        .queue_capacity(config.server.queue_capacity)
        .frame_limits(config.frame_limits());
    if config.server.workers > 0 {
        server = server.workers(config.server.workers);
    }
    let server = server.bind(config.server.bind)?;
    info!(mode = ?cli.mode, "starting relayframe");
    server.run().await?;
    Ok(())
}

/// Periodically drop pending uploads whose peer never answered.
fn spawn_pending_sweeper(oversized: OversizedPayloadRelay, ttl: Duration) {
    let period = ttl.max(Duration::from_secs(1));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            let purged = oversized.purge_expired();
            if purged > 0 {
                info!(purged, "expired pending uploads");
            }
        }
    });
}

#[cfg(feature = "metrics")]
fn install_metrics(addr: std::net::SocketAddr) -> Result<(), Box<dyn std::error::Error>> {
    relayframe::metrics::install_prometheus(addr)?;
    info!(%addr, "prometheus exporter listening");
    Ok(())
}

#[cfg(not(feature = "metrics"))]
fn install_metrics(addr: std::net::SocketAddr) -> Result<(), Box<dyn std::error::Error>> {
    tracing::warn!(%addr, "built without the metrics feature; exporter disabled");
    Ok(())
}

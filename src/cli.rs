//! Command line interface for the `relayframe` binary.
//!
//! Also compiled by `build.rs` to render the man page, so it depends on
//! nothing but `clap`.

use std::{net::SocketAddr, path::PathBuf};

use clap::{Parser, ValueEnum};

/// What the server does with each received message.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    /// Send the message back to its sender.
    #[default]
    Echo,
    /// Forward the message to every other connection.
    Broadcast,
}

/// Command line arguments for the `relayframe` binary.
#[derive(Debug, Parser)]
#[command(
    name = "relayframe",
    version,
    about = "WebSocket relay with chunked framing and oversized payload indirection"
)]
pub struct Cli {
    /// TOML configuration file.
    #[arg(short, long, env = "RELAYFRAME_CONFIG")]
    pub config: Option<PathBuf>,
    /// Listen address; overrides `server.bind`.
    #[arg(short, long)]
    pub bind: Option<SocketAddr>,
    /// Largest outbound frame in bytes; overrides `frames.max_frame_bytes`.
    #[arg(long)]
    pub max_frame_bytes: Option<usize>,
    /// Prometheus listen address; overrides `server.metrics_addr`.
    #[arg(long)]
    pub metrics_addr: Option<SocketAddr>,
    /// Message handling mode.
    #[arg(short, long, value_enum, default_value_t)]
    pub mode: Mode,
}

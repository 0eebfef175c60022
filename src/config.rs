//! File-based configuration for the relay binary.
//!
//! Every field has a default, so an empty file (or no file) yields a
//! working local setup. Command line flags are applied on top by `main`.

use std::{
    collections::BTreeMap,
    fs,
    io,
    net::SocketAddr,
    num::NonZeroUsize,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    frame::{CHUNK_HEADER_SIZE, FrameCodec},
    oversized::{DEFAULT_CEILING_BYTES, DEFAULT_PENDING_TTL, OversizedConfig},
    relay::DEFAULT_NAMESPACE,
    server::{DEFAULT_ASSEMBLY_TIMEOUT, DEFAULT_MAX_MESSAGE_BYTES, DEFAULT_QUEUE_CAPACITY, FrameLimits},
};

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub server: ServerSettings,
    pub frames: FrameSettings,
    pub relay: RelaySettings,
    pub oversized: OversizedSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Address the WebSocket listener binds.
    pub bind: SocketAddr,
    /// Accept workers. 0 = one per CPU.
    pub workers: usize,
    /// Outbound messages queued per connection.
    pub queue_capacity: usize,
    /// Prometheus listener. Unset = no exporter.
    pub metrics_addr: Option<SocketAddr>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameSettings {
    /// Largest outbound frame. Unset = texts are never chunked.
    pub max_frame_bytes: Option<usize>,
    /// Largest inbound message the assembler buffers.
    pub max_message_bytes: usize,
    /// Seconds an incomplete inbound batch is kept.
    pub assembly_timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelaySettings {
    /// Prefix of every pub/sub topic.
    pub namespace: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OversizedSettings {
    /// Largest serialized message sent over the socket.
    pub ceiling_bytes: usize,
    /// Seconds a parked payload waits for an upload target.
    pub pending_ttl_secs: u64,
    /// Headers added to every upload.
    pub upload_headers: BTreeMap<String, String>,
    /// Base URL handed to peers asking where to upload. Unset = refuse.
    pub upload_base_url: Option<String>,
    /// Seconds before a blob transfer is abandoned.
    pub http_timeout_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 8080)),
            workers: 0,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            metrics_addr: None,
        }
    }
}

impl Default for FrameSettings {
    fn default() -> Self {
        Self {
            max_frame_bytes: None,
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
            assembly_timeout_secs: DEFAULT_ASSEMBLY_TIMEOUT.as_secs(),
        }
    }
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_owned(),
        }
    }
}

impl Default for OversizedSettings {
    fn default() -> Self {
        Self {
            ceiling_bytes: DEFAULT_CEILING_BYTES,
            pending_ttl_secs: DEFAULT_PENDING_TTL.as_secs(),
            upload_headers: OversizedConfig::default().upload_headers,
            upload_base_url: None,
            http_timeout_secs: 30,
        }
    }
}

impl RelayConfig {
    /// Read and validate the TOML file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read, parsed or
    /// validated.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Parse and validate configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the text does not parse or a value is
    /// out of range.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check values that parse but cannot be used.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(max) = self.frames.max_frame_bytes
            && max <= CHUNK_HEADER_SIZE
        {
            return Err(ConfigError::Invalid(format!(
                "frames.max_frame_bytes must exceed {CHUNK_HEADER_SIZE}, got {max}"
            )));
        }
        if self.frames.max_message_bytes == 0 {
            return Err(ConfigError::Invalid(
                "frames.max_message_bytes must be positive".to_owned(),
            ));
        }
        if self.relay.namespace.is_empty() {
            return Err(ConfigError::Invalid(
                "relay.namespace must not be empty".to_owned(),
            ));
        }
        Ok(())
    }

    /// Codec for outbound text.
    #[must_use]
    pub fn codec(&self) -> FrameCodec {
        match self.frames.max_frame_bytes.and_then(NonZeroUsize::new) {
            Some(limit) => FrameCodec::new(limit),
            None => FrameCodec::unbounded(),
        }
    }

    /// Limits for inbound chunk reassembly.
    #[must_use]
    pub fn frame_limits(&self) -> FrameLimits {
        FrameLimits {
            max_message_bytes: NonZeroUsize::new(self.frames.max_message_bytes)
                .unwrap_or(NonZeroUsize::MIN),
            assembly_timeout: Duration::from_secs(self.frames.assembly_timeout_secs),
        }
    }

    /// Runtime settings for the oversized payload relay.
    #[must_use]
    pub fn oversized_config(&self) -> OversizedConfig {
        OversizedConfig {
            ceiling_bytes: self.oversized.ceiling_bytes,
            pending_ttl: Duration::from_secs(self.oversized.pending_ttl_secs),
            upload_headers: self.oversized.upload_headers.clone(),
        }
    }

    /// Timeout for blob transfers.
    #[must_use]
    pub fn http_timeout(&self) -> Duration { Duration::from_secs(self.oversized.http_timeout_secs) }
}

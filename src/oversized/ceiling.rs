//! Owner-side enforcement of the message ceiling.

use std::sync::Arc;

use tracing::{info, warn};

use super::{OversizedConfig, PendingUploads};
use crate::{
    event::{EventKind, RequestId, WebsocketEvent},
    metrics,
    registry::{ConnectionId, OutboundGuard, Screened},
};

/// Diverts oversized message events into the upload exchange.
///
/// Installed on the registry that owns the sockets, so the pending entry is
/// recorded by the process that will later receive the peer's
/// `upload_response`. Clones share the pending table.
#[derive(Clone, Debug)]
pub struct CeilingGuard {
    config: Arc<OversizedConfig>,
    pending: PendingUploads,
}

impl CeilingGuard {
    #[must_use]
    pub fn new(config: OversizedConfig) -> Self {
        let pending = PendingUploads::new(config.pending_ttl);
        Self {
            config: Arc::new(config),
            pending,
        }
    }

    /// Configuration the ceiling is read from.
    #[must_use]
    pub fn config(&self) -> &OversizedConfig { &self.config }

    /// Payloads parked until their peer answers.
    #[must_use]
    pub fn pending(&self) -> &PendingUploads { &self.pending }
}

impl OutboundGuard for CeilingGuard {
    fn screen(&self, id: &ConnectionId, text: String) -> Screened {
        let ceiling = self.config.ceiling_bytes;
        if text.len() <= ceiling {
            return Screened::Pass(text);
        }
        if WebsocketEvent::peek_kind(&text) != Some(EventKind::Message) {
            warn!(connection_id = %id, size = text.len(), ceiling, "dropping oversized non-message text");
            metrics::inc_errors();
            return Screened::Reject;
        }

        let request_id = RequestId::generate();
        let request = WebsocketEvent::UploadRequest {
            request_id: request_id.clone(),
        };
        let request = match request.to_json() {
            Ok(request) => request,
            Err(error) => {
                warn!(connection_id = %id, %error, "failed to encode upload request");
                metrics::inc_errors();
                return Screened::Reject;
            }
        };
        info!(
            connection_id = %id,
            %request_id,
            size = text.len(),
            ceiling,
            "message over ceiling; requesting upload target"
        );
        self.pending.insert(request_id, id.clone(), text);
        metrics::inc_oversized_uploads();
        Screened::Replace(request)
    }
}

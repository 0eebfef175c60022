//! Upload/download indirection for messages above the transport ceiling.
//!
//! Some transports cap the whole message rather than a frame, so chunking
//! cannot help. When a serialized message is over the ceiling the process
//! owning the socket parks it and asks the peer for an upload target; the
//! peer answers with a presigned URL on the same socket, the owner uploads
//! the payload and sends back a small download pointer. Only control events
//! cross the socket.

mod blob;
mod ceiling;
mod pending;
mod presign;

use std::{collections::BTreeMap, sync::Arc, time::Duration};

use bytes::Bytes;
use serde_json::Value;
use tracing::{debug, warn};

pub use blob::{BlobClient, BlobError, HttpBlobClient, download_url};
pub use ceiling::CeilingGuard;
pub use pending::{PendingUpload, PendingUploads};
pub use presign::{PrefixPresigner, Presigner};

use crate::{
    event::{HttpTarget, RequestId, WebsocketEvent},
    metrics,
    registry::{ConnectionId, ConnectionRouter},
};

/// Default transport ceiling for a serialized message, in bytes.
pub const DEFAULT_CEILING_BYTES: usize = 128 * 1024;
/// Default lifetime of a pending upload.
pub const DEFAULT_PENDING_TTL: Duration = Duration::from_secs(300);

/// Runtime settings for [`OversizedPayloadRelay`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OversizedConfig {
    /// Largest serialized message sent directly.
    pub ceiling_bytes: usize,
    /// How long a parked payload waits for its upload target.
    pub pending_ttl: Duration,
    /// Headers added to every upload; headers from the peer win on conflict.
    pub upload_headers: BTreeMap<String, String>,
}

impl Default for OversizedConfig {
    fn default() -> Self {
        Self {
            ceiling_bytes: DEFAULT_CEILING_BYTES,
            pending_ttl: DEFAULT_PENDING_TTL,
            upload_headers: BTreeMap::from([("x-amz-acl".to_owned(), "public-read".to_owned())]),
        }
    }
}

/// Answers the control events of the upload exchange and fetches
/// downloaded blobs.
///
/// The ceiling itself is enforced by the [`CeilingGuard`] installed on the
/// owning process's registry; this relay must share that guard so it can
/// complete the uploads the guard parked.
#[derive(Clone)]
pub struct OversizedPayloadRelay {
    router: Arc<dyn ConnectionRouter>,
    blobs: Arc<dyn BlobClient>,
    presigner: Option<Arc<dyn Presigner>>,
    ceiling: CeilingGuard,
}

impl OversizedPayloadRelay {
    /// Create a relay that sends through `router`, moves blobs with `blobs`
    /// and completes uploads parked by `ceiling`.
    #[must_use]
    pub fn new(
        router: Arc<dyn ConnectionRouter>,
        blobs: Arc<dyn BlobClient>,
        ceiling: CeilingGuard,
    ) -> Self {
        Self {
            router,
            blobs,
            presigner: None,
            ceiling,
        }
    }

    /// Answer peers' upload requests with targets from `presigner`.
    #[must_use]
    pub fn with_presigner(mut self, presigner: Arc<dyn Presigner>) -> Self {
        self.presigner = Some(presigner);
        self
    }

    /// Ceiling, TTL and upload headers in force.
    #[must_use]
    pub fn config(&self) -> &OversizedConfig { self.ceiling.config() }

    /// Uploads waiting for a peer's target.
    #[must_use]
    pub fn pending(&self) -> &PendingUploads { self.ceiling.pending() }

    /// Router used for every send.
    #[must_use]
    pub fn router(&self) -> &Arc<dyn ConnectionRouter> { &self.router }

    /// Send `payload` to `id` as a message event, wherever `id` lives.
    ///
    /// The owning process diverts the event through an upload if it is over
    /// the ceiling.
    pub async fn send(&self, id: &ConnectionId, payload: Value) {
        self.router
            .send_message(std::slice::from_ref(id), payload, None)
            .await;
    }

    /// Handle an event received from `id`.
    ///
    /// Returns the payload to dispatch locally, either from a plain message
    /// or from a downloaded blob. Control events are answered here.
    pub async fn handle_event(&self, id: &ConnectionId, event: WebsocketEvent) -> Option<Value> {
        match event {
            WebsocketEvent::Message { payload } => Some(payload),
            WebsocketEvent::UploadRequest { request_id } => {
                self.answer_upload_request(id, request_id).await;
                None
            }
            WebsocketEvent::UploadResponse { request_id, target } => {
                self.complete_upload(id, request_id, target).await;
                None
            }
            WebsocketEvent::DownloadRequest { request_id, target } => {
                self.fetch_download(id, request_id, &target).await
            }
            WebsocketEvent::Error { request_id, info } => {
                warn!(connection_id = %id, %request_id, %info, "peer reported a failed request");
                None
            }
        }
    }

    /// Drop uploads still waiting on `id`. Called when the connection closes.
    pub fn forget_connection(&self, id: &ConnectionId) -> usize {
        let dropped = self.pending().forget_connection(id);
        if dropped > 0 {
            debug!(connection_id = %id, dropped, "discarded pending uploads");
        }
        dropped
    }

    /// Drop uploads older than the configured TTL.
    pub fn purge_expired(&self) -> usize {
        self.pending().purge_expired_at(std::time::Instant::now())
    }

    async fn answer_upload_request(&self, id: &ConnectionId, request_id: RequestId) {
        let target = match &self.presigner {
            Some(presigner) => presigner.presign_upload(id, &request_id).await,
            None => Err(BlobError::Unsupported),
        };
        let reply = match target {
            Ok(target) => WebsocketEvent::UploadResponse { request_id, target },
            Err(error) => {
                warn!(connection_id = %id, %request_id, %error, "cannot issue upload target");
                WebsocketEvent::Error {
                    request_id,
                    info: error.to_string(),
                }
            }
        };
        self.router.send_event(id, &reply).await;
    }

    async fn complete_upload(&self, id: &ConnectionId, request_id: RequestId, target: HttpTarget) {
        let Some(pending) = self.pending().take(&request_id, id) else {
            if self.pending().contains(&request_id) {
                warn!(connection_id = %id, %request_id, "upload response for another connection's request");
                metrics::inc_errors();
            } else {
                warn!(connection_id = %id, %request_id, "upload response for unknown request");
            }
            return;
        };
        let mut headers = self.config().upload_headers.clone();
        headers.extend(target.headers);
        let upload = HttpTarget { headers, ..target };

        let result = self
            .blobs
            .upload(&upload, Bytes::clone(pending.body()))
            .await
            .and_then(|()| download_url(&upload.url));
        match result {
            Ok(url) => {
                let pointer = WebsocketEvent::DownloadRequest {
                    request_id: RequestId::generate(),
                    target: HttpTarget::get(url),
                };
                debug!(connection_id = %pending.connection(), %request_id, "payload uploaded");
                self.router
                    .send_event(pending.connection(), &pointer)
                    .await;
            }
            Err(error) => {
                warn!(connection_id = %id, %request_id, %error, "upload failed; payload kept pending");
                metrics::inc_errors();
                self.pending().restore(request_id, pending);
            }
        }
    }

    async fn fetch_download(
        &self,
        id: &ConnectionId,
        request_id: RequestId,
        target: &HttpTarget,
    ) -> Option<Value> {
        let parsed = match self.blobs.download(target).await {
            Ok(body) => parse_blob(&body),
            Err(error) => Err(error.to_string()),
        };
        match parsed {
            Ok(payload) => Some(payload),
            Err(info) => {
                warn!(connection_id = %id, %request_id, url = %target.url, %info, "download failed");
                metrics::inc_errors();
                self.router
                    .send_event(id, &WebsocketEvent::Error { request_id, info })
                    .await;
                None
            }
        }
    }
}

/// Read a downloaded blob: a serialized message event, or bare JSON.
fn parse_blob(body: &[u8]) -> Result<Value, String> {
    let text = std::str::from_utf8(body).map_err(|error| error.to_string())?;
    if let Ok(WebsocketEvent::Message { payload }) = WebsocketEvent::from_json(text) {
        return Ok(payload);
    }
    serde_json::from_str(text).map_err(|error| format!("blob is not json: {error}"))
}

//! Upload targets handed out when a peer asks to send an oversized payload.

use std::collections::BTreeMap;

use async_trait::async_trait;

use super::BlobError;
use crate::{
    event::{HttpTarget, RequestId},
    registry::ConnectionId,
};

/// Issues presigned upload targets.
#[async_trait]
pub trait Presigner: Send + Sync {
    /// Produce the target `connection` should upload request `request_id` to.
    ///
    /// # Errors
    ///
    /// Returns [`BlobError`] if no target can be issued.
    async fn presign_upload(
        &self,
        connection: &ConnectionId,
        request_id: &RequestId,
    ) -> Result<HttpTarget, BlobError>;
}

/// Presigner for stores that accept unsigned `PUT`s under a base URL, such
/// as a development bucket or a test server.
#[derive(Clone, Debug)]
pub struct PrefixPresigner {
    base_url: String,
}

impl PrefixPresigner {
    /// Issue targets of the form `{base_url}/{request_id}`.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self { base_url }
    }
}

#[async_trait]
impl Presigner for PrefixPresigner {
    async fn presign_upload(
        &self,
        _connection: &ConnectionId,
        request_id: &RequestId,
    ) -> Result<HttpTarget, BlobError> {
        Ok(HttpTarget {
            url: format!("{}/{request_id}", self.base_url),
            method: "PUT".to_owned(),
            headers: BTreeMap::new(),
        })
    }
}

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use bytes::Bytes;
use relayframe::{
    HttpTarget,
    oversized::{BlobClient, BlobError},
};

/// One upload seen by [`FakeBlobClient`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordedUpload {
    pub target: HttpTarget,
    pub body: Bytes,
}

/// In-memory object store.
///
/// Uploads are stored under their URL with the query stripped, so the
/// download pointer the relay derives finds them again.
#[derive(Clone, Debug, Default)]
pub struct FakeBlobClient {
    uploads: Arc<Mutex<Vec<RecordedUpload>>>,
    blobs: Arc<Mutex<HashMap<String, Bytes>>>,
    fail_uploads: Arc<Mutex<bool>>,
}

impl FakeBlobClient {
    pub fn new() -> Self { Self::default() }

    /// Serve `body` for downloads of `url`.
    pub fn with_blob(self, url: &str, body: impl Into<Bytes>) -> Self {
        self.blobs
            .lock()
            .expect("blobs lock")
            .insert(url.to_owned(), body.into());
        self
    }

    /// Make uploads fail until called again with `false`.
    pub fn fail_uploads(&self, fail: bool) { *self.fail_uploads.lock().expect("fail lock") = fail; }

    pub fn uploads(&self) -> Vec<RecordedUpload> { self.uploads.lock().expect("uploads lock").clone() }
}

fn strip_query(url: &str) -> &str { url.split(['?', '#']).next().unwrap_or(url) }

#[async_trait]
impl BlobClient for FakeBlobClient {
    async fn upload(&self, target: &HttpTarget, body: Bytes) -> Result<(), BlobError> {
        if *self.fail_uploads.lock().expect("fail lock") {
            return Err(BlobError::Status {
                url: target.url.clone(),
                status: 503,
            });
        }
        self.blobs
            .lock()
            .expect("blobs lock")
            .insert(strip_query(&target.url).to_owned(), body.clone());
        self.uploads
            .lock()
            .expect("uploads lock")
            .push(RecordedUpload {
                target: target.clone(),
                body,
            });
        Ok(())
    }

    async fn download(&self, target: &HttpTarget) -> Result<Bytes, BlobError> {
        self.blobs
            .lock()
            .expect("blobs lock")
            .get(&target.url)
            .cloned()
            .ok_or_else(|| BlobError::Status {
                url: target.url.clone(),
                status: 404,
            })
    }
}

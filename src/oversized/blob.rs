//! Object-store transfers behind presigned URLs.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Method, Url};
use thiserror::Error;
use tracing::debug;

use crate::event::HttpTarget;

/// Errors raised while moving a blob.
#[derive(Debug, Error)]
pub enum BlobError {
    /// The target URL does not parse.
    #[error("invalid blob url {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },
    /// The target method is not a valid HTTP method.
    #[error("invalid http method {0:?}")]
    InvalidMethod(String),
    /// The object store answered with a non-success status.
    #[error("blob request to {url} failed with status {status}")]
    Status { url: String, status: u16 },
    /// The request could not be sent or its body read.
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
    /// No presigner is configured for upload requests.
    #[error("uploads are not supported by this server")]
    Unsupported,
}

/// Performs the HTTP leg of the oversized payload exchange.
#[async_trait]
pub trait BlobClient: Send + Sync {
    /// Send `body` to `target`.
    ///
    /// # Errors
    ///
    /// Returns [`BlobError`] if the request fails or is rejected.
    async fn upload(&self, target: &HttpTarget, body: Bytes) -> Result<(), BlobError>;

    /// Fetch the blob described by `target`.
    ///
    /// # Errors
    ///
    /// Returns [`BlobError`] if the request fails or is rejected.
    async fn download(&self, target: &HttpTarget) -> Result<Bytes, BlobError>;
}

/// [`BlobClient`] backed by `reqwest`.
#[derive(Clone, Debug, Default)]
pub struct HttpBlobClient {
    client: reqwest::Client,
}

impl HttpBlobClient {
    /// Build a client whose requests time out after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`BlobError::Transport`] if the TLS backend fails to start.
    pub fn with_timeout(timeout: Duration) -> Result<Self, BlobError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    /// Wrap an existing `reqwest` client.
    #[must_use]
    pub fn from_client(client: reqwest::Client) -> Self { Self { client } }

    async fn execute(&self, target: &HttpTarget, body: Option<Bytes>) -> Result<Bytes, BlobError> {
        let method = Method::from_bytes(target.method.to_ascii_uppercase().as_bytes())
            .map_err(|_| BlobError::InvalidMethod(target.method.clone()))?;
        let url = parse_url(&target.url)?;
        let mut request = self.client.request(method, url);
        for (name, value) in &target.headers {
            request = request.header(name, value);
        }
        if let Some(body) = body {
            request = request.body(body);
        }
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(BlobError::Status {
                url: target.url.clone(),
                status: status.as_u16(),
            });
        }
        debug!(url = %target.url, status = status.as_u16(), "blob request complete");
        Ok(response.bytes().await?)
    }
}

#[async_trait]
impl BlobClient for HttpBlobClient {
    async fn upload(&self, target: &HttpTarget, body: Bytes) -> Result<(), BlobError> {
        self.execute(target, Some(body)).await.map(|_| ())
    }

    async fn download(&self, target: &HttpTarget) -> Result<Bytes, BlobError> {
        self.execute(target, None).await
    }
}

fn parse_url(url: &str) -> Result<Url, BlobError> {
    Url::parse(url).map_err(|error| BlobError::InvalidUrl {
        url: url.to_owned(),
        reason: error.to_string(),
    })
}

/// Public location of an uploaded blob: `upload_url` without query or
/// fragment, so presigning parameters are not handed to the receiver.
///
/// # Errors
///
/// Returns [`BlobError::InvalidUrl`] if `upload_url` does not parse.
///
/// # Examples
///
/// ```
/// use relayframe::oversized::download_url;
/// let url = download_url("https://bucket.example/blob/1?X-Amz-Signature=abc#frag").unwrap();
/// assert_eq!(url, "https://bucket.example/blob/1");
/// ```
pub fn download_url(upload_url: &str) -> Result<String, BlobError> {
    let mut url = parse_url(upload_url)?;
    url.set_query(None);
    url.set_fragment(None);
    Ok(url.into())
}

//! Events exchanged with peers over a connection.
//!
//! On the wire every event is a JSON array `[kind, requestId, data?]`. In
//! Rust the shape is a closed enum so handlers match on the variant instead
//! of poking at array positions.

use std::{collections::BTreeMap, fmt};

use serde::{
    Deserialize,
    Deserializer,
    Serialize,
    Serializer,
    de::{self, SeqAccess, Visitor},
};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

/// Identifier pairing a request event with its response.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    /// Mint a fresh, time-ordered identifier.
    #[must_use]
    pub fn generate() -> Self { Self(Uuid::now_v7().to_string()) }

    /// Borrow the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str { &self.0 }
}

impl From<&str> for RequestId {
    fn from(value: &str) -> Self { Self(value.to_owned()) }
}

impl From<String> for RequestId {
    fn from(value: String) -> Self { Self(value) }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

/// HTTP request description carried by upload and download events.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpTarget {
    /// Presigned URL of the blob.
    pub url: String,
    /// HTTP method to use, e.g. `POST` or `GET`.
    pub method: String,
    /// Extra headers to send with the request.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

impl HttpTarget {
    /// Describe a plain `GET` of `url` with no extra headers.
    #[must_use]
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: "GET".to_owned(),
            headers: BTreeMap::new(),
        }
    }
}

/// Discriminant written in the first slot of the wire tuple.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Message,
    UploadRequest,
    UploadResponse,
    DownloadRequest,
    Error,
}

/// Event exchanged between a client and the fleet.
#[derive(Clone, Debug, PartialEq)]
pub enum WebsocketEvent {
    /// Application payload delivered as-is.
    Message { payload: Value },
    /// Sender asks for somewhere to upload an oversized payload.
    UploadRequest { request_id: RequestId },
    /// Presigned upload target answering an [`WebsocketEvent::UploadRequest`].
    UploadResponse {
        request_id: RequestId,
        target: HttpTarget,
    },
    /// Pointer to a blob the receiver should fetch and treat as a message.
    DownloadRequest {
        request_id: RequestId,
        target: HttpTarget,
    },
    /// A request could not be served.
    Error { request_id: RequestId, info: String },
}

/// Errors raised while converting events to and from JSON.
#[derive(Debug, Error)]
pub enum EventError {
    #[error("failed to serialize event: {0}")]
    Serialize(#[source] serde_json::Error),
    #[error("failed to parse event: {0}")]
    Parse(#[source] serde_json::Error),
}

impl WebsocketEvent {
    /// Wrap an application payload.
    #[must_use]
    pub fn message(payload: Value) -> Self { Self::Message { payload } }

    /// Return the wire discriminant.
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Message { .. } => EventKind::Message,
            Self::UploadRequest { .. } => EventKind::UploadRequest,
            Self::UploadResponse { .. } => EventKind::UploadResponse,
            Self::DownloadRequest { .. } => EventKind::DownloadRequest,
            Self::Error { .. } => EventKind::Error,
        }
    }

    /// Return the request id, if the event carries one.
    #[must_use]
    pub fn request_id(&self) -> Option<&RequestId> {
        match self {
            Self::Message { .. } => None,
            Self::UploadRequest { request_id }
            | Self::UploadResponse { request_id, .. }
            | Self::DownloadRequest { request_id, .. }
            | Self::Error { request_id, .. } => Some(request_id),
        }
    }

    /// Serialize to the JSON wire tuple.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::Serialize`] if the payload cannot be encoded.
    pub fn to_json(&self) -> Result<String, EventError> {
        serde_json::to_string(self).map_err(EventError::Serialize)
    }

    /// Parse an event from its JSON wire tuple.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::Parse`] for malformed input.
    pub fn from_json(text: &str) -> Result<Self, EventError> {
        serde_json::from_str(text).map_err(EventError::Parse)
    }

    /// Read only the kind of a serialized event, skipping its payload.
    ///
    /// Returns `None` when `text` is not an event tuple.
    #[must_use]
    pub fn peek_kind(text: &str) -> Option<EventKind> {
        serde_json::from_str::<KindOnly>(text).ok().map(|kind| kind.0)
    }
}

/// First slot of an event tuple; the rest is skipped without allocating.
struct KindOnly(EventKind);

impl<'de> Deserialize<'de> for KindOnly {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_seq(KindVisitor)
    }
}

struct KindVisitor;

impl<'de> Visitor<'de> for KindVisitor {
    type Value = KindOnly;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an event tuple")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
        let kind = seq
            .next_element()?
            .ok_or_else(|| de::Error::invalid_length(0, &self))?;
        while seq.next_element::<de::IgnoredAny>()?.is_some() {}
        Ok(KindOnly(kind))
    }
}

impl Serialize for WebsocketEvent {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let kind = self.kind();
        match self {
            Self::Message { payload } => (kind, None::<&RequestId>, payload).serialize(serializer),
            Self::UploadRequest { request_id } => (kind, request_id).serialize(serializer),
            Self::UploadResponse { request_id, target }
            | Self::DownloadRequest { request_id, target } => {
                (kind, request_id, target).serialize(serializer)
            }
            Self::Error { request_id, info } => (kind, request_id, info).serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for WebsocketEvent {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_seq(EventVisitor)
    }
}

struct EventVisitor;

impl<'de> Visitor<'de> for EventVisitor {
    type Value = WebsocketEvent;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an event tuple [kind, requestId, data?]")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
        let kind: EventKind = seq
            .next_element()?
            .ok_or_else(|| de::Error::invalid_length(0, &self))?;
        let request_id: Option<RequestId> = seq.next_element()?.flatten();
        let require_id = |id: Option<RequestId>| -> Result<RequestId, A::Error> {
            id.ok_or_else(|| de::Error::missing_field("requestId"))
        };

        let event = match kind {
            EventKind::Message => WebsocketEvent::Message {
                payload: seq.next_element()?.unwrap_or(Value::Null),
            },
            EventKind::UploadRequest => WebsocketEvent::UploadRequest {
                request_id: require_id(request_id)?,
            },
            EventKind::UploadResponse => WebsocketEvent::UploadResponse {
                request_id: require_id(request_id)?,
                target: seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(2, &self))?,
            },
            EventKind::DownloadRequest => WebsocketEvent::DownloadRequest {
                request_id: require_id(request_id)?,
                target: seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(2, &self))?,
            },
            EventKind::Error => WebsocketEvent::Error {
                request_id: require_id(request_id)?,
                info: seq.next_element()?.unwrap_or_default(),
            },
        };

        // Tolerate trailing elements from newer peers.
        while seq.next_element::<de::IgnoredAny>()?.is_some() {}
        Ok(event)
    }
}

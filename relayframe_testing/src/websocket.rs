use std::{net::SocketAddr, time::Duration};

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::{net::TcpStream, time::timeout};
use tokio_tungstenite::{
    MaybeTlsStream,
    WebSocketStream,
    connect_async,
    tungstenite::{self, Message},
};

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// Minimal WebSocket client speaking the event wire format.
pub struct WsClient {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

/// Connect to a relay server listening on `addr`.
///
/// # Panics
///
/// Panics if the handshake fails.
pub async fn connect(addr: SocketAddr) -> WsClient {
    let (stream, _) = connect_async(format!("ws://{addr}"))
        .await
        .expect("websocket handshake");
    WsClient { stream }
}

impl WsClient {
    /// Send a `message` event carrying `payload`.
    pub async fn send_message(&mut self, payload: &Value) {
        let text = serde_json::json!(["message", null, payload]).to_string();
        self.send_text(text).await;
    }

    pub async fn send_text(&mut self, text: String) {
        self.stream
            .send(Message::Text(text.into()))
            .await
            .expect("send text");
    }

    pub async fn send_binary(&mut self, bytes: Bytes) {
        self.stream
            .send(Message::Binary(bytes))
            .await
            .expect("send binary");
    }

    /// Next data message, skipping control frames. `None` once closed.
    pub async fn recv(&mut self) -> Option<Message> {
        loop {
            let next = timeout(RECV_TIMEOUT, self.stream.next())
                .await
                .expect("timed out waiting for a message")?;
            match next {
                Ok(message @ (Message::Text(_) | Message::Binary(_))) => return Some(message),
                Ok(Message::Close(_)) | Err(tungstenite::Error::ConnectionClosed) => return None,
                Ok(_) => {}
                Err(error) => panic!("websocket error: {error}"),
            }
        }
    }

    /// Next text message parsed as JSON.
    pub async fn recv_json(&mut self) -> Value {
        match self.recv().await {
            Some(Message::Text(text)) => serde_json::from_str(text.as_str()).expect("json text"),
            other => panic!("expected a text message, got {other:?}"),
        }
    }

    pub async fn close(mut self) {
        let _ = self.stream.close(None).await;
    }
}

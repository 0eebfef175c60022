//! End-to-end tests for [`RelayServer`] over real WebSocket connections.

use std::{net::SocketAddr, num::NonZeroUsize, sync::Arc, time::Duration};

use relayframe::{
    CeilingGuard,
    ConnectionRegistry,
    FrameCodec,
    OversizedConfig,
    OversizedPayloadRelay,
    RelayServer,
    oversized::HttpBlobClient,
    server::{BroadcastHandler, EchoHandler, MessageHandler},
};
use relayframe_testing::connect;
use rstest::rstest;
use serde_json::json;
use tokio::{
    sync::oneshot,
    task::JoinHandle,
};
use tokio_tungstenite::tungstenite::Message;

mod common;
use common::{TestResult, eventually, unused_listener};

/// A running server and the handles needed to drive and stop it.
struct Running {
    addr: SocketAddr,
    registry: ConnectionRegistry,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl Running {
    async fn stop(self) {
        let _ = self.shutdown.send(());
        let _ = self.task.await;
    }
}

async fn start(handler: Arc<dyn MessageHandler>) -> TestResult<Running> {
    let ceiling = CeilingGuard::new(OversizedConfig::default());
    let registry = ConnectionRegistry::new().with_guard(Arc::new(ceiling.clone()));
    let oversized = OversizedPayloadRelay::new(
        Arc::new(registry.clone()),
        Arc::new(HttpBlobClient::default()),
        ceiling,
    );
    let (ready_tx, ready_rx) = oneshot::channel();
    let server = RelayServer::new(oversized, handler)
        .workers(1)
        .ready_signal(ready_tx)
        .bind_existing_listener(unused_listener())?;
    let addr = server.local_addr().ok_or("server has no address")?;
    let (shutdown, shutdown_rx) = oneshot::channel::<()>();
    let task = tokio::spawn(async move {
        let _ = server
            .run_with_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await;
    });
    ready_rx.await?;
    Ok(Running {
        addr,
        registry,
        shutdown,
        task,
    })
}

#[tokio::test]
async fn echo_round_trips_a_message() -> TestResult {
    let running = start(Arc::new(EchoHandler)).await?;
    let mut client = connect(running.addr).await;

    client.send_message(&json!({"hello": "world"})).await;
    assert_eq!(
        client.recv_json().await,
        json!(["message", null, {"hello": "world"}])
    );

    client.close().await;
    running.stop().await;
    Ok(())
}

#[rstest]
#[case::just_over_one_frame(40)]
#[case::many_frames(1000)]
#[tokio::test]
async fn chunked_binary_messages_are_reassembled(#[case] size: usize) -> TestResult {
    let running = start(Arc::new(EchoHandler)).await?;
    let mut client = connect(running.addr).await;

    let text = json!(["message", null, "y".repeat(size)]).to_string();
    let codec = FrameCodec::new(NonZeroUsize::new(32).ok_or("zero limit")?);
    let encoded = codec.encode(&text)?;
    assert!(encoded.is_chunked());
    for frame in encoded.into_frames() {
        client.send_binary(frame.into_bytes()).await;
    }

    assert_eq!(
        client.recv_json().await,
        json!(["message", null, "y".repeat(size)])
    );
    running.stop().await;
    Ok(())
}

#[tokio::test]
async fn single_binary_frames_are_decoded() -> TestResult {
    let running = start(Arc::new(EchoHandler)).await?;
    let mut client = connect(running.addr).await;

    let encoded = FrameCodec::unbounded().encode(r#"["message",null,7]"#)?;
    for frame in encoded.into_frames() {
        client.send_binary(frame.into_bytes()).await;
    }

    assert_eq!(client.recv_json().await, json!(["message", null, 7]));
    running.stop().await;
    Ok(())
}

#[tokio::test]
async fn malformed_input_does_not_close_the_connection() -> TestResult {
    let running = start(Arc::new(EchoHandler)).await?;
    let mut client = connect(running.addr).await;

    client.send_text("not json".to_owned()).await;
    client.send_binary(vec![0x7f, 1, 2].into()).await;
    client.send_message(&json!("still here")).await;

    assert_eq!(client.recv_json().await, json!(["message", null, "still here"]));
    running.stop().await;
    Ok(())
}

#[tokio::test]
async fn broadcast_reaches_other_clients_only() -> TestResult {
    let running = start(Arc::new(BroadcastHandler)).await?;
    let mut sender = connect(running.addr).await;
    let mut receiver = connect(running.addr).await;
    let registry = running.registry.clone();
    assert!(eventually(Duration::from_secs(2), || registry.len() == 2).await);

    sender.send_message(&json!("to everyone")).await;
    assert_eq!(
        receiver.recv_json().await,
        json!(["message", null, "to everyone"])
    );

    // The sender is excluded, so the next thing it sees is the reply to
    // the receiver's broadcast.
    receiver.send_message(&json!("back")).await;
    assert_eq!(sender.recv_json().await, json!(["message", null, "back"]));
    running.stop().await;
    Ok(())
}

#[tokio::test]
async fn closing_the_client_unregisters_it() -> TestResult {
    let running = start(Arc::new(EchoHandler)).await?;
    let client = connect(running.addr).await;
    let registry = running.registry.clone();
    assert!(eventually(Duration::from_secs(2), || registry.len() == 1).await);

    client.close().await;
    assert!(eventually(Duration::from_secs(2), || registry.is_empty()).await);
    running.stop().await;
    Ok(())
}

#[tokio::test]
async fn server_disconnect_sends_a_close_frame() -> TestResult {
    use relayframe::ConnectionRouter;

    let running = start(Arc::new(EchoHandler)).await?;
    let mut client = connect(running.addr).await;
    let registry = running.registry.clone();
    assert!(eventually(Duration::from_secs(2), || registry.len() == 1).await);

    let id = registry
        .local_connection_ids()
        .pop()
        .ok_or("no connection registered")?;
    registry.disconnect(&id).await;

    let next: Option<Message> = client.recv().await;
    assert!(next.is_none());
    running.stop().await;
    Ok(())
}

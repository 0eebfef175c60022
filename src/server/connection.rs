//! Per-connection WebSocket handling for [`RelayServer`](super::RelayServer).

use std::{any::Any, net::SocketAddr, ops::ControlFlow, panic::AssertUnwindSafe, sync::Arc};

use futures::{FutureExt, Sink, SinkExt, StreamExt};
use tokio::{net::TcpStream, select};
use tokio_tungstenite::{
    accept_async,
    tungstenite::{self, Message},
};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{debug, error, info, warn};

use super::{ConnectionServices, handler::RelayContext};
use crate::{
    event::WebsocketEvent,
    frame::{AssemblyError, ChunkAssembler, Frame, FrameKind, decode},
    metrics::{self, Direction},
    socket::{ChannelSocket, Outbound, Socket, SocketOutbox, WireMessage},
};

/// Spawn a task serving one accepted TCP stream, logging and discarding
/// any panic raised by the application handler.
pub(super) fn spawn_connection_task(
    stream: TcpStream,
    peer_addr: SocketAddr,
    services: ConnectionServices,
    shutdown: CancellationToken,
    tracker: &TaskTracker,
) {
    tracker.spawn(async move {
        let fut = AssertUnwindSafe(process_stream(stream, peer_addr, services, shutdown))
            .catch_unwind();
        if let Err(panic) = fut.await {
            metrics::inc_errors();
            error!(panic = panic_message(&*panic), %peer_addr, "connection task panicked");
        }
    });
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else if let Some(message) = panic.downcast_ref::<&'static str>() {
        message
    } else {
        "<non-string panic payload>"
    }
}

async fn process_stream(
    stream: TcpStream,
    peer_addr: SocketAddr,
    services: ConnectionServices,
    shutdown: CancellationToken,
) {
    let websocket = match accept_async(stream).await {
        Ok(websocket) => websocket,
        Err(error) => {
            warn!(%peer_addr, %error, "websocket handshake failed");
            return;
        }
    };
    let (sink, mut inbound) = websocket.split();
    let (socket, outbox) = ChannelSocket::bounded(services.queue_capacity);
    let socket = Arc::new(socket);
    let writer = tokio::spawn(write_outbox(sink, outbox));

    let router = Arc::clone(services.router());
    let id = router.register_connection(socket.clone()).await;
    info!(connection_id = %id, %peer_addr, "connection opened");
    let ctx = RelayContext::new(id.clone(), services.oversized.clone());
    services.handler.on_connect(&ctx).await;

    let mut assembler = ChunkAssembler::new(
        services.limits.max_message_bytes,
        services.limits.assembly_timeout,
    );
    loop {
        let next = select! {
            biased;

            () = shutdown.cancelled() => break,
            next = inbound.next() => next,
        };
        let message = match next {
            Some(Ok(message)) => message,
            Some(Err(error)) => {
                debug!(connection_id = %id, %error, "websocket read failed");
                break;
            }
            None => break,
        };
        if handle_message(&services, &ctx, &mut assembler, message)
            .await
            .is_break()
        {
            break;
        }
    }

    router.remove_connection(&id).await;
    services.oversized.forget_connection(&id);
    socket.close().await;
    services.handler.on_disconnect(&ctx).await;
    if let Err(error) = writer.await {
        warn!(connection_id = %id, %error, "writer task failed");
    }
    info!(connection_id = %id, %peer_addr, "connection closed");
}

/// Drain queued writes onto the WebSocket in FIFO order.
async fn write_outbox<S>(mut sink: S, mut outbox: SocketOutbox)
where
    S: Sink<Message, Error = tungstenite::Error> + Unpin,
{
    while let Some(item) = outbox.recv().await {
        let message = match item {
            Outbound::Message(WireMessage::Text(text)) => Message::Text(text.into()),
            Outbound::Message(WireMessage::Binary(bytes)) => Message::Binary(bytes),
            Outbound::Close => {
                if let Err(error) = sink.send(Message::Close(None)).await {
                    debug!(%error, "close frame not sent");
                }
                break;
            }
        };
        if let Err(error) = sink.send(message).await {
            debug!(%error, "websocket write failed");
            break;
        }
    }
}

async fn handle_message(
    services: &ConnectionServices,
    ctx: &RelayContext,
    assembler: &mut ChunkAssembler,
    message: Message,
) -> ControlFlow<()> {
    let id = ctx.connection_id();
    let text = match message {
        Message::Text(text) => Some(text.as_str().to_owned()),
        Message::Binary(bytes) => match read_frame(assembler, Frame::from_bytes(bytes)) {
            Ok(text) => text,
            Err(error) => {
                warn!(connection_id = %id, %error, "dropping malformed frame");
                metrics::inc_errors();
                None
            }
        },
        Message::Close(_) => return ControlFlow::Break(()),
        Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => return ControlFlow::Continue(()),
    };
    metrics::inc_frames(Direction::Inbound);
    if let Some(text) = text {
        dispatch(services, ctx, &text).await;
    }
    ControlFlow::Continue(())
}

/// Decode a binary frame, buffering chunks until their batch completes.
fn read_frame(assembler: &mut ChunkAssembler, frame: Frame) -> Result<Option<String>, AssemblyError> {
    match frame.try_kind()? {
        FrameKind::Single => Ok(Some(decode(&frame)?)),
        FrameKind::Chunk => assembler.push(frame),
    }
}

async fn dispatch(services: &ConnectionServices, ctx: &RelayContext, text: &str) {
    let id = ctx.connection_id();
    let event = match WebsocketEvent::from_json(text) {
        Ok(event) => event,
        Err(error) => {
            warn!(connection_id = %id, %error, "dropping unparseable event");
            metrics::inc_errors();
            return;
        }
    };
    debug!(connection_id = %id, kind = ?event.kind(), "event received");
    if let Some(payload) = services.oversized.handle_event(id, event).await {
        services.handler.on_message(ctx, payload).await;
    }
}

#[cfg(test)]
mod tests {
    use std::{num::NonZeroUsize, time::Duration};

    use rstest::{fixture, rstest};

    use super::*;
    use crate::frame::FrameCodec;

    #[fixture]
    fn assembler() -> ChunkAssembler {
        ChunkAssembler::new(
            NonZeroUsize::new(1024).expect("non-zero"),
            Duration::from_secs(5),
        )
    }

    #[rstest]
    fn single_frames_decode_immediately(mut assembler: ChunkAssembler) {
        let frame = FrameCodec::unbounded()
            .encode("hello")
            .expect("encode")
            .into_frames()
            .remove(0);
        assert_eq!(
            read_frame(&mut assembler, frame).expect("decode"),
            Some("hello".to_owned())
        );
    }

    #[rstest]
    fn chunks_complete_on_the_last_frame(mut assembler: ChunkAssembler) {
        let codec = FrameCodec::new(NonZeroUsize::new(16).expect("non-zero"));
        let frames = codec
            .encode("abcdefghijklmnopqrstuvwxyz")
            .expect("encode")
            .into_frames();
        assert!(frames.len() > 1);
        let last = frames.len() - 1;
        for (index, frame) in frames.into_iter().enumerate() {
            let out = read_frame(&mut assembler, frame).expect("assemble");
            assert_eq!(out.is_some(), index == last);
            if let Some(text) = out {
                assert_eq!(text, "abcdefghijklmnopqrstuvwxyz");
            }
        }
    }

    #[rstest]
    fn unknown_tags_are_rejected(mut assembler: ChunkAssembler) {
        assert!(read_frame(&mut assembler, Frame::from_bytes(vec![0x7f, b'x'])).is_err());
    }

    #[test]
    fn panic_payloads_are_rendered() {
        assert_eq!(panic_message(&"boom"), "boom");
        assert_eq!(panic_message(&String::from("bang")), "bang");
        assert_eq!(panic_message(&5_u32), "<non-string panic payload>");
    }
}

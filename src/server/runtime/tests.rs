//! Tests for server runtime behaviour.

use std::{
    io,
    sync::{Arc, Mutex},
};

use rstest::rstest;
use tokio::{
    sync::oneshot,
    task::yield_now,
    time::{Duration, Instant, advance, timeout},
};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use super::{AcceptLoopOptions, BackoffConfig, MockAcceptListener, accept_loop};
use crate::{
    oversized::OversizedPayloadRelay,
    server::{
        ConnectionServices,
        EchoHandler,
        FrameLimits,
        RelayServer,
        test_util::{bind_server, free_listener, oversized},
    },
};

fn services(oversized: OversizedPayloadRelay) -> ConnectionServices {
    ConnectionServices {
        oversized,
        handler: Arc::new(EchoHandler),
        limits: FrameLimits::default(),
        queue_capacity: 8,
    }
}

#[rstest]
#[tokio::test]
async fn run_with_immediate_shutdown_returns(
    oversized: OversizedPayloadRelay,
    free_listener: std::net::TcpListener,
) {
    let server = bind_server(oversized, free_listener);
    let result = timeout(
        Duration::from_millis(1000),
        server.run_with_shutdown(tokio::time::sleep(Duration::from_millis(10))),
    )
    .await;
    assert!(result.expect("server did not finish in time").is_ok());
}

#[rstest]
#[tokio::test]
async fn ready_signal_fires_after_workers_start(
    oversized: OversizedPayloadRelay,
    free_listener: std::net::TcpListener,
) {
    let (ready_tx, ready_rx) = oneshot::channel();
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let server = RelayServer::new(oversized, Arc::new(EchoHandler))
        .workers(2)
        .ready_signal(ready_tx)
        .bind_existing_listener(free_listener)
        .expect("bind");
    assert_eq!(server.worker_count(), 2);
    let handle = tokio::spawn(server.run_with_shutdown(async {
        let _ = stop_rx.await;
    }));
    timeout(Duration::from_secs(1), ready_rx)
        .await
        .expect("ready in time")
        .expect("ready sent");
    let _ = stop_tx.send(());
    handle
        .await
        .expect("server join error")
        .expect("server run failed");
}

#[rstest]
fn unbound_server_has_no_address(oversized: OversizedPayloadRelay) {
    let server = RelayServer::new(oversized, Arc::new(EchoHandler)).workers(0);
    assert!(server.local_addr().is_none());
    assert_eq!(server.worker_count(), 1);
}

#[rstest]
#[tokio::test]
async fn bound_server_reports_listener_address(
    oversized: OversizedPayloadRelay,
    free_listener: std::net::TcpListener,
) {
    let expected = free_listener.local_addr().expect("listener addr");
    let server = bind_server(oversized, free_listener);
    assert_eq!(server.local_addr(), Some(expected));
}

#[rstest]
#[tokio::test]
async fn accept_loop_stops_on_shutdown(oversized: OversizedPayloadRelay) {
    let mut listener = MockAcceptListener::new();
    listener
        .expect_accept()
        .returning(|| Box::pin(std::future::pending()));
    listener.expect_local_addr().never();
    let token = CancellationToken::new();
    let tracker = TaskTracker::new();
    tracker.spawn(accept_loop(
        Arc::new(listener),
        AcceptLoopOptions {
            services: services(oversized),
            shutdown: token.clone(),
            tracker: tracker.clone(),
            backoff: BackoffConfig::default(),
        },
    ));
    token.cancel();
    tracker.close();
    assert!(
        timeout(Duration::from_millis(100), tracker.wait())
            .await
            .is_ok()
    );
}

fn failing_listener(calls: &Arc<Mutex<Vec<Instant>>>, num_calls: usize) -> MockAcceptListener {
    let mut listener = MockAcceptListener::new();
    let call_log = Arc::clone(calls);
    listener
        .expect_accept()
        .returning(move || {
            let call_log = Arc::clone(&call_log);
            Box::pin(async move {
                call_log.lock().expect("lock").push(Instant::now());
                Err(io::Error::other("mock error"))
            })
        })
        .times(num_calls);
    listener
        .expect_local_addr()
        .returning(|| Ok("127.0.0.1:0".parse().expect("addr parse")))
        .times(num_calls);
    listener
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn accept_errors_back_off_exponentially(oversized: OversizedPayloadRelay) {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let listener = Arc::new(failing_listener(&calls, 4));
    let token = CancellationToken::new();
    let tracker = TaskTracker::new();
    tracker.spawn(accept_loop(
        listener,
        AcceptLoopOptions {
            services: services(oversized),
            shutdown: token.clone(),
            tracker: tracker.clone(),
            backoff: BackoffConfig {
                initial_delay: Duration::from_millis(5),
                max_delay: Duration::from_millis(20),
            },
        },
    ));

    yield_now().await;
    assert_eq!(calls.lock().expect("lock").len(), 1);
    for ms in [5, 10, 20] {
        advance(Duration::from_millis(ms)).await;
        yield_now().await;
    }
    token.cancel();
    advance(Duration::from_millis(20)).await;
    yield_now().await;
    tracker.close();
    tracker.wait().await;

    let calls = calls.lock().expect("lock");
    let intervals: Vec<Duration> = calls
        .windows(2)
        .filter_map(|pair| match pair {
            [a, b] => b.checked_duration_since(*a),
            _ => None,
        })
        .collect();
    assert_eq!(
        intervals,
        [5, 10, 20].map(Duration::from_millis).to_vec()
    );
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn shutdown_interrupts_accept_back_off(oversized: OversizedPayloadRelay) {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let listener = Arc::new(failing_listener(&calls, 1));
    let token = CancellationToken::new();
    let tracker = TaskTracker::new();
    tracker.spawn(accept_loop(
        listener,
        AcceptLoopOptions {
            services: services(oversized),
            shutdown: token.clone(),
            tracker: tracker.clone(),
            backoff: BackoffConfig {
                initial_delay: Duration::from_secs(60),
                max_delay: Duration::from_secs(60),
            },
        },
    ));

    yield_now().await;
    assert_eq!(calls.lock().expect("lock").len(), 1);
    let cancelled_at = Instant::now();
    token.cancel();
    tracker.close();
    tracker.wait().await;
    assert!(Instant::now().duration_since(cancelled_at) < Duration::from_secs(1));
}

//! Accept loop for the server runtime.

use std::{io, net::SocketAddr, sync::Arc};

use async_trait::async_trait;
use tokio::{
    net::{TcpListener, TcpStream},
    select,
    time::sleep,
};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::warn;

use super::backoff::BackoffConfig;
use crate::{
    metrics,
    server::{ConnectionServices, connection::spawn_connection_task},
};

/// Source of incoming connections consumed by the accept loop.
///
/// Dropping a pending `accept()` future must not leak resources.
#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub(in crate::server) trait AcceptListener: Send + Sync {
    async fn accept(&self) -> io::Result<(TcpStream, SocketAddr)>;
    fn local_addr(&self) -> io::Result<SocketAddr>;
}

#[async_trait]
impl AcceptListener for TcpListener {
    async fn accept(&self) -> io::Result<(TcpStream, SocketAddr)> {
        TcpListener::accept(self).await
    }

    fn local_addr(&self) -> io::Result<SocketAddr> { TcpListener::local_addr(self) }
}

pub(in crate::server) struct AcceptLoopOptions {
    pub services: ConnectionServices,
    pub shutdown: CancellationToken,
    pub tracker: TaskTracker,
    pub backoff: BackoffConfig,
}

/// Accept connections from `listener` and spawn a task for each.
///
/// Failures to accept back off exponentially, starting at
/// `backoff.initial_delay` and capped at `backoff.max_delay`; a success
/// resets the delay. The loop ends when `shutdown` is cancelled, including
/// mid back-off. Connection
/// tasks are tracked by `tracker` and observe the same token.
pub(in crate::server) async fn accept_loop<L>(listener: Arc<L>, options: AcceptLoopOptions)
where
    L: AcceptListener + 'static,
{
    let backoff = options.backoff.normalized();
    let mut delay = backoff.initial_delay;
    loop {
        select! {
            biased;

            () = options.shutdown.cancelled() => break,
            res = listener.accept() => match res {
                Ok((stream, peer_addr)) => {
                    spawn_connection_task(
                        stream,
                        peer_addr,
                        options.services.clone(),
                        options.shutdown.clone(),
                        &options.tracker,
                    );
                    delay = backoff.initial_delay;
                }
                Err(error) => {
                    let local_addr = listener.local_addr().ok();
                    warn!(%error, ?local_addr, "accept error");
                    metrics::inc_errors();
                    select! {
                        biased;

                        () = options.shutdown.cancelled() => break,
                        () = sleep(delay) => {}
                    }
                    delay = (delay * 2).min(backoff.max_delay);
                }
            },
        }
    }
}

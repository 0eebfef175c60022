//! Runtime control for [`RelayServer`].

mod accept;
mod backoff;
#[cfg(test)]
mod tests;

use std::sync::Arc;

#[cfg(test)]
pub(super) use accept::MockAcceptListener;
pub(super) use accept::{AcceptLoopOptions, accept_loop};
pub use backoff::BackoffConfig;
use futures::Future;
use tokio::{select, signal};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{info, warn};

use super::{Bound, RelayServer, ServerError};

impl RelayServer<Bound> {
    /// Run the server until Ctrl+C is received.
    ///
    /// # Errors
    ///
    /// Accept failures are retried with exponential back-off and do not
    /// surface as errors; the result is reserved for startup failures.
    pub async fn run(self) -> Result<(), ServerError> {
        self.run_with_shutdown(async {
            if let Err(error) = signal::ctrl_c().await {
                warn!(%error, "failed to listen for ctrl-c");
            }
        })
        .await
    }

    /// Run the server until the `shutdown` future resolves.
    ///
    /// Open connections are closed and their tasks awaited before this
    /// returns.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use std::sync::Arc;
    ///
    /// use relayframe::{
    ///     oversized::{CeilingGuard, HttpBlobClient, OversizedConfig, OversizedPayloadRelay},
    ///     registry::ConnectionRegistry,
    ///     server::{EchoHandler, RelayServer},
    /// };
    /// use tokio::sync::oneshot;
    ///
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), relayframe::server::ServerError> {
    /// let ceiling = CeilingGuard::new(OversizedConfig::default());
    /// let registry = ConnectionRegistry::new().with_guard(Arc::new(ceiling.clone()));
    /// let oversized = OversizedPayloadRelay::new(
    ///     Arc::new(registry),
    ///     Arc::new(HttpBlobClient::default()),
    ///     ceiling,
    /// );
    /// let server = RelayServer::new(oversized, Arc::new(EchoHandler))
    ///     .bind(([127, 0, 0, 1], 0).into())?;
    ///
    /// let (tx, rx) = oneshot::channel::<()>();
    /// let handle = tokio::spawn(server.run_with_shutdown(async {
    ///     let _ = rx.await;
    /// }));
    /// let _ = tx.send(());
    /// handle.await.expect("join server task")?;
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// # Errors
    ///
    /// See [`RelayServer::run`].
    pub async fn run_with_shutdown<S>(self, shutdown: S) -> Result<(), ServerError>
    where
        S: Future<Output = ()> + Send,
    {
        let RelayServer {
            services,
            workers,
            backoff_config,
            ready_tx,
            state: Bound { listener },
        } = self;
        let shutdown_token = CancellationToken::new();
        let tracker = TaskTracker::new();

        if let Ok(addr) = listener.local_addr() {
            info!(%addr, workers, "relay server listening");
        }
        for _ in 0..workers {
            tracker.spawn(accept_loop(
                Arc::clone(&listener),
                AcceptLoopOptions {
                    services: services.clone(),
                    shutdown: shutdown_token.clone(),
                    tracker: tracker.clone(),
                    backoff: backoff_config,
                },
            ));
        }

        // Signal readiness after all workers have been spawned.
        if let Some(tx) = ready_tx
            && tx.send(()).is_err()
        {
            warn!("failed to send readiness signal: receiver dropped");
        }

        select! {
            () = shutdown => shutdown_token.cancel(),
            () = tracker.wait() => {},
        }

        tracker.close();
        tracker.wait().await;
        info!("relay server stopped");
        Ok(())
    }
}

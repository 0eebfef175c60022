//! Listener binding for [`RelayServer`].

use std::{
    net::{SocketAddr, TcpListener as StdTcpListener},
    sync::Arc,
};

use tokio::net::TcpListener;

use super::{Bound, RelayServer, ServerError, ServerState, Unbound};

impl<S: ServerState> RelayServer<S> {
    fn bind_to_listener(self, std_listener: StdTcpListener) -> Result<RelayServer<Bound>, ServerError> {
        let RelayServer {
            services,
            workers,
            backoff_config,
            ready_tx,
            ..
        } = self;

        std_listener
            .set_nonblocking(true)
            .map_err(ServerError::Bind)?;
        let tokio_listener = TcpListener::from_std(std_listener).map_err(ServerError::Bind)?;

        Ok(RelayServer {
            services,
            workers,
            backoff_config,
            ready_tx,
            state: Bound {
                listener: Arc::new(tokio_listener),
            },
        })
    }

    /// Bind to `addr`, replacing any previous binding.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] if the socket cannot be bound.
    pub fn bind(self, addr: SocketAddr) -> Result<RelayServer<Bound>, ServerError> {
        let std_listener = StdTcpListener::bind(addr).map_err(ServerError::Bind)?;
        self.bind_to_listener(std_listener)
    }

    /// Adopt an already bound standard listener.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] if the listener cannot be made
    /// non-blocking or registered with the runtime.
    pub fn bind_existing_listener(
        self,
        std_listener: StdTcpListener,
    ) -> Result<RelayServer<Bound>, ServerError> {
        self.bind_to_listener(std_listener)
    }
}

impl RelayServer<Unbound> {
    /// Unbound servers have no address.
    #[must_use]
    pub const fn local_addr(&self) -> Option<SocketAddr> { None }
}

impl RelayServer<Bound> {
    /// Address the listener is bound to.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> { self.state.listener.local_addr().ok() }
}

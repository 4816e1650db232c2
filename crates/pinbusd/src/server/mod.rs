//! TCP server for the pinbus daemon.
//!
//! The server owns only the listening socket. Each accepted connection is
//! split: the write half goes to the registry actor during registration,
//! the read half goes to a spawned [`ClientReceiver`] task.

mod connection;

pub use connection::ClientReceiver;

use std::io;
use std::net::SocketAddr;

use thiserror::Error;
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::registry::RegistryHandle;

/// Accept backlog passed to `listen`.
const LISTEN_BACKLOG: u32 = 128;

/// The daemon's TCP server.
pub struct BusServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    registry: RegistryHandle,
    cancel_token: CancellationToken,
}

impl BusServer {
    /// Binds the listening socket.
    ///
    /// `SO_REUSEADDR` is set before binding so a restarted daemon can take
    /// the port back immediately instead of waiting out TIME_WAIT.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] if the socket cannot be created,
    /// configured, or bound.
    pub fn bind(
        addr: SocketAddr,
        registry: RegistryHandle,
        cancel_token: CancellationToken,
    ) -> Result<Self, ServerError> {
        let socket = match addr {
            SocketAddr::V4(_) => TcpSocket::new_v4(),
            SocketAddr::V6(_) => TcpSocket::new_v6(),
        }
        .map_err(|source| ServerError::Bind { addr, source })?;

        socket
            .set_reuseaddr(true)
            .map_err(|source| ServerError::Bind { addr, source })?;
        socket
            .bind(addr)
            .map_err(|source| ServerError::Bind { addr, source })?;

        let listener = socket
            .listen(LISTEN_BACKLOG)
            .map_err(|source| ServerError::Bind { addr, source })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| ServerError::Bind { addr, source })?;

        Ok(Self {
            listener,
            local_addr,
            registry,
            cancel_token,
        })
    }

    /// The bound address. Differs from the requested one when binding
    /// port 0.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Runs the accept loop until the cancellation token fires.
    pub async fn run(&self) {
        info!(addr = %self.local_addr, "Bus server listening");

        loop {
            tokio::select! {
                _ = self.cancel_token.cancelled() => {
                    info!("Server shutdown requested");
                    break;
                }

                result = self.listener.accept() => {
                    match result {
                        Ok((stream, peer)) => {
                            self.handle_connection(stream, peer).await;
                        }
                        Err(e) => {
                            error!(error = %e, "Failed to accept connection");
                        }
                    }
                }
            }
        }

        info!("Server stopped");
    }

    async fn handle_connection(&self, stream: TcpStream, peer: SocketAddr) {
        debug!(peer = %peer, "Accepted connection");

        let (reader, writer) = stream.into_split();

        // Registration completes, snapshot included, before the receiver
        // task exists, so a client's own first frame can never be dispatched
        // ahead of its snapshot.
        let client_id = match self.registry.register(peer, writer).await {
            Ok(id) => id,
            Err(e) => {
                warn!(peer = %peer, error = %e, "Registration failed, dropping connection");
                return;
            }
        };

        let receiver = ClientReceiver::new(client_id, peer, reader, self.registry.clone());
        tokio::spawn(receiver.run());
    }
}

/// Errors from running the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind { addr: SocketAddr, source: io::Error },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::spawn_registry;
    use crate::store::StateStore;

    fn test_registry(dir: &tempfile::TempDir) -> RegistryHandle {
        spawn_registry(StateStore::new(dir.path().join("port_pins")))
    }

    #[tokio::test]
    async fn test_bind_ephemeral_port() {
        let dir = tempfile::tempdir().unwrap();
        let server = BusServer::bind(
            "127.0.0.1:0".parse().unwrap(),
            test_registry(&dir),
            CancellationToken::new(),
        )
        .unwrap();

        assert_ne!(server.local_addr().port(), 0);
    }

    #[tokio::test]
    async fn test_bind_conflict_errors() {
        let dir = tempfile::tempdir().unwrap();
        let registry = test_registry(&dir);

        let first = BusServer::bind(
            "127.0.0.1:0".parse().unwrap(),
            registry.clone(),
            CancellationToken::new(),
        )
        .unwrap();

        // SO_REUSEADDR covers TIME_WAIT, not two live listeners.
        let result = BusServer::bind(first.local_addr(), registry, CancellationToken::new());
        assert!(matches!(result, Err(ServerError::Bind { .. })));
    }

    #[tokio::test]
    async fn test_rebind_after_drop() {
        let dir = tempfile::tempdir().unwrap();
        let registry = test_registry(&dir);

        let first = BusServer::bind(
            "127.0.0.1:0".parse().unwrap(),
            registry.clone(),
            CancellationToken::new(),
        )
        .unwrap();
        let addr = first.local_addr();
        drop(first);

        let second = BusServer::bind(addr, registry, CancellationToken::new()).unwrap();
        assert_eq!(second.local_addr(), addr);
    }

    #[test]
    fn test_server_error_display() {
        let err = ServerError::Bind {
            addr: "0.0.0.0:55667".parse().unwrap(),
            source: io::Error::new(io::ErrorKind::AddrInUse, "address in use"),
        };
        assert_eq!(
            err.to_string(),
            "failed to bind 0.0.0.0:55667: address in use"
        );
    }
}

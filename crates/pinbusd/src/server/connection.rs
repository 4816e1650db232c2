//! Per-client receive loop.
//!
//! Each accepted connection gets one receiver task owning the read half of
//! its socket. The receiver assembles fixed-size frames and submits them to
//! the registry; the actor owns the write half and does all the sending.
//! The receiver's exit is the only thing that ever deregisters a client.

use std::io;
use std::net::SocketAddr;

use tokio::io::AsyncReadExt;
use tokio::net::tcp::OwnedReadHalf;
use tracing::{debug, info, warn};

use pinbus_protocol::{PinState, FRAME_LEN};

use crate::registry::{ClientId, LeaveReason, RegistryError, RegistryHandle, UpdateSource};

/// Receive loop for one registered client.
pub struct ClientReceiver {
    client_id: ClientId,
    peer: SocketAddr,
    reader: OwnedReadHalf,
    registry: RegistryHandle,
}

impl ClientReceiver {
    pub fn new(
        client_id: ClientId,
        peer: SocketAddr,
        reader: OwnedReadHalf,
        registry: RegistryHandle,
    ) -> Self {
        Self {
            client_id,
            peer,
            reader,
            registry,
        }
    }

    /// Runs until the peer disconnects or reading fails, then deregisters.
    pub async fn run(mut self) {
        debug!(client_id = %self.client_id, peer = %self.peer, "Receiver started");

        let reason = loop {
            let mut frame = [0u8; FRAME_LEN];

            // read_exact accumulates across fragmented deliveries. A close
            // mid-frame surfaces as UnexpectedEof and the partial bytes are
            // discarded without ever reaching the registry.
            match self.reader.read_exact(&mut frame).await {
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    break LeaveReason::Disconnected;
                }
                Err(e) => {
                    warn!(client_id = %self.client_id, error = %e, "Receive failed");
                    break LeaveReason::ReadFailed;
                }
            }

            let state = PinState::from_frame(&frame);
            match self
                .registry
                .submit(state, UpdateSource::Client(self.client_id))
                .await
            {
                Ok(()) => {}
                Err(RegistryError::ChannelClosed) => {
                    debug!(client_id = %self.client_id, "Registry gone, closing receiver");
                    return;
                }
                Err(e) => {
                    // The update was rejected; the connection stays up and
                    // the loop keeps reading.
                    warn!(client_id = %self.client_id, error = %e, "Update rejected");
                }
            }
        };

        if let Err(e) = self.registry.deregister(self.client_id, reason).await {
            debug!(client_id = %self.client_id, error = %e, "Deregister failed");
        }

        info!(
            client_id = %self.client_id,
            peer = %self.peer,
            reason = %reason,
            "Client disconnected"
        );
    }
}

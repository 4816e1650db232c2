//! Registry actor implementation.
//!
//! The actor is the single owner of everything the broadcast path touches:
//! the store file, the in-memory state, and the write half of every client
//! socket. Commands are processed strictly in arrival order, so persistence,
//! roster changes, and dispatch never interleave and every client observes
//! the same sequence of frames.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::{broadcast, mpsc};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use pinbus_protocol::{PinState, FRAME_LEN};

use super::commands::{
    ClientId, LeaveReason, RegistryCommand, RegistryError, StateEvent, UpdateSource,
};
use crate::store::StateStore;

/// Upper bound on a single client write during dispatch.
///
/// A peer that stops draining its socket would otherwise block the actor,
/// and with it every other client. A timed-out write counts as an ordinary
/// send failure: logged, swallowed, client kept.
const WRITE_TIMEOUT: Duration = Duration::from_secs(1);

/// One registered connection. The write half lives here; the read half
/// stays with the client's receiver task.
struct ClientEntry {
    id: ClientId,
    addr: SocketAddr,
    writer: OwnedWriteHalf,
}

/// The registry actor. Single task, owns all mutable daemon state.
pub struct RegistryActor {
    /// Command receiver
    receiver: mpsc::Receiver<RegistryCommand>,

    /// Canonical on-disk copy of the state
    store: StateStore,

    /// Last accepted state; `None` until the store is first read or a
    /// client submits
    state: Option<PinState>,

    /// Registered connections, in registration order
    clients: Vec<ClientEntry>,

    /// Next id to hand out
    next_client_id: u64,

    /// Event publisher for subscribers (logging, tests)
    event_publisher: broadcast::Sender<StateEvent>,
}

impl RegistryActor {
    pub fn new(
        receiver: mpsc::Receiver<RegistryCommand>,
        store: StateStore,
        event_publisher: broadcast::Sender<StateEvent>,
    ) -> Self {
        Self {
            receiver,
            store,
            state: None,
            clients: Vec::new(),
            next_client_id: 0,
            event_publisher,
        }
    }

    /// Runs the actor until all command senders are dropped.
    pub async fn run(mut self) {
        info!(store = %self.store.path().display(), "Registry actor started");

        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd).await;
        }

        info!(
            remaining_clients = self.clients.len(),
            "Registry actor stopped"
        );
    }

    async fn handle_command(&mut self, cmd: RegistryCommand) {
        match cmd {
            RegistryCommand::Register {
                addr,
                writer,
                respond_to,
            } => {
                let client_id = self.handle_register(addr, writer).await;
                let _ = respond_to.send(client_id);
            }

            RegistryCommand::Deregister {
                client_id,
                reason,
                respond_to,
            } => {
                let result = self.handle_deregister(client_id, reason);
                let _ = respond_to.send(result);
            }

            RegistryCommand::Submit {
                state,
                source,
                respond_to,
            } => {
                let result = self.handle_submit(state, source).await;
                let _ = respond_to.send(result);
            }

            RegistryCommand::PollStore => {
                self.handle_poll_store().await;
            }

            RegistryCommand::GetState { respond_to } => {
                let _ = respond_to.send(self.state);
            }

            RegistryCommand::ClientCount { respond_to } => {
                let _ = respond_to.send(self.clients.len());
            }
        }
    }

    async fn handle_register(&mut self, addr: SocketAddr, writer: OwnedWriteHalf) -> ClientId {
        let client_id = ClientId::new(self.next_client_id);
        self.next_client_id += 1;

        self.clients.push(ClientEntry {
            id: client_id,
            addr,
            writer,
        });

        info!(
            client_id = %client_id,
            peer = %addr,
            total_clients = self.clients.len(),
            "Client registered"
        );

        // Best-effort snapshot of the current state. Sending happens inside
        // registration, before any later command runs, so the snapshot can
        // never arrive after a frame the same client is about to cause.
        if let Some(state) = self.state {
            if let Some(entry) = self.clients.last_mut() {
                if let Err(e) = send_frame(&mut entry.writer, &state.to_frame()).await {
                    debug!(
                        client_id = %client_id,
                        error = %e,
                        "Snapshot send failed, client stays registered"
                    );
                }
            }
        }

        let _ = self.event_publisher.send(StateEvent::ClientJoined {
            client_id,
            addr,
        });

        client_id
    }

    fn handle_deregister(
        &mut self,
        client_id: ClientId,
        reason: LeaveReason,
    ) -> Result<(), RegistryError> {
        let index = self
            .clients
            .iter()
            .position(|entry| entry.id == client_id)
            .ok_or(RegistryError::ClientNotFound(client_id))?;

        let entry = self.clients.remove(index);

        info!(
            client_id = %client_id,
            peer = %entry.addr,
            reason = %reason,
            remaining_clients = self.clients.len(),
            "Client deregistered"
        );

        let _ = self
            .event_publisher
            .send(StateEvent::ClientLeft { client_id, reason });

        Ok(())
    }

    async fn handle_submit(
        &mut self,
        state: PinState,
        source: UpdateSource,
    ) -> Result<(), RegistryError> {
        // Persist first. A state that cannot be stored is not accepted:
        // nothing is broadcast and the previous state stays current, so the
        // store and the last dispatched frame never disagree.
        self.store.save(state)?;
        self.state = Some(state);

        let frame = state.to_frame();
        let mut failed_sends = 0usize;

        for entry in &mut self.clients {
            if let Err(e) = send_frame(&mut entry.writer, &frame).await {
                // Send failures never evict. Only the read side of a
                // connection removes a client.
                debug!(
                    client_id = %entry.id,
                    error = %e,
                    "Broadcast send failed"
                );
                failed_sends += 1;
            }
        }

        debug!(
            state = %state,
            source = %source,
            clients = self.clients.len(),
            failed_sends,
            "State updated"
        );

        let _ = self
            .event_publisher
            .send(StateEvent::Updated { state, source });

        Ok(())
    }

    async fn handle_poll_store(&mut self) {
        let loaded = match self.store.load() {
            Ok(loaded) => loaded,
            Err(e) => {
                // Skip this cycle; the observer polls again shortly.
                warn!(error = %e, "Store poll failed");
                return;
            }
        };

        match loaded {
            Some(state) if self.state != Some(state) => {
                debug!(state = %state, "External store change detected");
                // External changes take the same path as client updates.
                // Re-persisting normalizes the delimiter before the frame
                // goes out.
                if let Err(e) = self.handle_submit(state, UpdateSource::Store).await {
                    warn!(error = %e, "Failed to apply external store change");
                }
            }
            // Unchanged content, or the file does not exist yet.
            Some(_) | None => {}
        }
    }

    #[cfg(test)]
    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    #[cfg(test)]
    pub fn client_ids(&self) -> Vec<ClientId> {
        self.clients.iter().map(|entry| entry.id).collect()
    }

    #[cfg(test)]
    pub fn current_state(&self) -> Option<PinState> {
        self.state
    }
}

/// Writes one frame with [`WRITE_TIMEOUT`] applied.
async fn send_frame(writer: &mut OwnedWriteHalf, frame: &[u8; FRAME_LEN]) -> io::Result<()> {
    match timeout(WRITE_TIMEOUT, writer.write_all(frame)).await {
        Ok(result) => result,
        Err(_) => Err(io::Error::new(
            io::ErrorKind::TimedOut,
            "client write timed out",
        )),
    }
}

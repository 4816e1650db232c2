//! Cheap-to-clone handle for talking to the registry actor.
//!
//! Every component holds one of these instead of the actor itself: the
//! accept loop registers through it, receiver tasks submit and deregister
//! through it, and the file observer triggers polls through it.

use std::net::SocketAddr;

use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::{broadcast, mpsc, oneshot};

use pinbus_protocol::PinState;

use super::commands::{
    ClientId, LeaveReason, RegistryCommand, RegistryError, StateEvent, UpdateSource,
};

/// Handle to the registry actor.
#[derive(Clone)]
pub struct RegistryHandle {
    sender: mpsc::Sender<RegistryCommand>,
    event_sender: broadcast::Sender<StateEvent>,
}

impl RegistryHandle {
    pub fn new(
        sender: mpsc::Sender<RegistryCommand>,
        event_sender: broadcast::Sender<StateEvent>,
    ) -> Self {
        Self {
            sender,
            event_sender,
        }
    }

    /// Registers a connection, handing its write half to the actor.
    ///
    /// When this returns the client is in the roster and the snapshot, if
    /// any, has been sent. Callers start the connection's receiver only
    /// after this completes.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::ChannelClosed`] if the actor is gone.
    pub async fn register(
        &self,
        addr: SocketAddr,
        writer: OwnedWriteHalf,
    ) -> Result<ClientId, RegistryError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(RegistryCommand::Register {
                addr,
                writer,
                respond_to: tx,
            })
            .await
            .map_err(|_| RegistryError::ChannelClosed)?;
        rx.await.map_err(|_| RegistryError::ChannelClosed)
    }

    /// Removes a client from the roster.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::ClientNotFound`] for an unknown id, or
    /// [`RegistryError::ChannelClosed`] if the actor is gone.
    pub async fn deregister(
        &self,
        client_id: ClientId,
        reason: LeaveReason,
    ) -> Result<(), RegistryError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(RegistryCommand::Deregister {
                client_id,
                reason,
                respond_to: tx,
            })
            .await
            .map_err(|_| RegistryError::ChannelClosed)?;
        rx.await.map_err(|_| RegistryError::ChannelClosed)?
    }

    /// Submits a replacement state: persisted first, then dispatched to
    /// every registered client.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Store`] if persisting failed (the update
    /// was not applied), or [`RegistryError::ChannelClosed`] if the actor
    /// is gone.
    pub async fn submit(&self, state: PinState, source: UpdateSource) -> Result<(), RegistryError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(RegistryCommand::Submit {
                state,
                source,
                respond_to: tx,
            })
            .await
            .map_err(|_| RegistryError::ChannelClosed)?;
        rx.await.map_err(|_| RegistryError::ChannelClosed)?
    }

    /// Asks the actor to re-read the store file. Fire-and-forget.
    pub async fn poll_store(&self) {
        let _ = self.sender.send(RegistryCommand::PollStore).await;
    }

    /// The current state, or `None` if nothing has been loaded or
    /// submitted yet. Also `None` if the actor is gone.
    pub async fn current_state(&self) -> Option<PinState> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(RegistryCommand::GetState { respond_to: tx })
            .await
            .ok()?;
        rx.await.ok()?
    }

    /// Number of registered clients. Zero if the actor is gone.
    pub async fn client_count(&self) -> usize {
        let (tx, rx) = oneshot::channel();
        if self
            .sender
            .send(RegistryCommand::ClientCount { respond_to: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }

    /// Subscribes to actor events.
    pub fn subscribe(&self) -> broadcast::Receiver<StateEvent> {
        self.event_sender.subscribe()
    }

    /// Whether the actor is still accepting commands.
    pub fn is_connected(&self) -> bool {
        !self.sender.is_closed()
    }
}

//! Command and event types for the registry actor.
//!
//! Commands flow into the actor through an mpsc channel; request/response
//! commands carry a oneshot sender for the reply. Events flow out on a
//! broadcast channel so logging and tests can watch the actor without
//! sitting in its command path.

use std::fmt;
use std::net::SocketAddr;

use thiserror::Error;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::oneshot;

use pinbus_protocol::PinState;

use crate::store::StoreError;

// ============================================================================
// Identifiers
// ============================================================================

/// Identifier the actor assigns to each registered connection.
///
/// Ids are handed out sequentially and never reused within one daemon run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(u64);

impl ClientId {
    pub(crate) fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Commands
// ============================================================================

/// Commands accepted by the registry actor.
#[derive(Debug)]
pub enum RegistryCommand {
    /// Register a new connection.
    ///
    /// The actor takes ownership of the write half, appends the client to
    /// the roster, and sends it a best-effort snapshot of the current state
    /// before replying with the assigned id.
    Register {
        addr: SocketAddr,
        writer: OwnedWriteHalf,
        respond_to: oneshot::Sender<ClientId>,
    },

    /// Remove a connection from the roster.
    ///
    /// Issued only by a client's receiver task when its read loop ends.
    ///
    /// # Errors
    ///
    /// Responds with [`RegistryError::ClientNotFound`] if the id is not
    /// registered.
    Deregister {
        client_id: ClientId,
        reason: LeaveReason,
        respond_to: oneshot::Sender<Result<(), RegistryError>>,
    },

    /// Apply a replacement state: persist it, then send the frame to every
    /// registered client, the originator included.
    ///
    /// # Errors
    ///
    /// Responds with [`RegistryError::Store`] if persisting fails, in which
    /// case nothing is broadcast and the previous state stays current.
    Submit {
        state: PinState,
        source: UpdateSource,
        respond_to: oneshot::Sender<Result<(), RegistryError>>,
    },

    /// Re-read the store file and, if its content differs from the current
    /// state, apply it like a submitted update. Fire-and-forget; poll
    /// failures are logged and skipped.
    PollStore,

    /// Get the current in-memory state, `None` if nothing has been loaded
    /// or submitted yet.
    GetState {
        respond_to: oneshot::Sender<Option<PinState>>,
    },

    /// Get the number of registered clients.
    ClientCount { respond_to: oneshot::Sender<usize> },
}

// ============================================================================
// Errors
// ============================================================================

/// Errors returned by registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The requested client is not in the roster.
    #[error("client not found: {0}")]
    ClientNotFound(ClientId),

    /// Persisting an update failed; the update was not applied.
    #[error("state not persisted: {0}")]
    Store(#[from] StoreError),

    /// The command or response channel closed; the actor has shut down.
    #[error("registry channel closed")]
    ChannelClosed,
}

// ============================================================================
// Events
// ============================================================================

/// Events published by the actor for subscribers (logging, tests).
#[derive(Debug, Clone)]
pub enum StateEvent {
    /// An update was accepted: persisted and dispatched to every client.
    Updated {
        state: PinState,
        source: UpdateSource,
    },

    /// A connection was registered.
    ClientJoined {
        client_id: ClientId,
        addr: SocketAddr,
    },

    /// A connection was deregistered.
    ClientLeft {
        client_id: ClientId,
        reason: LeaveReason,
    },
}

/// Where an update came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateSource {
    /// A connected client sent a frame.
    Client(ClientId),

    /// The file observer found an externally written store.
    Store,
}

impl fmt::Display for UpdateSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpdateSource::Client(id) => write!(f, "client {id}"),
            UpdateSource::Store => write!(f, "store file"),
        }
    }
}

/// Why a client left the roster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaveReason {
    /// The peer closed the connection, possibly mid-frame.
    Disconnected,

    /// Receiving failed with an error other than end-of-stream.
    ReadFailed,
}

impl fmt::Display for LeaveReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LeaveReason::Disconnected => write!(f, "peer disconnected"),
            LeaveReason::ReadFailed => write!(f, "read failed"),
        }
    }
}

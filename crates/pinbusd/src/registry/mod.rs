//! Pin-state registry using the actor pattern.
//!
//! A single actor task owns the store file, the in-memory state, and the
//! write half of every client socket. Everything else talks to it through
//! message passing:
//!
//! ```text
//! ┌───────────────┐                  ┌──────────────────────┐
//! │  Accept loop  │── Register ─────▶│                      │
//! ├───────────────┤                  │    RegistryActor     │── frames ──▶ client
//! │   Receivers   │── Submit ───────▶│                      │              sockets
//! │               │── Deregister ───▶│  store + state +     │
//! ├───────────────┤                  │  client roster       │
//! │ File observer │── PollStore ────▶│                      │
//! └───────────────┘                  └──────────┬───────────┘
//!         (mpsc commands)                       │ StateEvent (broadcast)
//!                                               ▼
//!                                        logging and tests
//! ```
//!
//! Because the command queue is processed strictly in order, updates are
//! fully serialized: persist, then dispatch, with no interleaving. Every
//! client observes the same sequence of frames.

use tokio::sync::{broadcast, mpsc};

mod actor;
mod commands;
mod handle;

pub use actor::RegistryActor;
pub use commands::{
    ClientId, LeaveReason, RegistryCommand, RegistryError, StateEvent, UpdateSource,
};
pub use handle::RegistryHandle;

use crate::store::StateStore;

/// Command channel buffer. Senders back off when the actor falls this far
/// behind.
const COMMAND_BUFFER: usize = 100;

/// Event channel buffer. Slow subscribers miss events rather than blocking
/// the actor.
const EVENT_BUFFER: usize = 100;

/// Spawns the registry actor and returns a handle to it.
///
/// The actor runs until every handle clone is dropped.
pub fn spawn_registry(store: StateStore) -> RegistryHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);
    let (event_tx, _) = broadcast::channel(EVENT_BUFFER);

    let actor = RegistryActor::new(cmd_rx, store, event_tx.clone());
    tokio::spawn(actor.run());

    RegistryHandle::new(cmd_tx, event_tx)
}

//! pinbus daemon library.
//!
//! pinbusd keeps a four-pin binary state synchronized between a small text
//! file and every TCP client currently connected. Any client may replace
//! the whole state; any external process may rewrite the file; either way
//! the new state is persisted and then broadcast to everyone.
//!
//! # Architecture
//!
//! ```text
//!                       ┌───────────────────────────────┐
//!   TCP clients ───────▶│  BusServer (accept loop)      │
//!                       └───────────────┬───────────────┘
//!                                       │ Register / spawn
//!                                       ▼
//!   ┌────────────────┐  Submit   ┌───────────────────────────────┐
//!   │ ClientReceiver │──────────▶│  RegistryActor                │
//!   │ (one per conn) │ Deregister│  - persisted store (file)     │
//!   └────────────────┘           │  - current state              │
//!                                │  - client write halves        │
//!   ┌────────────────┐ PollStore └───────────────┬───────────────┘
//!   │ File observer  │──────────▶                │ frames
//!   └────────────────┘                           ▼
//!                                         all connected clients
//! ```
//!
//! All mutable state lives inside the registry actor; the server, the
//! receivers, and the observer only hold a [`registry::RegistryHandle`].

pub mod config;
pub mod observer;
pub mod registry;
pub mod server;
pub mod store;

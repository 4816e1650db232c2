//! pinbus protocol - the frame format shared by the daemon and its clients.
//!
//! The whole protocol is a single fixed-size unit: a [`PinState`] of four
//! symbol bytes followed by one delimiter byte. Every connection carries
//! nothing but these frames, in both directions, and the daemon's store
//! file holds exactly one of them.

pub mod frame;

pub use frame::{FrameError, PinState, DELIM, FRAME_LEN, PIN_COUNT};

/// Well-known TCP port of the pinbus daemon.
pub const DEFAULT_PORT: u16 = 55667;

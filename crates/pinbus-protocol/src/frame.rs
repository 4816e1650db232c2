//! Pin state and frame encoding.
//!
//! A frame is always [`FRAME_LEN`] bytes: [`PIN_COUNT`] symbol bytes and a
//! trailing delimiter slot. Receivers count bytes rather than scanning for
//! the delimiter, so the slot's content is never inspected on the way in;
//! on the way out it is always the canonical [`DELIM`].

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Number of pins carried in every state.
pub const PIN_COUNT: usize = 4;

/// Canonical delimiter byte appended to every outgoing frame.
pub const DELIM: u8 = b'\n';

/// Total size of one wire frame: the symbols plus the delimiter slot.
pub const FRAME_LEN: usize = PIN_COUNT + 1;

/// The state of all pins, one symbol byte per pin.
///
/// Symbols are nominally `'0'` and `'1'`, but the engine treats them as
/// opaque bytes: whatever a client or the store file supplies is carried
/// through persistence and broadcast unchanged. Use [`PinState::parse_strict`]
/// (or the [`FromStr`] impl) where only binary digits are acceptable, such
/// as operator-typed input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PinState([u8; PIN_COUNT]);

impl PinState {
    /// Extracts the state from a complete wire frame.
    ///
    /// The delimiter slot is ignored; a fixed-length read has already
    /// established the frame boundary.
    pub fn from_frame(frame: &[u8; FRAME_LEN]) -> Self {
        let mut symbols = [0u8; PIN_COUNT];
        symbols.copy_from_slice(&frame[..PIN_COUNT]);
        Self(symbols)
    }

    /// Parses a state from raw bytes, tolerating any trailing run of
    /// `\n` and `\r` bytes.
    ///
    /// This is the store-file reading rule: `"1010\n"`, `"1010\r\n"`,
    /// `"1010"` and `"1010\n\n"` all decode to the same state. Leading or
    /// embedded junk is not tolerated.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::WrongLength`] if anything other than exactly
    /// [`PIN_COUNT`] bytes remains after trimming.
    pub fn parse(bytes: &[u8]) -> Result<Self, FrameError> {
        let mut end = bytes.len();
        while end > 0 && (bytes[end - 1] == b'\n' || bytes[end - 1] == b'\r') {
            end -= 1;
        }
        let trimmed = &bytes[..end];
        if trimmed.len() != PIN_COUNT {
            return Err(FrameError::WrongLength { len: trimmed.len() });
        }
        let mut symbols = [0u8; PIN_COUNT];
        symbols.copy_from_slice(trimmed);
        Ok(Self(symbols))
    }

    /// Parses a state accepting only the digits `'0'` and `'1'`.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::WrongLength`] for anything but [`PIN_COUNT`]
    /// bytes, or [`FrameError::NonBinarySymbol`] naming the first offending
    /// position.
    pub fn parse_strict(text: &str) -> Result<Self, FrameError> {
        let bytes = text.as_bytes();
        if bytes.len() != PIN_COUNT {
            return Err(FrameError::WrongLength { len: bytes.len() });
        }
        let mut symbols = [0u8; PIN_COUNT];
        for (index, &byte) in bytes.iter().enumerate() {
            if byte != b'0' && byte != b'1' {
                return Err(FrameError::NonBinarySymbol { index, byte });
            }
            symbols[index] = byte;
        }
        Ok(Self(symbols))
    }

    /// Encodes the canonical wire frame: the symbols plus [`DELIM`].
    pub fn to_frame(&self) -> [u8; FRAME_LEN] {
        let mut frame = [DELIM; FRAME_LEN];
        frame[..PIN_COUNT].copy_from_slice(&self.0);
        frame
    }

    /// The raw symbol bytes, without the delimiter.
    pub fn as_bytes(&self) -> &[u8; PIN_COUNT] {
        &self.0
    }

    /// The level of a single pin, or `None` if the index is out of range
    /// or the symbol at that position is not a binary digit.
    pub fn bit(&self, index: usize) -> Option<bool> {
        match self.0.get(index)? {
            b'0' => Some(false),
            b'1' => Some(true),
            _ => None,
        }
    }
}

impl fmt::Display for PinState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.escape_ascii())
    }
}

/// The strict form: only `'0'` and `'1'` are accepted.
impl FromStr for PinState {
    type Err = FrameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_strict(s)
    }
}

/// Errors from decoding a pin state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FrameError {
    /// The input did not contain exactly [`PIN_COUNT`] symbol bytes.
    #[error("state must be exactly 4 symbols, got {len}")]
    WrongLength { len: usize },

    /// Strict parsing found a byte other than `'0'` or `'1'`.
    #[error("symbol at position {index} is not '0' or '1': {byte:#04x}")]
    NonBinarySymbol { index: usize, byte: u8 },
}

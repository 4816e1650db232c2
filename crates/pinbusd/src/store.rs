//! Persisted pin-state store.
//!
//! The store is a small text file holding the current state followed by a
//! newline, e.g. `1010\n`. External processes are allowed to rewrite it at
//! any time, so reads tolerate both Unix and Windows line endings; writes
//! always produce the canonical frame encoding.
//!
//! Persistence is deliberately plain: one `write` syscall, no rename dance,
//! no fsync. A crash mid-write can leave a short file, which the next read
//! reports as malformed and the next save repairs.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use pinbus_protocol::{FrameError, PinState};

/// Canonical on-disk copy of the pin state.
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the store. `Ok(None)` means the file does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Read`] for any I/O failure other than the file
    /// being absent, and [`StoreError::Malformed`] if the content does not
    /// decode to a pin state.
    pub fn load(&self) -> Result<Option<PinState>, StoreError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(StoreError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        let state = PinState::parse(&bytes).map_err(|source| StoreError::Malformed {
            path: self.path.clone(),
            source,
        })?;

        Ok(Some(state))
    }

    /// Overwrites the store with the canonical frame encoding of `state`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Write`] if the file cannot be written.
    pub fn save(&self, state: PinState) -> Result<(), StoreError> {
        fs::write(&self.path, state.to_frame()).map_err(|source| StoreError::Write {
            path: self.path.clone(),
            source,
        })
    }
}

/// Errors from reading or writing the state file.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read state file {path}: {source}")]
    Read { path: PathBuf, source: io::Error },

    #[error("failed to write state file {path}: {source}")]
    Write { path: PathBuf, source: io::Error },

    #[error("malformed state file {path}: {source}")]
    Malformed { path: PathBuf, source: FrameError },
}

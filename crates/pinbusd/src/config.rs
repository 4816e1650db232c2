//! Daemon configuration.

use std::env;
use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

pub use pinbus_protocol::DEFAULT_PORT;

use crate::observer::DEFAULT_POLL_INTERVAL;

/// Default name of the persisted state file, relative to the working
/// directory the daemon was started from.
pub const DEFAULT_STORE_FILE: &str = "port_pins";

/// Runtime configuration for the daemon.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    /// Address the TCP listener binds.
    pub listen: SocketAddr,

    /// Path of the persisted state file.
    pub store_path: PathBuf,

    /// Delay between store polls.
    pub poll_interval: Duration,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_PORT)),
            store_path: PathBuf::from(DEFAULT_STORE_FILE),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl DaemonConfig {
    /// Resolves a relative store path against the current working directory.
    ///
    /// Must run before anything changes the working directory. Daemonizing
    /// chdirs to `/`, which would silently retarget a relative path.
    ///
    /// # Errors
    ///
    /// Returns an error if the current working directory cannot be read.
    pub fn absolutize_store_path(&mut self) -> io::Result<()> {
        if self.store_path.is_relative() {
            self.store_path = env::current_dir()?.join(&self.store_path);
        }
        Ok(())
    }
}

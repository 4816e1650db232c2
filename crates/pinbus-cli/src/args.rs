//! Command-line interface definition.

use std::net::{Ipv4Addr, SocketAddr};

use clap::{Parser, Subcommand};

use pinbus_protocol::{PinState, DEFAULT_PORT};

#[derive(Parser, Debug)]
#[command(name = "pinbus", version, about = "Command-line client for the pinbus daemon")]
pub struct Args {
    /// Daemon address to connect to
    #[arg(long, default_value_t = SocketAddr::from((Ipv4Addr::LOCALHOST, DEFAULT_PORT)))]
    pub addr: SocketAddr,

    /// Seconds to wait for a response before giving up
    #[arg(long, default_value_t = 5)]
    pub wait: u64,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Print the current pin state and exit
    Get,

    /// Print the current state, then every update as it is broadcast
    Watch,

    /// Replace the pin state
    Set {
        /// New state: four binary digits, e.g. 1010
        state: PinState,
    },
}

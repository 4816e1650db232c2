//! pinbus command-line client.
//!
//! Three small operations over one TCP connection to the daemon:
//!
//! - `get`: print the snapshot the daemon sends on connect
//! - `watch`: print the snapshot and then every broadcast as it arrives
//! - `set`: send a replacement state and wait for the daemon to echo it
//!
//! The operations fail fast. There is no reconnection: scripts retry, and
//! interactive users just rerun the command.

pub mod args;
pub mod client;

pub use args::{Args, Command};

use std::time::Duration;

use anyhow::Result;

/// Runs the parsed command to completion.
///
/// # Errors
///
/// Returns whatever the underlying operation reports: connection failures,
/// timeouts, or the daemon closing the connection early.
pub async fn run(args: Args) -> Result<()> {
    let wait = Duration::from_secs(args.wait);

    match args.command {
        Command::Get => {
            let state = client::fetch_state(args.addr, wait).await?;
            println!("{state}");
        }
        Command::Watch => {
            client::watch(args.addr, |state| println!("{state}")).await?;
        }
        Command::Set { state } => {
            client::set_state(args.addr, state, wait).await?;
            println!("{state}");
        }
    }

    Ok(())
}

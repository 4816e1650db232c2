//! pinbus - command-line client for the pinbus daemon.
//!
//! ```text
//! pinbus get                   print the current state
//! pinbus watch                 stream every state change
//! pinbus set 1010              replace the state
//! pinbus --addr host:port ...  talk to a remote daemon
//! ```

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use pinbus_cli::{run, Args};

#[tokio::main]
async fn main() -> Result<()> {
    // Data goes to stdout; diagnostics go to stderr, silent unless RUST_LOG
    // enables them.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    run(Args::parse()).await
}

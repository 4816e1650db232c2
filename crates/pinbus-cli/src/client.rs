//! Client operations against a running daemon.
//!
//! The daemon speaks nothing but fixed-size frames, so every operation here
//! is a thin loop over [`PinState`] reads and at most one write.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

use pinbus_protocol::{PinState, FRAME_LEN};

async fn connect(addr: SocketAddr) -> Result<TcpStream> {
    let stream = TcpStream::connect(addr)
        .await
        .with_context(|| format!("failed to connect to pinbus daemon at {addr}"))?;
    debug!(addr = %addr, "Connected");
    Ok(stream)
}

/// Reads one frame. `Ok(None)` means the server closed the connection.
async fn read_frame(stream: &mut TcpStream) -> io::Result<Option<PinState>> {
    let mut frame = [0u8; FRAME_LEN];
    match stream.read_exact(&mut frame).await {
        Ok(_) => Ok(Some(PinState::from_frame(&frame))),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(None),
        Err(e) => Err(e),
    }
}

/// Connects and returns the snapshot the daemon sends to new clients.
///
/// # Errors
///
/// Fails if the connection cannot be made, if nothing arrives within
/// `wait` (a daemon that has no state yet sends no snapshot), or if the
/// server closes the connection first.
pub async fn fetch_state(addr: SocketAddr, wait: Duration) -> Result<PinState> {
    let mut stream = connect(addr).await?;

    let received = timeout(wait, read_frame(&mut stream))
        .await
        .map_err(|_| {
            anyhow!(
                "no state within {}s; the daemon may hold no state yet",
                wait.as_secs()
            )
        })?
        .context("failed to read state")?;

    received.ok_or_else(|| anyhow!("connection closed before a state arrived"))
}

/// Connects and invokes `on_state` for the snapshot and every subsequent
/// broadcast, until the server closes the connection.
///
/// # Errors
///
/// Fails on connection or read errors. A server-side close is a normal
/// return, not an error.
pub async fn watch(addr: SocketAddr, mut on_state: impl FnMut(PinState)) -> Result<()> {
    let mut stream = connect(addr).await?;

    while let Some(state) = read_frame(&mut stream)
        .await
        .context("failed to read state")?
    {
        on_state(state);
    }

    debug!("Server closed the connection");
    Ok(())
}

/// Sends a replacement state and waits for the daemon to echo it back.
///
/// The daemon answers every accepted update with the authoritative frame,
/// to the sender too. Frames received before the echo (the connect
/// snapshot, or concurrent updates from other clients) are skipped.
///
/// # Errors
///
/// Fails if the connection cannot be made, the write fails, or the echo
/// does not arrive within `wait`.
pub async fn set_state(addr: SocketAddr, state: PinState, wait: Duration) -> Result<()> {
    let mut stream = connect(addr).await?;

    stream
        .write_all(&state.to_frame())
        .await
        .context("failed to send state")?;

    timeout(wait, wait_for_echo(&mut stream, state))
        .await
        .map_err(|_| anyhow!("state sent but not confirmed within {}s", wait.as_secs()))?
}

async fn wait_for_echo(stream: &mut TcpStream, expected: PinState) -> Result<()> {
    loop {
        match read_frame(stream)
            .await
            .context("failed to read confirmation")?
        {
            Some(received) if received == expected => return Ok(()),
            Some(other) => {
                debug!(state = %other, "Skipping frame while waiting for confirmation");
            }
            None => bail!("connection closed before the update was confirmed"),
        }
    }
}

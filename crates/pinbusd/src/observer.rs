//! Store polling task.
//!
//! External processes communicate with the daemon by rewriting the store
//! file; the observer is how those writes reach connected clients. Every
//! tick it asks the registry actor to re-read the store, and the actor
//! applies any change through the same serialized path client updates take.
//! There is no change notification, just a fixed-interval poll.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::registry::RegistryHandle;

/// Default delay between store polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Spawns the store polling task.
///
/// The first poll fires immediately, which is also what loads an existing
/// store file into the in-memory state at startup. The task runs until the
/// cancellation token fires or the registry actor goes away.
///
/// # Panics
///
/// Panics if `poll_interval` is zero; the ticker needs a non-zero period.
pub fn spawn_observer(
    registry: RegistryHandle,
    poll_interval: Duration,
    cancel_token: CancellationToken,
) -> JoinHandle<()> {
    // Built before the spawn so a zero interval fails in the caller
    // instead of inside the detached task.
    let mut tick = interval(poll_interval);

    tokio::spawn(async move {
        info!(
            interval_ms = poll_interval.as_millis() as u64,
            "File observer started"
        );

        loop {
            tokio::select! {
                biased;

                _ = cancel_token.cancelled() => {
                    info!("File observer shutting down");
                    break;
                }

                _ = tick.tick() => {
                    if !registry.is_connected() {
                        debug!("File observer stopping, registry gone");
                        break;
                    }
                    registry.poll_store().await;
                }
            }
        }
    })
}

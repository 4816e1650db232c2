//! End-to-end tests: the client operations against a real daemon stack.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use pinbus_cli::client;
use pinbus_protocol::PinState;
use pinbusd::registry::spawn_registry;
use pinbusd::server::BusServer;
use pinbusd::store::StateStore;

const WAIT: Duration = Duration::from_secs(1);

struct TestDaemon {
    addr: SocketAddr,
    cancel_token: CancellationToken,
    _temp_dir: tempfile::TempDir,
}

impl TestDaemon {
    async fn spawn() -> Self {
        let temp_dir = tempfile::tempdir().expect("failed to create temp dir");
        let registry = spawn_registry(StateStore::new(temp_dir.path().join("port_pins")));
        let cancel_token = CancellationToken::new();

        let server = BusServer::bind(
            "127.0.0.1:0".parse().expect("valid loopback addr"),
            registry,
            cancel_token.clone(),
        )
        .expect("failed to bind test daemon");
        let addr = server.local_addr();

        tokio::spawn(async move { server.run().await });

        Self {
            addr,
            cancel_token,
            _temp_dir: temp_dir,
        }
    }
}

impl Drop for TestDaemon {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

fn state(bits: &str) -> PinState {
    PinState::parse(bits.as_bytes()).expect("valid test state")
}

#[tokio::test]
async fn test_get_fails_while_daemon_has_no_state() {
    let daemon = TestDaemon::spawn().await;

    let result = client::fetch_state(daemon.addr, Duration::from_millis(200)).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_set_then_get() {
    let daemon = TestDaemon::spawn().await;

    client::set_state(daemon.addr, state("1010"), WAIT)
        .await
        .unwrap();

    let fetched = client::fetch_state(daemon.addr, WAIT).await.unwrap();
    assert_eq!(fetched, state("1010"));
}

#[tokio::test]
async fn test_set_confirms_despite_snapshot() {
    let daemon = TestDaemon::spawn().await;

    client::set_state(daemon.addr, state("0000"), WAIT)
        .await
        .unwrap();

    // The second set receives the 0000 snapshot before its own echo and
    // must skip past it.
    client::set_state(daemon.addr, state("1111"), WAIT)
        .await
        .unwrap();

    let fetched = client::fetch_state(daemon.addr, WAIT).await.unwrap();
    assert_eq!(fetched, state("1111"));
}

#[tokio::test]
async fn test_watch_sees_other_clients_updates() {
    let daemon = TestDaemon::spawn().await;

    client::set_state(daemon.addr, state("0000"), WAIT)
        .await
        .unwrap();

    let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
    let addr = daemon.addr;
    let watcher = tokio::spawn(async move {
        client::watch(addr, move |update| {
            let _ = seen_tx.send(update);
        })
        .await
    });

    let first = timeout(WAIT, seen_rx.recv()).await.unwrap().unwrap();
    assert_eq!(first, state("0000"));

    client::set_state(daemon.addr, state("0101"), WAIT)
        .await
        .unwrap();

    let second = timeout(WAIT, seen_rx.recv()).await.unwrap().unwrap();
    assert_eq!(second, state("0101"));

    watcher.abort();
}

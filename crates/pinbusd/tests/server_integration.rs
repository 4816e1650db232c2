//! Integration tests for the full TCP path: accept, register, snapshot,
//! receive, broadcast, disconnect. Real sockets on loopback, real store
//! files under a temp directory.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

use pinbus_protocol::{PinState, FRAME_LEN};
use pinbusd::registry::{spawn_registry, RegistryHandle};
use pinbusd::server::BusServer;
use pinbusd::store::StateStore;

// ============================================================================
// Test Constants
// ============================================================================

const RECV_TIMEOUT: Duration = Duration::from_secs(1);
const QUIESCE_PERIOD: Duration = Duration::from_millis(50);
const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_millis(100);

// ============================================================================
// Test Helpers
// ============================================================================

struct TestServer {
    addr: SocketAddr,
    registry: RegistryHandle,
    store_path: PathBuf,
    cancel_token: CancellationToken,
    _temp_dir: tempfile::TempDir,
}

impl TestServer {
    async fn spawn() -> Self {
        let temp_dir = tempfile::tempdir().expect("failed to create temp dir");
        let store_path = temp_dir.path().join("port_pins");
        let registry = spawn_registry(StateStore::new(&store_path));
        let cancel_token = CancellationToken::new();

        let server = BusServer::bind(
            "127.0.0.1:0".parse().expect("valid loopback addr"),
            registry.clone(),
            cancel_token.clone(),
        )
        .expect("failed to bind test server");
        let addr = server.local_addr();

        tokio::spawn(async move { server.run().await });

        Self {
            addr,
            registry,
            store_path,
            cancel_token,
            _temp_dir: temp_dir,
        }
    }

    async fn connect(&self) -> TestClient {
        let stream = TcpStream::connect(self.addr)
            .await
            .expect("failed to connect to test server");
        TestClient { stream }
    }

    fn store_contents(&self) -> Option<Vec<u8>> {
        std::fs::read(&self.store_path).ok()
    }

    async fn shutdown(self) {
        self.cancel_token.cancel();
        sleep(SHUTDOWN_GRACE_PERIOD).await;
    }
}

struct TestClient {
    stream: TcpStream,
}

impl TestClient {
    async fn send_state(&mut self, bits: &str) {
        let mut frame = Vec::from(bits.as_bytes());
        frame.push(b'\n');
        self.stream
            .write_all(&frame)
            .await
            .expect("failed to send frame");
    }

    async fn send_raw(&mut self, bytes: &[u8]) {
        self.stream
            .write_all(bytes)
            .await
            .expect("failed to send bytes");
    }

    async fn recv_state(&mut self) -> PinState {
        let mut frame = [0u8; FRAME_LEN];
        timeout(RECV_TIMEOUT, self.stream.read_exact(&mut frame))
            .await
            .expect("timed out waiting for frame")
            .expect("failed to read frame");
        PinState::from_frame(&frame)
    }

    async fn expect_no_frame(&mut self) {
        let mut byte = [0u8; 1];
        let result = timeout(QUIESCE_PERIOD, self.stream.read_exact(&mut byte)).await;
        assert!(result.is_err(), "expected no data from server");
    }
}

/// Polls until the registry reports the expected number of clients.
async fn wait_for_clients(registry: &RegistryHandle, expected: usize) {
    let deadline = tokio::time::Instant::now() + RECV_TIMEOUT;
    loop {
        if registry.client_count().await == expected {
            return;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "client count never reached {expected}"
        );
        sleep(Duration::from_millis(10)).await;
    }
}

fn state(bits: &str) -> PinState {
    PinState::parse(bits.as_bytes()).expect("valid test state")
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_server_accepts_connections() {
    let server = TestServer::spawn().await;

    let _client = server.connect().await;
    wait_for_clients(&server.registry, 1).await;

    server.shutdown().await;
}

#[tokio::test]
async fn test_first_update_with_no_prior_state() {
    let server = TestServer::spawn().await;

    let mut sender = server.connect().await;
    let mut observer = server.connect().await;
    wait_for_clients(&server.registry, 2).await;

    // Nothing persisted yet, so neither connection got a snapshot and the
    // first frame each side sees is the update itself.
    assert!(server.store_contents().is_none());

    sender.send_state("1010").await;

    assert_eq!(observer.recv_state().await, state("1010"));
    assert_eq!(sender.recv_state().await, state("1010"));
    assert_eq!(server.store_contents().expect("store created"), b"1010\n");

    server.shutdown().await;
}

#[tokio::test]
async fn test_new_client_receives_snapshot() {
    let server = TestServer::spawn().await;

    let mut first = server.connect().await;
    wait_for_clients(&server.registry, 1).await;
    first.send_state("0110").await;
    assert_eq!(first.recv_state().await, state("0110"));

    let mut late = server.connect().await;
    assert_eq!(late.recv_state().await, state("0110"));

    server.shutdown().await;
}

#[tokio::test]
async fn test_update_echoes_to_sender() {
    let server = TestServer::spawn().await;

    let mut client = server.connect().await;
    wait_for_clients(&server.registry, 1).await;

    client.send_state("1000").await;
    assert_eq!(client.recv_state().await, state("1000"));

    client.send_state("0001").await;
    assert_eq!(client.recv_state().await, state("0001"));

    server.shutdown().await;
}

#[tokio::test]
async fn test_partial_frame_then_disconnect_removes_client() {
    let server = TestServer::spawn().await;

    let mut leaver = server.connect().await;
    let mut observer = server.connect().await;
    wait_for_clients(&server.registry, 2).await;

    // Two of five bytes, then gone mid-frame.
    leaver.send_raw(b"10").await;
    drop(leaver);

    wait_for_clients(&server.registry, 1).await;

    // The fragment was discarded: nothing dispatched, nothing persisted.
    observer.expect_no_frame().await;
    assert!(server.store_contents().is_none());

    server.shutdown().await;
}

#[tokio::test]
async fn test_disconnect_does_not_disturb_others() {
    let server = TestServer::spawn().await;

    let mut alpha = server.connect().await;
    let leaver = server.connect().await;
    let mut omega = server.connect().await;
    wait_for_clients(&server.registry, 3).await;

    drop(leaver);
    wait_for_clients(&server.registry, 2).await;

    alpha.send_state("0001").await;
    assert_eq!(omega.recv_state().await, state("0001"));
    assert_eq!(alpha.recv_state().await, state("0001"));

    server.shutdown().await;
}

#[tokio::test]
async fn test_fragmented_frame_is_assembled() {
    let server = TestServer::spawn().await;

    let mut sender = server.connect().await;
    let mut observer = server.connect().await;
    wait_for_clients(&server.registry, 2).await;

    sender.send_raw(b"11").await;
    sleep(Duration::from_millis(20)).await;
    sender.send_raw(b"00\n").await;

    assert_eq!(observer.recv_state().await, state("1100"));

    server.shutdown().await;
}

#[tokio::test]
async fn test_multiple_frames_in_one_write() {
    let server = TestServer::spawn().await;

    let mut sender = server.connect().await;
    let mut observer = server.connect().await;
    wait_for_clients(&server.registry, 2).await;

    sender.send_raw(b"1111\n0000\n").await;

    assert_eq!(observer.recv_state().await, state("1111"));
    assert_eq!(observer.recv_state().await, state("0000"));
    assert_eq!(server.store_contents().expect("store created"), b"0000\n");

    server.shutdown().await;
}

#[tokio::test]
async fn test_updates_arrive_in_submission_order() {
    let server = TestServer::spawn().await;

    let mut sender = server.connect().await;
    let mut observer = server.connect().await;
    wait_for_clients(&server.registry, 2).await;

    let sequence = ["1000", "0100", "0010", "0001"];
    for bits in sequence {
        sender.send_state(bits).await;
    }

    for bits in sequence {
        assert_eq!(observer.recv_state().await, state(bits));
        assert_eq!(sender.recv_state().await, state(bits));
    }

    server.shutdown().await;
}

#[tokio::test]
async fn test_state_survives_client_churn() {
    let server = TestServer::spawn().await;

    {
        let mut writer = server.connect().await;
        wait_for_clients(&server.registry, 1).await;
        writer.send_state("0110").await;
        assert_eq!(writer.recv_state().await, state("0110"));
    }
    wait_for_clients(&server.registry, 0).await;

    // A client arriving much later still gets the persisted state.
    let mut late = server.connect().await;
    assert_eq!(late.recv_state().await, state("0110"));

    server.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_stops_accepting() {
    let server = TestServer::spawn().await;
    let addr = server.addr;

    server.shutdown().await;

    assert!(TcpStream::connect(addr).await.is_err());
}

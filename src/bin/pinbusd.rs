//! pinbusd - the pinbus daemon.
//!
//! Binds the TCP port, spawns the registry actor and the file observer,
//! and runs until stopped. `start -d` forks into the background with a
//! pidfile under the user state directory; `stop` and `status` manage a
//! daemon started that way.

use std::fs;
use std::fs::File;
use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::process;
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use daemonize::Daemonize;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use pinbusd::config::DaemonConfig;
use pinbusd::observer::spawn_observer;
use pinbusd::registry::spawn_registry;
use pinbusd::server::BusServer;
use pinbusd::store::StateStore;

// ============================================================================
// CLI
// ============================================================================

#[derive(Parser)]
#[command(
    name = "pinbusd",
    version,
    about = "pinbus daemon - broadcasts a shared pin state over TCP"
)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Start the daemon (default)
    Start {
        /// Run in the background
        #[arg(short, long)]
        daemon: bool,

        /// Address to listen on
        #[arg(long)]
        listen: Option<SocketAddr>,

        /// Path of the persisted state file
        #[arg(long)]
        store: Option<PathBuf>,

        /// Milliseconds between store polls
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
        poll_ms: Option<u64>,
    },

    /// Stop a running daemon
    Stop,

    /// Show whether the daemon is running and accepting connections
    Status {
        /// Address the daemon was started with, if not the default
        #[arg(long)]
        listen: Option<SocketAddr>,
    },
}

// ============================================================================
// PID file management
// ============================================================================

fn daemon_state_dir() -> PathBuf {
    dirs::state_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("pinbus")
}

fn pid_file_path() -> PathBuf {
    daemon_state_dir().join("pinbusd.pid")
}

fn read_pid() -> Option<u32> {
    let content = fs::read_to_string(pid_file_path()).ok()?;
    content.trim().parse().ok()
}

fn write_pid() -> io::Result<()> {
    let path = pid_file_path();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&path, process::id().to_string())
}

fn remove_pid_file() {
    let _ = fs::remove_file(pid_file_path());
}

#[cfg(unix)]
fn is_process_running(pid: u32) -> bool {
    Path::new(&format!("/proc/{pid}")).exists()
}

#[cfg(not(unix))]
fn is_process_running(_pid: u32) -> bool {
    false
}

/// Checks the pidfile against a live process, clearing it if stale.
fn is_daemon_running() -> Option<u32> {
    let pid = read_pid()?;
    if is_process_running(pid) {
        Some(pid)
    } else {
        remove_pid_file();
        None
    }
}

// ============================================================================
// Daemon control
// ============================================================================

fn stop_daemon() -> Result<()> {
    let pid = match is_daemon_running() {
        Some(pid) => pid,
        None => {
            println!("pinbus daemon is not running");
            return Ok(());
        }
    };

    #[cfg(unix)]
    {
        let result = unsafe { libc::kill(pid as i32, libc::SIGTERM) };
        if result != 0 {
            bail!("failed to signal PID {pid}");
        }

        for _ in 0..50 {
            if !is_process_running(pid) {
                remove_pid_file();
                println!("pinbus daemon stopped");
                return Ok(());
            }
            thread::sleep(Duration::from_millis(100));
        }
        bail!("daemon (PID {pid}) did not stop within 5 seconds");
    }

    #[cfg(not(unix))]
    {
        bail!("stop is only supported on Unix");
    }
}

fn show_status(listen: Option<SocketAddr>) -> Result<()> {
    let pid = match is_daemon_running() {
        Some(pid) => pid,
        None => {
            println!("pinbus daemon is not running");
            return Ok(());
        }
    };
    println!("pinbus daemon is running (PID {pid})");

    let addr = probe_addr(listen.unwrap_or_else(|| DaemonConfig::default().listen));
    match std::net::TcpStream::connect_timeout(&addr, Duration::from_millis(500)) {
        Ok(_) => println!("Accepting connections on {addr}"),
        Err(e) => println!("Not accepting connections on {addr}: {e}"),
    }

    Ok(())
}

/// A wildcard bind address is probed via loopback.
fn probe_addr(listen: SocketAddr) -> SocketAddr {
    if listen.ip().is_unspecified() {
        SocketAddr::from((Ipv4Addr::LOCALHOST, listen.port()))
    } else {
        listen
    }
}

fn daemonize() -> Result<()> {
    let state_dir = daemon_state_dir();
    fs::create_dir_all(&state_dir).context("failed to create state directory")?;

    let stdout = File::create(state_dir.join("pinbusd.log"))
        .context("failed to create daemon log file")?;
    let stderr = File::create(state_dir.join("pinbusd.err"))
        .context("failed to create daemon error file")?;

    Daemonize::new()
        .working_directory("/")
        .stdout(stdout)
        .stderr(stderr)
        .start()
        .context("failed to daemonize")?;

    Ok(())
}

// ============================================================================
// Entry point
// ============================================================================

fn build_config(
    listen: Option<SocketAddr>,
    store: Option<PathBuf>,
    poll_ms: Option<u64>,
) -> DaemonConfig {
    let mut config = DaemonConfig::default();
    if let Some(listen) = listen {
        config.listen = listen;
    }
    if let Some(store) = store {
        config.store_path = store;
    }
    if let Some(poll_ms) = poll_ms {
        config.poll_interval = Duration::from_millis(poll_ms);
    }
    config
}

fn main() -> Result<()> {
    let args = Args::parse();

    match args.command.unwrap_or(Command::Start {
        daemon: false,
        listen: None,
        store: None,
        poll_ms: None,
    }) {
        Command::Start {
            daemon,
            listen,
            store,
            poll_ms,
        } => {
            if let Some(pid) = is_daemon_running() {
                println!("pinbus daemon is already running (PID {pid})");
                return Ok(());
            }

            let mut config = build_config(listen, store, poll_ms);
            // Resolve before daemonizing; the daemon chdirs to /.
            config
                .absolutize_store_path()
                .context("failed to resolve store path")?;

            if daemon {
                daemonize()?;
            }

            write_pid().context("failed to write PID file")?;
            let result = run_daemon(config);
            remove_pid_file();
            result
        }
        Command::Stop => stop_daemon(),
        Command::Status { listen } => show_status(listen),
    }
}

// ============================================================================
// Daemon runtime
// ============================================================================

#[tokio::main]
async fn run_daemon(config: DaemonConfig) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("pinbusd=info".parse()?))
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = process::id(),
        "pinbus daemon starting"
    );

    let cancel_token = CancellationToken::new();

    let signal_token = cancel_token.clone();
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        info!("Shutdown signal received");
        signal_token.cancel();
    });

    let store = StateStore::new(config.store_path.clone());
    let registry = spawn_registry(store);

    let observer = spawn_observer(registry.clone(), config.poll_interval, cancel_token.clone());

    let server = BusServer::bind(config.listen, registry, cancel_token.clone())
        .context("failed to start server")?;
    info!(
        addr = %server.local_addr(),
        store = %config.store_path.display(),
        poll_ms = config.poll_interval.as_millis() as u64,
        "pinbus daemon ready"
    );

    server.run().await;

    // The accept loop has stopped; wind down the observer too.
    cancel_token.cancel();
    if let Err(e) = observer.await {
        error!(error = %e, "File observer task failed");
    }

    info!("pinbus daemon stopped");
    Ok(())
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(signal) => signal,
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                return;
            }
        };
        let mut sigint = match signal(SignalKind::interrupt()) {
            Ok(signal) => signal,
            Err(e) => {
                error!(error = %e, "Failed to install SIGINT handler");
                return;
            }
        };

        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM"),
            _ = sigint.recv() => info!("Received SIGINT"),
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to wait for Ctrl-C");
        }
    }
}

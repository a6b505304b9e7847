//! platfand - platform fan daemon
//!
//! Keeps chassis fan FRUs in agreement with the platform configuration
//! store and live thermal-zone demand. One reconciliation + readback pass
//! runs per wake; wakes come from a fixed poll interval or from a
//! configuration change signaled through the admin socket.
//!
//! Single-threaded by design: the engine, the poll timer, and the admin
//! command handling all share one cooperative event loop, so there is
//! exactly one writer of engine state and no locking around it.

mod bus;
mod catalog;
mod server;
mod store;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Notify};
use tracing::{debug, error, info, warn};

use pf_core::Engine;

use bus::FileBus;
use catalog::JsonCatalogSource;
use server::{AdminCommand, ServerContext};
use store::JsonStore;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Seconds between passes when no configuration change arrives
const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;

const DEFAULT_DB_PATH: &str = "/var/lib/platfand/subsystems.json";
const DEFAULT_STATE_PATH: &str = "/var/lib/platfand/fans.json";
const DEFAULT_DEVICES_DIR: &str = "/var/lib/platfand/devices";

fn get_default_socket_path() -> &'static str {
    if Path::new("/run").exists() {
        "/run/platfand.sock"
    } else {
        "/var/run/platfand.sock"
    }
}

fn get_pid_file_path() -> &'static str {
    if Path::new("/run").exists() {
        "/run/platfand.pid"
    } else {
        "/var/run/platfand.pid"
    }
}

// ============================================================================
// Startup plumbing
// ============================================================================

fn set_secure_umask() {
    // SAFETY: umask only sets the process file creation mask.
    unsafe { libc::umask(0o077) };
}

/// Write PID file with stale-PID detection
fn write_pid_file() -> std::io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;

    let path = get_pid_file_path();

    if Path::new(path).exists() {
        if let Ok(content) = std::fs::read_to_string(path) {
            if let Ok(old_pid) = content.trim().parse::<i32>() {
                // SAFETY: kill with signal 0 only checks process existence.
                if unsafe { libc::kill(old_pid, 0) } == 0 {
                    return Err(std::io::Error::new(
                        std::io::ErrorKind::AddrInUse,
                        format!("another instance is running (PID {})", old_pid),
                    ));
                }
            }
        }
        let _ = std::fs::remove_file(path);
    }

    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o644)
        .open(path)?;
    writeln!(file, "{}", std::process::id())?;
    file.sync_all()?;
    Ok(())
}

fn cleanup(socket_path: &str) {
    if Path::new(socket_path).exists() {
        if let Err(e) = std::fs::remove_file(socket_path) {
            warn!("failed to remove socket: {}", e);
        }
    }
    let pid_file = get_pid_file_path();
    if Path::new(pid_file).exists() {
        if let Err(e) = std::fs::remove_file(pid_file) {
            warn!("failed to remove PID file: {}", e);
        }
    }
}

fn init_logging() {
    let log_level = std::env::var("PLATFAND_LOG").unwrap_or_else(|_| "info".to_string());

    // Prefer the systemd journal when it is available.
    if Path::new("/run/systemd/journal/socket").exists() {
        if let Ok(journald_layer) = tracing_journald::layer() {
            use tracing_subscriber::prelude::*;
            tracing_subscriber::registry()
                .with(journald_layer)
                .with(tracing_subscriber::EnvFilter::new(&log_level))
                .init();
            return;
        }
    }

    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .with_env_filter(tracing_subscriber::EnvFilter::new(&log_level))
        .init();
}

// ============================================================================
// CLI
// ============================================================================

struct Options {
    db_path: String,
    state_path: String,
    devices_dir: String,
    socket_path: String,
    interval: Duration,
}

fn print_help() {
    eprintln!("platfand {} - platform fan daemon", VERSION);
    eprintln!();
    eprintln!("USAGE:");
    eprintln!("    platfand [OPTIONS]");
    eprintln!();
    eprintln!("OPTIONS:");
    eprintln!("    -d, --db PATH          Subsystem configuration document (default: {})", DEFAULT_DB_PATH);
    eprintln!("        --state PATH       Published fan state document (default: {})", DEFAULT_STATE_PATH);
    eprintln!("    -r, --registers DIR    Device register files (default: {})", DEFAULT_DEVICES_DIR);
    eprintln!("    -s, --socket PATH      Admin socket path (auto-detected)");
    eprintln!("    -i, --interval SECS    Poll interval (default: {})", DEFAULT_POLL_INTERVAL_SECS);
    eprintln!("    -v, --version          Print version");
    eprintln!("    -h, --help             Print this help");
    eprintln!();
    eprintln!("ENVIRONMENT:");
    eprintln!("    PLATFAND_LOG           Log level (trace, debug, info, warn, error)");
}

fn parse_options() -> Options {
    let args: Vec<String> = std::env::args().collect();
    let mut options = Options {
        db_path: DEFAULT_DB_PATH.to_string(),
        state_path: DEFAULT_STATE_PATH.to_string(),
        devices_dir: DEFAULT_DEVICES_DIR.to_string(),
        socket_path: get_default_socket_path().to_string(),
        interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
    };

    let mut take_value = |i: &mut usize, flag: &str| -> String {
        *i += 1;
        match args.get(*i) {
            Some(value) => value.clone(),
            None => {
                eprintln!("Error: {} requires an argument", flag);
                std::process::exit(1);
            }
        }
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-h" | "--help" => {
                print_help();
                std::process::exit(0);
            }
            "-v" | "--version" => {
                println!("platfand {}", VERSION);
                std::process::exit(0);
            }
            "-d" | "--db" => options.db_path = take_value(&mut i, "--db"),
            "--state" => options.state_path = take_value(&mut i, "--state"),
            "-r" | "--registers" => options.devices_dir = take_value(&mut i, "--registers"),
            "-s" | "--socket" => options.socket_path = take_value(&mut i, "--socket"),
            "-i" | "--interval" => {
                let value = take_value(&mut i, "--interval");
                match value.parse::<u64>() {
                    Ok(secs) if secs > 0 => options.interval = Duration::from_secs(secs),
                    _ => {
                        eprintln!("Error: --interval must be a positive integer");
                        std::process::exit(1);
                    }
                }
            }
            arg => {
                eprintln!("Unknown argument: {}", arg);
                print_help();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    options
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    set_secure_umask();
    let options = parse_options();
    init_logging();

    info!("platfand {} starting", VERSION);
    info!(db = %options.db_path, state = %options.state_path, "configuration store");
    info!(devices = %options.devices_dir, "device register directory");

    // SAFETY: geteuid just returns the effective user id.
    if unsafe { libc::geteuid() } != 0 {
        warn!("not running as root; register and socket access may fail");
    }

    if let Err(e) = write_pid_file() {
        error!("could not write PID file: {}", e);
        std::process::exit(1);
    }

    let socket_path = options.socket_path.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        info!("received shutdown signal");
        cleanup(&socket_path);
        std::process::exit(0);
    }) {
        warn!("failed to set signal handler: {}", e);
    }

    let store = JsonStore::new(&options.db_path, &options.state_path);
    let engine = Engine::new(
        store.clone(),
        JsonCatalogSource::new(),
        FileBus::new(&options.devices_dir),
    );

    let change_notify = Arc::new(Notify::new());
    let (command_tx, command_rx) = mpsc::channel(16);

    let server_ctx = ServerContext {
        store,
        change_notify: change_notify.clone(),
        commands: command_tx.clone(),
    };
    let server_socket = options.socket_path.clone();
    tokio::spawn(async move {
        if let Err(e) = server::run_server(&server_socket, server_ctx).await {
            error!("admin server failed: {}", e);
        }
    });

    run_engine_loop(engine, options.interval, change_notify, command_rx).await;

    cleanup(&options.socket_path);
    Ok(())
}

/// The daemon's event loop: one bounded pass per wake.
///
/// Wakes on the poll interval or on a configuration change signal; admin
/// dump requests are answered between passes so the loop remains the only
/// writer of engine state.
async fn run_engine_loop(
    mut engine: Engine<JsonStore, JsonCatalogSource, FileBus>,
    interval: Duration,
    change_notify: Arc<Notify>,
    mut commands: mpsc::Receiver<AdminCommand>,
) {
    info!(
        interval_secs = interval.as_secs(),
        "fan reconciliation loop starting"
    );

    loop {
        engine.run_pass();

        let sleep = tokio::time::sleep(interval);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                _ = &mut sleep => break,
                _ = change_notify.notified() => {
                    debug!("woken by configuration change");
                    break;
                }
                command = commands.recv() => match command {
                    Some(AdminCommand::Dump { reply }) => {
                        let _ = reply.send(engine.dump());
                    }
                    None => break,
                },
            }
        }
    }
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process lifecycle: idempotent daemonized start, port discovery,
//! state-file write-through, signal handling, and signal-safe teardown of
//! system proxy settings.

use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::adapters::build::BuildLog;
use crate::adapters::crash::{CrashSpool, CrashWatcher};
use crate::adapters::oslog::OslogAdapter;
use crate::adapters::syslog::SyslogAdapter;
use crate::adapters::{AdapterRegistry, EntrySink, SourceAdapter};
use crate::config::Config;
use crate::control::{ControllerInventory, DeviceController};
use crate::flows::FlowStore;
use crate::pool::{DevicePool, PoolStore};
use crate::proxy::{ProxyStartOptions, ProxyStatus, ProxySubsystem, SystemProxy};
use crate::ring::{LogFilter, LogRing};
use crate::runner::SystemRunner;
use crate::statefile::{load_or_create_api_key, ServerState, StateFile};
use crate::transport::build_router;
use crate::transport::state::{LifecycleState, ServerSettings, Store};

/// Budget for the foreground parent to see the daemon healthy.
const START_BUDGET: Duration = Duration::from_secs(5);

/// Grace for `stop` before escalating to SIGKILL.
const STOP_GRACE: Duration = Duration::from_secs(5);

/// Marker env var telling the child it was daemonized (log to file).
const DAEMON_ENV: &str = "QUERN_DAEMONIZED";

/// How far the port scan walks before giving up.
const PORT_SCAN_RANGE: u16 = 100;

fn health_url(port: u16) -> String {
    format!("http://127.0.0.1:{port}/health")
}

/// Probe a recorded endpoint. A healthy answer means a live server.
pub async fn health_check(port: u16) -> bool {
    let client = match reqwest::Client::builder().timeout(Duration::from_secs(2)).build() {
        Ok(client) => client,
        Err(_) => return false,
    };
    match client.get(health_url(port)).send().await {
        Ok(resp) => resp.status().is_success(),
        Err(_) => false,
    }
}

/// First free port at or after `from` (bounded scan).
pub fn find_free_port(from: u16, skip: &[u16]) -> Option<u16> {
    (from..from.saturating_add(PORT_SCAN_RANGE))
        .filter(|p| !skip.contains(p))
        .find(|p| std::net::TcpListener::bind(("127.0.0.1", *p)).is_ok())
}

fn process_exists(pid: u32) -> bool {
    kill(Pid::from_raw(pid as i32), None).is_ok()
}

/// Initialize tracing. Daemonized processes log to the rotated file via a
/// non-blocking appender; foreground runs log to stderr.
///
/// Returns a guard that must stay alive for the file writer to flush.
pub fn init_tracing(config: &Config) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    // Priority: --log-level / QUERN_LOG_LEVEL > RUST_LOG > "info".
    let directive = config.effective_log_level();
    let filter = if config.log_level.is_none() && !config.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&directive))
    } else {
        EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let daemonized = std::env::var(DAEMON_ENV).is_ok();
    let guard = if daemonized {
        match crate::logfile::open_rotated(&config.log_path()) {
            Ok(file) => {
                let (writer, guard) = tracing_appender::non_blocking(file);
                let result = match config.log_format.as_str() {
                    "json" => tracing_subscriber::fmt()
                        .with_env_filter(filter)
                        .with_writer(writer)
                        .with_ansi(false)
                        .json()
                        .try_init(),
                    _ => tracing_subscriber::fmt()
                        .with_env_filter(filter)
                        .with_writer(writer)
                        .with_ansi(false)
                        .try_init(),
                };
                drop(result);
                return Some(guard);
            }
            Err(_) => None,
        }
    } else {
        None
    };

    let result = match config.log_format.as_str() {
        "json" => tracing_subscriber::fmt().with_env_filter(filter).json().try_init(),
        _ => tracing_subscriber::fmt().with_env_filter(filter).try_init(),
    };
    drop(result);
    guard
}

/// `quern start`. Returns the process exit code.
pub async fn cmd_start(mut config: Config) -> i32 {
    let statefile = StateFile::new(config.state_path());

    // Idempotence: a healthy recorded server means nothing to do.
    if let Some(existing) = statefile.load() {
        if health_check(existing.server_port).await {
            println!("quern is already running at http://127.0.0.1:{}", existing.server_port);
            return 0;
        }
        // Stale state: recover system proxy settings from the previous run
        // before anything else, then clear the file.
        if existing.system_proxy_configured {
            if let Some(snapshot) = existing.system_proxy_snapshot.clone() {
                info!("restoring system proxy settings from stale state");
                let system = SystemProxy::new(Arc::new(SystemRunner));
                if let Err(err) = system.restore(&snapshot).await {
                    error!(err = %err, "system proxy restore failed during crash recovery");
                }
            }
        }
        statefile.remove();
    }

    // Port discovery: server port from the default, proxy port just above.
    let Some(server_port) = find_free_port(config.port, &[]) else {
        eprintln!("error: no free port near {}", config.port);
        return 1;
    };
    let proxy_start = config.proxy_port.unwrap_or(server_port + 1);
    let Some(proxy_port) = find_free_port(proxy_start, &[server_port]) else {
        eprintln!("error: no free proxy port near {proxy_start}");
        return 1;
    };
    config.port = server_port;
    config.proxy_port = Some(proxy_port);

    if config.foreground {
        return run_server(config).await;
    }
    daemonize(&config, server_port).await
}

/// Re-spawn this binary detached with `--foreground`, stdio pointed at the
/// rotated log, then poll health until ready.
async fn daemonize(config: &Config, server_port: u16) -> i32 {
    let exe = match std::env::current_exe() {
        Ok(exe) => exe,
        Err(err) => {
            eprintln!("error: cannot locate own binary: {err}");
            return 1;
        }
    };
    let log = match crate::logfile::open_rotated(&config.log_path()) {
        Ok(log) => log,
        Err(err) => {
            eprintln!("error: cannot open log file: {err}");
            return 1;
        }
    };
    let log_err = match log.try_clone() {
        Ok(clone) => clone,
        Err(err) => {
            eprintln!("error: cannot clone log handle: {err}");
            return 1;
        }
    };

    let mut cmd = tokio::process::Command::new(exe);
    cmd.arg("start").arg("--foreground");
    cmd.args(["--port", &config.port.to_string()]);
    if let Some(proxy_port) = config.proxy_port {
        cmd.args(["--proxy-port", &proxy_port.to_string()]);
    }
    if config.no_proxy {
        cmd.arg("--no-proxy");
    }
    if config.verbose {
        cmd.arg("--verbose");
    }
    if let Some(ref on_crash) = config.on_crash {
        cmd.args(["--on-crash", on_crash]);
    }
    if let Some(ref home) = config.home {
        cmd.arg("--home").arg(home);
    }
    cmd.args(["--log-format", &config.log_format]);
    cmd.env(DAEMON_ENV, "1");
    cmd.stdin(Stdio::null()).stdout(Stdio::from(log)).stderr(Stdio::from(log_err));
    // New process group: the daemon survives this shell.
    cmd.process_group(0);

    if let Err(err) = cmd.spawn() {
        eprintln!("error: failed to spawn daemon: {err}");
        return 1;
    }

    let deadline = Instant::now() + START_BUDGET;
    while Instant::now() < deadline {
        if health_check(server_port).await {
            println!("quern started at http://127.0.0.1:{server_port}");
            return 0;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    eprintln!(
        "error: daemon did not become healthy within {}s; see {}",
        START_BUDGET.as_secs(),
        config.log_path().display()
    );
    1
}

/// The foreground server: build everything, serve, tear down.
async fn run_server(config: Config) -> i32 {
    let _log_guard = init_tracing(&config);

    match serve(config).await {
        Ok(()) => 0,
        Err(err) => {
            error!("fatal: {err:#}");
            1
        }
    }
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let shutdown = CancellationToken::new();
    let home = config.home_dir();
    std::fs::create_dir_all(&home)?;

    let api_key =
        load_or_create_api_key(&config.api_key_path()).map_err(|e| anyhow::anyhow!("{e}"))?;
    let statefile = StateFile::new(config.state_path());
    let server_port = config.port;
    let proxy_port = config.proxy_port.unwrap_or(server_port + 1);

    // Core stores and sink.
    let ring = Arc::new(LogRing::default());
    let flows = Arc::new(FlowStore::default());
    let sink = EntrySink::new(Arc::clone(&ring), Arc::clone(&flows));

    // Device plane + pool, wired through the narrow inventory interface.
    let runner = Arc::new(SystemRunner);
    let controller = DeviceController::new(runner.clone());
    let inventory = ControllerInventory::new(Arc::clone(&controller));
    let pool = Arc::new(DevicePool::new(
        PoolStore::new(config.pool_path()),
        inventory as Arc<dyn crate::pool::DeviceInventory>,
    ));
    controller.attach_pool(Arc::clone(&pool));

    // Proxy subsystem.
    let proxy = ProxySubsystem::new(sink.clone(), config.addon_path());
    let system_proxy = SystemProxy::new(runner.clone());

    // Adapters.
    let registry = Arc::new(AdapterRegistry::default());
    let crashes = Arc::new(CrashSpool::default());
    registry.insert(Arc::new(SyslogAdapter::new(sink.clone(), None)));
    registry.insert(Arc::new(OslogAdapter::new(sink.clone(), None)));
    let crash_dir = dirs::home_dir()
        .unwrap_or_default()
        .join("Library")
        .join("Logs")
        .join("DiagnosticReports");
    registry.insert(Arc::new(CrashWatcher::new(
        sink.clone(),
        crash_dir,
        Arc::clone(&crashes),
        config.on_crash.clone(),
    )));

    let build = BuildLog::new(sink.clone());

    // Preliminary state: written before the listener so `stop` can always
    // find the pid, finalized after the ports are live.
    let state = ServerState {
        pid: std::process::id(),
        server_port,
        proxy_port,
        proxy_enabled: false,
        started_at: Utc::now(),
        api_key: api_key.clone(),
        active_devices: Vec::new(),
        system_proxy_configured: false,
        system_proxy_interface: None,
        system_proxy_snapshot: None,
    };
    statefile.write(&state).map_err(|e| anyhow::anyhow!("{e}"))?;

    let store = Arc::new(Store {
        ring,
        flows,
        sink,
        registry: Arc::clone(&registry),
        controller,
        pool,
        proxy: Arc::clone(&proxy),
        system_proxy,
        build,
        crashes,
        statefile: statefile.clone(),
        config: ServerSettings {
            api_key,
            server_port,
            proxy_port,
            started_at: Instant::now(),
            home_dir: home,
        },
        lifecycle: LifecycleState { shutdown: shutdown.clone() },
        default_filter: parking_lot::RwLock::new(LogFilter::default()),
    });

    // HTTP listener.
    let listener = TcpListener::bind(("127.0.0.1", server_port)).await?;
    info!(port = server_port, "HTTP listening");
    let router = build_router(Arc::clone(&store));
    let serve_handle = {
        let sd = shutdown.clone();
        tokio::spawn(async move {
            let result =
                axum::serve(listener, router).with_graceful_shutdown(sd.cancelled_owned()).await;
            if let Err(e) = result {
                error!("HTTP server error: {e}");
            }
        })
    };

    // Opt-in adapters; a missing tool disables the adapter, not the server.
    for status in registry.statuses() {
        if let Some(adapter) = registry.get(&status.name) {
            if let Err(err) = adapter.start().await {
                error!(adapter = %status.name, err = %err, "adapter failed to start");
            }
        }
    }

    // Interception proxy, unless opted out.
    if !config.no_proxy {
        match proxy.start(proxy_port, ProxyStartOptions::default()).await {
            Ok(()) => {
                let _ = statefile.update(|st| st.proxy_enabled = true);
            }
            Err(err) => {
                // Degraded, not fatal: the rest of the server still works.
                error!(err = %err, "interception proxy did not start");
            }
        }
    }

    // Mirror proxy status transitions into the state file (watchdog writes
    // `crashed` here with no auto-restart).
    {
        let mut status_rx = proxy.status_watch();
        let statefile = statefile.clone();
        let sd = shutdown.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = sd.cancelled() => break,
                    changed = status_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let status = *status_rx.borrow();
                        let enabled = status == ProxyStatus::Running;
                        let _ = statefile.update(|st| st.proxy_enabled = enabled);
                        if status == ProxyStatus::Crashed {
                            error!("proxy subprocess crashed; no automatic restart");
                        }
                    }
                }
            }
        });
    }

    // Signal handling: first signal drains gracefully, second forces exit.
    spawn_signal_handler(shutdown.clone());

    info!(port = server_port, proxy_port, "quern ready");

    // Park until shutdown, then tear down in dependency order.
    shutdown.cancelled().await;
    info!("shutting down");

    registry.stop_all().await;
    proxy.stop().await;
    crate::transport::http::proxy_api::restore_system_proxy_if_configured(&store).await;
    statefile.remove();

    let _ = tokio::time::timeout(Duration::from_secs(2), serve_handle).await;
    Ok(())
}

fn spawn_signal_handler(shutdown: CancellationToken) {
    tokio::spawn(async move {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()).ok();
        let mut sigint =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt()).ok();

        // First signal: graceful shutdown.
        tokio::select! {
            _ = async {
                if let Some(ref mut s) = sigterm { s.recv().await } else { std::future::pending().await }
            } => {
                info!("received SIGTERM");
            }
            _ = async {
                if let Some(ref mut s) = sigint { s.recv().await } else { std::future::pending().await }
            } => {
                info!("received SIGINT");
            }
        }
        shutdown.cancel();

        // Second signal: force exit.
        tokio::select! {
            _ = async {
                if let Some(ref mut s) = sigterm { s.recv().await } else { std::future::pending().await }
            } => {
                info!("received SIGTERM again, forcing exit");
            }
            _ = async {
                if let Some(ref mut s) = sigint { s.recv().await } else { std::future::pending().await }
            } => {
                info!("received SIGINT again, forcing exit");
            }
        }
        std::process::exit(130);
    });
}

/// `quern stop`.
pub async fn cmd_stop(config: Config) -> i32 {
    let statefile = StateFile::new(config.state_path());
    let Some(state) = statefile.load() else {
        println!("quern is not running");
        return 0;
    };

    if !process_exists(state.pid) {
        statefile.remove();
        println!("quern is not running (stale state removed)");
        return 0;
    }

    if kill(Pid::from_raw(state.pid as i32), Signal::SIGTERM).is_err() {
        statefile.remove();
        println!("quern is not running");
        return 0;
    }

    let deadline = Instant::now() + STOP_GRACE;
    while Instant::now() < deadline {
        if !process_exists(state.pid) {
            println!("quern stopped");
            return 0;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    // The daemon did not drain in time; hard-kill and clean up for it.
    let _ = kill(Pid::from_raw(state.pid as i32), Signal::SIGKILL);
    statefile.remove();
    println!("quern stopped (forced)");
    0
}

/// `quern status`. Exit code 2 means "not running".
pub async fn cmd_status(config: Config) -> i32 {
    let statefile = StateFile::new(config.state_path());
    let Some(state) = statefile.load() else {
        println!("quern is not running");
        return 2;
    };
    if health_check(state.server_port).await {
        println!(
            "quern running at http://127.0.0.1:{} (pid {}, proxy {})",
            state.server_port,
            state.pid,
            if state.proxy_enabled { "enabled" } else { "disabled" }
        );
        0
    } else {
        println!("quern state file exists but the server is not responding (pid {})", state.pid);
        2
    }
}

/// `quern restart`.
pub async fn cmd_restart(config: Config) -> i32 {
    let code = cmd_stop(config.clone()).await;
    if code != 0 {
        return code;
    }
    cmd_start(config).await
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;

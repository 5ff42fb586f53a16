// src/main.rs

//! Agent entry-point: Windows service or console fallback.
//!
//! 1. Parse configuration & set up structured logging
//! 2. Initialise the SQLite detection log (WAL) and its writer
//! 3. Register with the SCM (Windows) or wait for Ctrl-C (console)
//! 4. Feed telemetry from `[input]` through the agent core
//! 5. On Stop / Shutdown, drain queued dumps, persist state and exit

use anyhow::Context as _;
use chrono::Local;
use fern::Dispatch;
use log::LevelFilter;
use std::{
    future::Future,
    path::{Path, PathBuf},
    process,
    sync::Arc,
    thread,
    time::Duration,
};
use tokio::{
    runtime::Runtime,
    sync::{mpsc, watch},
};

use agent::agent::Agent;
use agent::comms::{JsonLinesListener, Listener};
use agent::config::{self, Config};
use agent::db::{self, DetectionRecord, connection, maintenance};
use agent::os::{AgentIdentity, HostOs};

/// Print an error with context and terminate the process.
macro_rules! fatal {
    ($ctx:expr, $($arg:tt)+) => {{
        eprintln!(
            "[{}][ERROR][{}] {}",
            chrono::Local::now().to_rfc3339(),
            $ctx,
            format!($($arg)+)
        );
        std::process::exit(1);
    }};
}

// ───── helpers ──────────────────────────────────────────────────────────────

/// Directory that contains the running executable.
fn exe_dir() -> PathBuf {
    match std::env::current_exe() {
        Ok(exe) => exe.parent().map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from(".")),
        Err(e) => fatal!("main", "Cannot determine exe path: {}", e),
    }
}

/// `config.toml` next to the executable, or the path given as first argument.
fn load_config(exe_dir: &Path) -> Config {
    let path = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| exe_dir.join("config.toml"));
    if !path.exists() {
        eprintln!("[{}][WARN][config] {} not found, using defaults", Local::now().to_rfc3339(), path.display());
        return Config::default();
    }
    config::load(&path).unwrap_or_else(|e| fatal!("config", "{}: {}", path.display(), e))
}

/// Relative paths in the configuration are relative to the executable.
fn anchor_paths(cfg: &mut Config, base: &Path) {
    if cfg.dump.dir.is_relative() {
        cfg.dump.dir = base.join(&cfg.dump.dir);
    }
    if let Some(state) = cfg.state.path.as_mut() {
        if state.is_relative() {
            *state = base.join(&*state);
        }
    }
}

/// Configure global logging as requested in `[logging]`.
fn setup_logging(exe_dir: &Path, cfg: &Config) -> Result<(), fern::InitError> {
    let level = match cfg.logging.level.to_uppercase().as_str() {
        "ERROR" => LevelFilter::Error,
        "WARN" => LevelFilter::Warn,
        "DEBUG" => LevelFilter::Debug,
        "TRACE" => LevelFilter::Trace,
        _ => LevelFilter::Info,
    };

    let log_path = cfg
        .logging
        .enable
        .then(|| exe_dir.join(cfg.logging.file.as_deref().unwrap_or("agent.log")));

    let mut dispatch = Dispatch::new()
        .format(|out, msg, record| {
            out.finish(format_args!(
                "[{}][{:5}][{}][pid={}][tid={:?}] {}",
                Local::now().to_rfc3339(),
                record.level(),
                record.target(),
                process::id(),
                thread::current().id(),
                msg
            ))
        })
        .level(level)
        .chain(std::io::stdout());

    if let Some(path) = log_path {
        dispatch = dispatch.chain(fern::log_file(path)?);
    }

    dispatch.apply()?;
    Ok(())
}

// ───── agent lifecycle ──────────────────────────────────────────────────────

async fn serve(cfg: Config, base: PathBuf, stop: impl Future<Output = ()>) -> anyhow::Result<()> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // 2 ─ Detection log
    let mut background = Vec::new();
    let detections = if cfg.database.enable {
        let conn = connection::init_database(&base, &cfg.database).context("initialising detection log")?;
        let (tx, rx) = mpsc::channel::<DetectionRecord>(10_000);
        background.push(db::spawn_writer(conn, rx, &cfg.database));
        let path = connection::db_path(&base, &cfg.database);
        background.extend(maintenance::spawn_ttl_cleanup(path.clone(), &cfg.database, shutdown_rx.clone()));
        background.push(maintenance::spawn_wal_maintenance(path, &cfg.database, shutdown_rx.clone()));
        Some(tx)
    } else {
        None
    };

    // 4 ─ Core + intake
    let input = cfg.input.path.clone();
    let mut core = Agent::new(cfg, Arc::new(HostOs::new()), AgentIdentity::current());
    if let Some(tx) = detections {
        core = core.with_detection_log(tx);
    }
    background.push(tokio::spawn(Arc::clone(core.compression()).run(shutdown_rx.clone())));

    let (ev_tx, ev_rx) = mpsc::channel(16_384);
    let intake = Arc::new(JsonLinesListener::new(input)).spawn(ev_tx, shutdown_rx.clone());
    log::info!("Agent running");

    tokio::select! {
        _ = core.run(ev_rx, shutdown_rx.clone()) => log::info!("Telemetry source exhausted"),
        _ = stop => log::warn!("Shutdown initiated"),
    }

    // 5 ─ Drain: dumps first, so that the compression loop sees their artifacts
    core.shutdown().await;
    drop(core);
    let _ = shutdown_tx.send(true);
    let _ = intake.await;
    for task in background {
        let _ = task.await;
    }
    log::info!("Agent stopped cleanly");
    Ok(())
}

/// Run the agent until `stop` resolves or the telemetry source is exhausted.
fn run_agent(stop: impl Future<Output = ()>) {
    // 1 ─ Context
    let exe_dir = exe_dir();
    let mut cfg = load_config(&exe_dir);
    anchor_paths(&mut cfg, &exe_dir);

    if let Err(e) = setup_logging(&exe_dir, &cfg) {
        fatal!("logging", "{}", e);
    }
    log::info!("Agent bootstrap initiated");

    let rt = Runtime::new().unwrap_or_else(|e| fatal!("runtime", "{}", e));
    if let Err(e) = rt.block_on(serve(cfg, exe_dir, stop)) {
        log::error!("{:#}", e);
    }
    // stdin reads cannot be cancelled
    rt.shutdown_timeout(Duration::from_secs(5));
}

async fn console_stop() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Cannot listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}

// ───── Windows service ──────────────────────────────────────────────────────

#[cfg(windows)]
mod service {
    use std::{ffi::OsString, sync::mpsc, time::Duration};
    use windows_service::{
        define_windows_service,
        service::{
            ServiceControl, ServiceControlAccept, ServiceExitCode, ServiceState, ServiceStatus, ServiceType,
        },
        service_control_handler::{self, ServiceControlHandlerResult},
        service_dispatcher,
    };

    const SERVICE_NAME: &str = "HidsAgent";

    define_windows_service!(ffi_service_main, service_main);

    pub fn start() -> windows_service::Result<()> {
        service_dispatcher::start(SERVICE_NAME, ffi_service_main)
    }

    fn service_main(_args: Vec<OsString>) {
        let (svc_tx, svc_rx) = mpsc::sync_channel::<()>(1);
        let status_handle = match service_control_handler::register(SERVICE_NAME, move |ctrl| match ctrl {
            ServiceControl::Stop | ServiceControl::Shutdown => {
                log::warn!("Stop requested via SCM");
                let _ = svc_tx.try_send(());
                ServiceControlHandlerResult::NoError
            }
            ServiceControl::Interrogate => ServiceControlHandlerResult::NoError,
            _ => ServiceControlHandlerResult::NotImplemented,
        }) {
            Ok(h) => h,
            Err(e) => {
                eprintln!("cannot register service control handler: {e}");
                return;
            }
        };

        let mut status = ServiceStatus {
            service_type: ServiceType::OWN_PROCESS,
            current_state: ServiceState::Running,
            controls_accepted: ServiceControlAccept::STOP | ServiceControlAccept::SHUTDOWN,
            exit_code: ServiceExitCode::Win32(0),
            checkpoint: 0,
            wait_hint: Duration::from_secs(30),
            process_id: None,
        };
        let _ = status_handle.set_service_status(status.clone());

        super::run_agent(async move {
            let _ = tokio::task::spawn_blocking(move || svc_rx.recv()).await;
        });

        status.current_state = ServiceState::Stopped;
        let _ = status_handle.set_service_status(status);
    }
}

fn main() {
    #[cfg(windows)]
    {
        // If registering as a service fails, run as a plain console app.
        match service::start() {
            Ok(()) => return,
            Err(e) => eprintln!(
                "[{}][ERROR][main] Not a service: {} – falling back to console.",
                Local::now().to_rfc3339(),
                e
            ),
        }
    }
    run_agent(console_stop());
}

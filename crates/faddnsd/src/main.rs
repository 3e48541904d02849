// # faddnsd - faddns Daemon
//
// Thin integration layer: all reconciliation logic lives in faddns-core.
//
// The faddnsd daemon is responsible for:
// 1. Reading configuration from environment variables
// 2. Initializing logging and the runtime
// 3. Wiring the record store, BIND tools and reconciliation coordinator
// 4. Serving the HTTP report/dump/force-add endpoints
// 5. Shutting everything down on SIGTERM/SIGINT
//
// ## Configuration
//
// ### Zone
// - `FADDNS_ZONE`: Zone origin (required)
// - `FADDNS_ZONE_FILE`: Zone file with `@faddns` placeholder lines (required)
// - `FADDNS_SERIAL_FILE`: File holding the SOA serial (default: zone file)
// - `FADDNS_WORK_FILE`: Scratch file for patched output (default: `<zone file>.faddns-tmp`)
//
// ### Transport
// - `FADDNS_LISTEN_ADDR`: HTTP listen address (default: 0.0.0.0:8765)
//
// ### Reconciliation
// - `FADDNS_CHECK_INTERVAL_SECS`: Timer tick (default: 5)
// - `FADDNS_MIN_UPDATE_INTERVAL_SECS`: Minimum spacing between zone updates (default: 30)
// - `FADDNS_RECORD_TTL`: TTL written into record lines (default: 10M)
// - `FADDNS_NO_SIGN`: Skip `dnssec-signzone`
// - `FADDNS_NO_RELOAD`: Skip `rndc reload`
//
// ### Tools
// - `FADDNS_CHECKZONE_COMMAND`, `FADDNS_SIGNZONE_COMMAND`, `FADDNS_RNDC_COMMAND`
// - `FADDNS_TOOL_TIMEOUT_SECS`: Upper bound per tool invocation (default: 60)
//
// ### Logging
// - `FADDNS_LOG_LEVEL`: trace, debug, info, warn, error (default: info)
//
// ## Example
//
// ```bash
// export FADDNS_ZONE=dyn.example.com
// export FADDNS_ZONE_FILE=/etc/bind/db.dyn.example.com
// export FADDNS_NO_SIGN=1
//
// faddnsd
// ```

mod http;

use anyhow::{Context, Result};
use faddns_bind::BindZoneTools;
use faddns_core::{FaddnsConfig, Ingestor, RecordStore, ReconcileCoordinator, ZoneConfig};
use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{Level, debug, error, info};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// How long shutdown may take before the daemon gives up waiting
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8765";

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum FaddnsExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<FaddnsExitCode> for ExitCode {
    fn from(code: FaddnsExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Daemon configuration
#[derive(Debug)]
struct Config {
    faddns: FaddnsConfig,
    listen_addr: SocketAddr,
    log_level: String,
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable source
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let number = |key: &str| -> Result<Option<u64>> {
            var(key)
                .map(|v| {
                    v.trim()
                        .parse::<u64>()
                        .with_context(|| format!("{} must be a number. Got: {}", key, v))
                })
                .transpose()
        };
        let flag = |key: &str| {
            var(key).is_some_and(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes"))
        };

        let zone_name = var("FADDNS_ZONE").context(
            "FADDNS_ZONE is required. Set it via: export FADDNS_ZONE=dyn.example.com",
        )?;
        let zone_file = var("FADDNS_ZONE_FILE").context(
            "FADDNS_ZONE_FILE is required. Set it via: export FADDNS_ZONE_FILE=/etc/bind/db.dyn.example.com",
        )?;

        let mut zone = ZoneConfig::new(zone_name, PathBuf::from(zone_file));
        if let Some(serial_file) = var("FADDNS_SERIAL_FILE") {
            zone = zone.with_serial_file(PathBuf::from(serial_file));
        }
        if let Some(work_file) = var("FADDNS_WORK_FILE") {
            zone = zone.with_work_file(PathBuf::from(work_file));
        }

        let mut faddns = FaddnsConfig {
            zone,
            reconcile: Default::default(),
            tools: Default::default(),
        };

        if let Some(secs) = number("FADDNS_CHECK_INTERVAL_SECS")? {
            faddns.reconcile.check_interval_secs = secs;
        }
        if let Some(secs) = number("FADDNS_MIN_UPDATE_INTERVAL_SECS")? {
            faddns.reconcile.min_update_interval_secs = secs;
        }
        if let Some(ttl) = var("FADDNS_RECORD_TTL") {
            faddns.reconcile.record_ttl = ttl;
        }
        faddns.reconcile.sign_enabled = !flag("FADDNS_NO_SIGN");
        faddns.reconcile.reload_enabled = !flag("FADDNS_NO_RELOAD");

        if let Some(command) = var("FADDNS_CHECKZONE_COMMAND") {
            faddns.tools.checkzone_command = command;
        }
        if let Some(command) = var("FADDNS_SIGNZONE_COMMAND") {
            faddns.tools.signzone_command = command;
        }
        if let Some(command) = var("FADDNS_RNDC_COMMAND") {
            faddns.tools.rndc_command = command;
        }
        if let Some(secs) = number("FADDNS_TOOL_TIMEOUT_SECS")? {
            faddns.tools.timeout_secs = secs;
        }

        let listen = var("FADDNS_LISTEN_ADDR").unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string());
        let listen_addr = listen
            .trim()
            .parse()
            .with_context(|| format!("FADDNS_LISTEN_ADDR is not a socket address. Got: {}", listen))?;

        Ok(Self {
            faddns,
            listen_addr,
            log_level: var("FADDNS_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        })
    }

    /// Validate the configuration
    ///
    /// Besides value checks, the zone and serial files must be readable:
    /// the daemon refuses to start against a zone it cannot patch.
    fn validate(&self) -> Result<()> {
        self.faddns.validate()?;

        let zone = &self.faddns.zone;
        std::fs::File::open(&zone.zone_file).with_context(|| {
            format!("Cannot open FADDNS_ZONE_FILE {}", zone.zone_file.display())
        })?;
        std::fs::File::open(zone.serial_path()).with_context(|| {
            format!("Cannot open FADDNS_SERIAL_FILE {}", zone.serial_path().display())
        })?;

        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "FADDNS_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }

        Ok(())
    }
}

fn main() -> ExitCode {
    // Load configuration from environment
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return FaddnsExitCode::ConfigError.into();
        }
    };

    // Validate configuration
    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {:#}", e);
        return FaddnsExitCode::ConfigError.into();
    }

    // Initialize tracing
    let log_level = match config.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return FaddnsExitCode::ConfigError.into();
    }

    info!("Starting faddnsd {}", env!("CARGO_PKG_VERSION"));
    info!(
        "Zone {} in {} (serial in {})",
        config.faddns.zone.name,
        config.faddns.zone.zone_file.display(),
        config.faddns.zone.serial_path().display()
    );

    // Enter tokio runtime
    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return FaddnsExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        if let Err(e) = run_daemon(config).await {
            error!("Daemon error: {:#}", e);
            FaddnsExitCode::RuntimeError
        } else {
            FaddnsExitCode::CleanShutdown
        }
    });

    result.into()
}

/// Run the daemon
async fn run_daemon(config: Config) -> Result<()> {
    let store = RecordStore::new();
    let tools = BindZoneTools::new(&config.faddns.tools)?;
    let (coordinator, mut events) =
        ReconcileCoordinator::new(store.clone(), Box::new(tools), config.faddns)?;

    // Cycle outcomes are logged by the coordinator itself
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            debug!("Cycle event: {:?}", event);
        }
    });

    let (coordinator_tx, coordinator_rx) = oneshot::channel();
    let mut coordinator_task =
        tokio::spawn(async move { coordinator.run_with_shutdown(Some(coordinator_rx)).await });

    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen_addr))?;
    info!("Accepting reports on {}", config.listen_addr);

    let (server_tx, server_rx) = oneshot::channel::<()>();
    let app = http::router(Ingestor::new(store));
    let mut server_task = tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async {
            let _ = server_rx.await;
        })
        .await
    });

    tokio::select! {
        signal = wait_for_shutdown() => {
            info!("Received shutdown signal: {}", signal?);
        }
        result = &mut server_task => {
            let _ = coordinator_tx.send(());
            result?.context("HTTP server stopped")?;
            anyhow::bail!("HTTP server stopped unexpectedly");
        }
        result = &mut coordinator_task => {
            let _ = server_tx.send(());
            result??;
            anyhow::bail!("Coordinator stopped unexpectedly");
        }
    }

    info!("Shutting down daemon");
    let _ = server_tx.send(());
    let _ = coordinator_tx.send(());

    // An in-flight cycle is allowed to finish
    let drained = tokio::time::timeout(SHUTDOWN_GRACE, async {
        let server = server_task.await;
        let coordinator = coordinator_task.await;
        (server, coordinator)
    })
    .await;

    match drained {
        Ok((server, coordinator)) => {
            server?.context("HTTP server failed during shutdown")?;
            coordinator??;
            Ok(())
        }
        Err(_) => Err(anyhow::anyhow!("Shutdown timeout after {:?}", SHUTDOWN_GRACE)),
    }
}

/// Wait for shutdown signals (SIGTERM, SIGINT)
///
/// # Returns
///
/// Returns the name of the signal received.
#[cfg(unix)]
async fn wait_for_shutdown() -> Result<&'static str> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

/// Wait for shutdown signals (SIGINT only)
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to wait for CTRL-C: {}", e))?;
    Ok("SIGINT")
}

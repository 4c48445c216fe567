//! Pendulum Receiver
//!
//! Reads edge frames from the pendulum's rotary encoder board, turns them
//! into per-oscillation period/amplitude records, stores the records and
//! streams everything live over WebSocket.
//!
//! # Usage
//!
//! ```bash
//! # Run against the encoder board
//! pendulum-receiver --port /dev/ttyUSB0
//!
//! # Run against the built-in pendulum simulator
//! pendulum-receiver --simulate
//!
//! # Dump decoded frames as CSV
//! pendulum-receiver dump --port /dev/ttyUSB0 > run.csv
//! ```
//!
//! # Environment Variables
//!
//! - `PENDULUM_CONFIG`: Path to the receiver TOML config
//! - `PENDULUM_CORS_ORIGINS`: Comma-separated origins allowed by the API
//! - `RUST_LOG`: Logging level (default: info)
//! - `RESET_DB`: Set to "true" to wipe stored cycle records on startup

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use pendulum_receiver::acquisition::{
    poll_sensor, AcquisitionError, ConnectRequest, DecodeStep, FrameDecoder, PortOpener,
    SerialPortOpener, SimulatedSensor, SimulatorOpener, SystemClock, SIMULATED_PORT,
};
use pendulum_receiver::api::{create_app, DashboardState};
use pendulum_receiver::config::ReceiverConfig;
use pendulum_receiver::pipeline::Pipeline;
use pendulum_receiver::storage::{CycleStore, SledCycleStore};

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "pendulum-receiver")]
#[command(about = "Pendulum encoder receiver: cycle analysis, storage and live streaming")]
#[command(version)]
struct CliArgs {
    /// HTTP bind address (overrides server.addr)
    #[arg(long, value_name = "HOST:PORT")]
    addr: Option<String>,

    /// Serial port to connect at startup (overrides serial.port)
    #[arg(short, long)]
    port: Option<String>,

    /// Serial baud rate (overrides serial.baud_rate)
    #[arg(long)]
    baud: Option<u32>,

    /// Config file (skips the PENDULUM_CONFIG / ./receiver.toml search)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Use the built-in pendulum simulator instead of serial hardware
    #[arg(long)]
    simulate: bool,

    /// Wipe stored cycle records before starting.
    /// Can also be set via RESET_DB=true environment variable.
    #[arg(long)]
    reset_db: bool,

    #[command(subcommand)]
    command: Option<SubCommand>,
}

#[derive(Subcommand, Debug)]
enum SubCommand {
    /// Decode frames from a serial port and write them to stdout as CSV
    Dump {
        #[arg(long, default_value = "/dev/ttyUSB0")]
        port: String,

        #[arg(long, default_value_t = 115_200)]
        baud: u32,
    },
}

// ============================================================================
// Database Reset
// ============================================================================

/// Check if database reset is requested via CLI flag or environment variable.
fn should_reset_db(cli_flag: bool) -> bool {
    if cli_flag {
        return true;
    }
    if let Ok(val) = std::env::var("RESET_DB") {
        let val_lower = val.to_lowercase();
        return val_lower == "true" || val_lower == "1" || val_lower == "yes";
    }
    false
}

/// Remove the cycle store directory and all its contents.
fn reset_store(path: &Path) -> Result<()> {
    if !path.exists() {
        info!("Cycle store does not exist, nothing to reset");
        return Ok(());
    }

    warn!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    warn!("  RESET_DB DETECTED - WIPING STORED CYCLE RECORDS");
    warn!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    warn!("  Removing: {}", path.display());

    std::fs::remove_dir_all(path)
        .with_context(|| format!("Failed to remove {}", path.display()))?;

    warn!("  A fresh cycle store will be created on startup.");
    Ok(())
}

// ============================================================================
// Task Names for Supervisor Logging
// ============================================================================

#[derive(Debug, Clone, Copy)]
enum TaskName {
    HttpServer,
    Coordinator,
    SensorPoller,
}

impl std::fmt::Display for TaskName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskName::HttpServer => write!(f, "HttpServer"),
            TaskName::Coordinator => write!(f, "Coordinator"),
            TaskName::SensorPoller => write!(f, "SensorPoller"),
        }
    }
}

/// Spawn the HTTP server task into the JoinSet.
fn spawn_http_server(
    task_set: &mut JoinSet<Result<TaskName>>,
    listener: tokio::net::TcpListener,
    app: axum::Router,
    cancel_token: CancellationToken,
) {
    task_set.spawn(async move {
        info!("[HttpServer] Task starting");

        let result = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                cancel_token.cancelled().await;
                info!("[HttpServer] Received shutdown signal");
            })
            .await;

        match result {
            Ok(()) => {
                info!("[HttpServer] Graceful shutdown complete");
                Ok(TaskName::HttpServer)
            }
            Err(e) => {
                error!("[HttpServer] Server error: {}", e);
                Err(anyhow::anyhow!("HTTP server error: {}", e))
            }
        }
    });
}

/// Run the supervisor loop: monitor tasks, cancel on failure.
async fn run_supervisor(
    task_set: &mut JoinSet<Result<TaskName>>,
    cancel_token: CancellationToken,
) -> Result<()> {
    info!("🔒 Supervisor: All tasks spawned, monitoring...");

    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => {
                info!("🛑 Supervisor: Shutdown signal received");
                break;
            }
            result = task_set.join_next() => {
                match result {
                    Some(Ok(Ok(task_name))) => {
                        info!("🔒 Supervisor: Task {} completed normally", task_name);
                    }
                    Some(Ok(Err(e))) => {
                        error!("🔒 Supervisor: Task failed with error: {}", e);
                        cancel_token.cancel();
                        return Err(e);
                    }
                    Some(Err(e)) => {
                        error!("🔒 Supervisor: Task panicked: {}", e);
                        cancel_token.cancel();
                        return Err(anyhow::anyhow!("Task panicked: {}", e));
                    }
                    None => {
                        info!("🔒 Supervisor: All tasks completed");
                        break;
                    }
                }
            }
        }
    }

    // Let the coordinator print its statistics and the server drain
    let drain = async { while task_set.join_next().await.is_some() {} };
    if tokio::time::timeout(Duration::from_secs(5), drain).await.is_err() {
        warn!("🔒 Supervisor: Tasks still running after 5s, aborting");
        task_set.abort_all();
    }

    Ok(())
}

// ============================================================================
// Receiver
// ============================================================================

async fn run_receiver(config: ReceiverConfig, simulate: bool) -> Result<()> {
    let read_timeout = Duration::from_millis(config.serial.read_timeout_ms);

    let sled_store = Arc::new(
        SledCycleStore::open(&config.storage.path)
            .with_context(|| format!("Failed to open cycle store at {}", config.storage.path.display()))?,
    );
    info!(
        "✓ Cycle store: {} ({} records, {} KB)",
        config.storage.path.display(),
        sled_store.len(),
        sled_store.size_bytes() / 1024
    );
    let store: Arc<dyn CycleStore> = sled_store.clone();

    let opener: Arc<dyn PortOpener> = if simulate {
        info!(
            "🧪 Input: pendulum simulator ({:.2}s period, {:.1}° amplitude)",
            config.simulator.period_secs, config.simulator.amplitude_degrees
        );
        Arc::new(SimulatorOpener::new(
            config.simulator.clone(),
            config.analysis.degrees_per_step,
            read_timeout,
        ))
    } else {
        info!("📥 Input: serial encoder board");
        Arc::new(SerialPortOpener::new(read_timeout))
    };

    // Graceful shutdown via Ctrl+C
    let cancel_token = CancellationToken::new();
    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("🛑 Received Ctrl+C, initiating shutdown...");
        shutdown_token.cancel();
    });

    let pipeline = Pipeline::build(
        &config,
        opener,
        Arc::new(SystemClock),
        store,
        cancel_token.clone(),
    );
    let handle = pipeline.handle.clone();

    info!("🔒 Supervisor: Initializing task monitoring");
    let mut task_set: JoinSet<Result<TaskName>> = JoinSet::new();

    // Task 1: Coordinator
    let coordinator = pipeline.coordinator;
    let coord_cancel = cancel_token.clone();
    task_set.spawn(async move {
        info!("[Coordinator] Task starting");
        let stats = coordinator.run(coord_cancel).await;
        info!("{}", stats);
        Ok(TaskName::Coordinator)
    });

    // Task 2..n: Sensor pollers
    let poll_interval = Duration::from_secs(config.sensors.poll_interval_secs);
    for &kind in &config.sensors.simulated {
        let tx = pipeline.sensor_tx.clone();
        let poll_cancel = cancel_token.clone();
        task_set.spawn(async move {
            poll_sensor(Box::new(SimulatedSensor::new(kind)), poll_interval, tx, poll_cancel).await;
            Ok(TaskName::SensorPoller)
        });
    }
    drop(pipeline.sensor_tx);

    // Task n+1: HTTP server
    let listener = tokio::net::TcpListener::bind(&config.server.addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.server.addr))?;
    info!("✓ HTTP server listening on {}", config.server.addr);
    info!("🎯 Live stream at ws://{}/ws", config.server.addr);
    spawn_http_server(
        &mut task_set,
        listener,
        create_app(DashboardState::new(handle.clone())),
        cancel_token.clone(),
    );

    if let Some(port_name) = config.serial.port.clone() {
        let request = ConnectRequest { port_name, baud_rate: config.serial.baud_rate };
        if let Err(e) = handle.link.connect(request).await {
            // Not fatal: the operator can connect through the API
            warn!("⚠ Startup connect failed: {}", e);
        }
    } else {
        info!("Waiting for a connect request on /api/v1/connect");
    }

    let result = run_supervisor(&mut task_set, cancel_token).await;

    handle.link.disconnect().await;
    if let Err(e) = sled_store.flush() {
        warn!("Failed to flush cycle store: {}", e);
    }
    result
}

// ============================================================================
// CSV Dump
// ============================================================================

/// Decode frames from `port` and write `Timestamp_us,Total_Time_us,Count`
/// rows to stdout until the circuit breaker trips.
fn run_dump(port: &str, baud: u32) -> Result<()> {
    let config = ReceiverConfig::default();
    let request = ConnectRequest { port_name: port.to_string(), baud_rate: baud };
    let source = SerialPortOpener::new(Duration::from_millis(config.serial.read_timeout_ms))
        .open(&request)
        .with_context(|| format!("Failed to open serial port {}", port))?;

    let mut decoder = FrameDecoder::new(
        source,
        SystemClock,
        config.sync.resync_gap_secs,
        config.serial.max_consecutive_errors,
    );

    let mut writer = csv::Writer::from_writer(std::io::stdout());
    writer.write_record(["Timestamp_us", "Total_Time_us", "Count"])?;
    writer.flush()?;

    loop {
        match decoder.step() {
            Ok(DecodeStep::Reading(reading)) => {
                let device_total = decoder.time_sync().device_time(reading.total_micros);
                writer.write_record([
                    (device_total as u32).to_string(),
                    device_total.to_string(),
                    reading.count.to_string(),
                ])?;
                writer.flush()?;
            }
            Ok(_) => {}
            Err(e @ AcquisitionError::CircuitOpen { .. }) => {
                writer.flush()?;
                return Err(e).context("Serial link failed");
            }
            Err(e) => return Err(e.into()),
        }
    }
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr: stdout carries CSV in dump mode
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args = CliArgs::parse();

    if let Some(SubCommand::Dump { port, baud }) = args.command {
        return tokio::task::spawn_blocking(move || run_dump(&port, baud))
            .await
            .context("Dump task panicked")?;
    }

    let mut config = match &args.config {
        Some(path) => ReceiverConfig::load_from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => ReceiverConfig::load(),
    };
    if let Some(addr) = args.addr {
        config.server.addr = addr;
    }
    if let Some(port) = args.port {
        config.serial.port = Some(port);
    }
    if let Some(baud) = args.baud {
        config.serial.baud_rate = baud;
    }
    if args.simulate && config.serial.port.is_none() {
        config.serial.port = Some(SIMULATED_PORT.to_string());
    }
    config.validate().context("Invalid configuration")?;

    // Reset check: BEFORE the store is opened
    if should_reset_db(args.reset_db) {
        reset_store(&config.storage.path)?;
    }

    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!("  Pendulum Receiver v{}", env!("CARGO_PKG_VERSION"));
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!(
        "   Analysis: {}-sample buffer | {}°/step | {:?} records",
        config.analysis.buffer_capacity,
        config.analysis.degrees_per_step,
        config.analysis.record_cadence
    );
    info!("");

    run_receiver(config, args.simulate).await?;

    info!("");
    info!("✓ Pendulum receiver shutdown complete");
    Ok(())
}

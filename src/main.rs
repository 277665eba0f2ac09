//! Automatic door controller
//!
//! Drives a stepper-motor door from two presence sensors, keeps the room
//! occupancy count, switches the light relay and reports each entry to the
//! collector. Runs on a Raspberry Pi (sysfs GPIO) or fully simulated.
//!
//! Module structure:
//! - `domain/` - Door, detection and passage types
//! - `io/` - GPIO backends, hardware errors, telemetry client
//! - `services/` - Stepper, door motion, occupancy, detector, report worker
//! - `infra/` - Config, Metrics

use anyhow::Context;
use auto_door::infra::{Config, GpioBackend, Metrics};
use auto_door::io::{CountReporter, DoorPins, LogOnlyReporter, SimTaps, TelemetryReporter};
use auto_door::services::{create_report_worker, DoorController, ReportSender};
use clap::Parser;
use embedded_hal::digital::{InputPin, OutputPin};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Sensor pulse length for stdin commands without an explicit duration
const SIM_PULSE_MS: u64 = 300;

/// Automatic door controller
#[derive(Parser, Debug)]
#[command(name = "auto-door", version, about)]
struct Args {
    /// Path to TOML configuration file (default: $CONFIG_FILE or config/dev.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// Override the GPIO backend from the config file
    #[arg(long, value_enum)]
    backend: Option<BackendArg>,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum BackendArg {
    Sysfs,
    Simulated,
}

impl From<BackendArg> for GpioBackend {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::Sysfs => GpioBackend::Sysfs,
            BackendArg::Simulated => GpioBackend::Simulated,
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize structured logging with configurable level via RUST_LOG env var
    // Default: INFO, use RUST_LOG=trace for per-step motor activity
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false);
    if args.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    info!("auto-door starting");

    let config_path = args.config.clone().unwrap_or_else(Config::resolve_config_path);
    let mut config = Config::load_from_path(&config_path);
    if let Some(backend) = args.backend {
        config = config.with_gpio_backend(backend.into());
    }

    info!(
        config_file = %config.config_file(),
        site = %config.site_id(),
        backend = %config.gpio_backend().as_str(),
        outer_sensor = %config.outer_sensor_pin(),
        inner_sensor = %config.inner_sensor_pin(),
        motor = ?config.motor_pins(),
        relay = %config.relay_pin(),
        rotation_speed = %config.rotation_speed(),
        step_interval_us = %config.step_interval().as_micros(),
        confirmation_window_ms = %config.confirmation_window_ms(),
        cooldown_ms = %config.cooldown_ms(),
        telemetry_enabled = %config.telemetry_enabled(),
        collector_url = %config.collector_url(),
        "config_loaded"
    );

    let metrics = Arc::new(Metrics::new());

    // Telemetry worker keeps network I/O off the detection loop
    let (reports, worker_handle) = if config.telemetry_enabled() {
        spawn_report_worker(Arc::new(TelemetryReporter::new(&config)), &config, &metrics)
    } else {
        spawn_report_worker(Arc::new(LogOnlyReporter), &config, &metrics)
    };

    // Periodic metrics summary
    let metrics_clone = metrics.clone();
    let metrics_interval = config.metrics_interval_secs();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(metrics_interval));
        // First tick fires immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            metrics_clone.report().log();
        }
    });

    // Create shutdown signal, flipped on Ctrl+C
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        let _ = shutdown_tx.send(true);
    });

    let result = match config.gpio_backend() {
        GpioBackend::Sysfs => {
            let pins = DoorPins::open_sysfs(&config).context("failed to open gpio lines")?;
            run_controller(pins, &config, reports, metrics.clone(), shutdown_rx).await
        }
        GpioBackend::Simulated => {
            let (pins, taps) = DoorPins::simulated();
            spawn_stdin_sensors(taps);
            info!("simulated_gpio_ready: type `outer` or `inner` (optionally with a pulse length in ms)");
            run_controller(pins, &config, reports, metrics.clone(), shutdown_rx).await
        }
    };

    // Controller (and its report sender) is gone: let the worker flush
    let flush_timeout = Duration::from_millis(config.telemetry_timeout_ms() * 2);
    if tokio::time::timeout(flush_timeout, worker_handle).await.is_err() {
        warn!("report_worker_flush_timeout");
    }

    metrics.report().log();

    match result {
        Ok(()) => {
            info!("auto-door shutdown complete");
            // The stdin reader sits in a blocking read that would hold up runtime teardown
            if config.gpio_backend() == GpioBackend::Simulated {
                std::process::exit(0);
            }
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "auto-door stopped on hardware failure");
            Err(e).context("hardware failure")
        }
    }
}

/// Spawn the telemetry worker for `reporter`
fn spawn_report_worker<R: CountReporter + 'static>(
    reporter: Arc<R>,
    config: &Config,
    metrics: &Arc<Metrics>,
) -> (ReportSender, JoinHandle<()>) {
    let (sender, worker) =
        create_report_worker(reporter, metrics.clone(), config.telemetry_queue_size());
    let handle = tokio::spawn(worker.run());
    (sender, handle)
}

/// Initialize the outputs and run the detection loop until shutdown
async fn run_controller<I: InputPin, O: OutputPin>(
    pins: DoorPins<I, O>,
    config: &Config,
    reports: ReportSender,
    metrics: Arc<Metrics>,
    shutdown: watch::Receiver<bool>,
) -> Result<(), auto_door::io::HardwareError> {
    let mut controller = DoorController::new(pins, config, reports, metrics);

    if let Err(e) = controller.initialize().await {
        error!(error = %e, "controller_init_failed");
        controller.shutdown();
        return Err(e);
    }

    controller.run(shutdown).await
}

/// Pulse simulated sensors from stdin lines: `outer [ms]` / `inner [ms]`
fn spawn_stdin_sensors(taps: SimTaps) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let mut parts = line.split_whitespace();
            let (name, sensor) = match parts.next() {
                Some("outer") => ("outer", &taps.outer_sensor),
                Some("inner") => ("inner", &taps.inner_sensor),
                Some("status") => {
                    info!(
                        light_on = %taps.light_on(),
                        energized_coils = %taps.energized_coils(),
                        "sim_status"
                    );
                    continue;
                }
                Some(other) => {
                    warn!(command = %other, "sim_unknown_command");
                    continue;
                }
                None => continue,
            };

            let duration_ms = parts.next().and_then(|ms| ms.parse().ok()).unwrap_or(SIM_PULSE_MS);
            sensor.pulse(Duration::from_millis(duration_ms));
            info!(sensor = %name, duration_ms = %duration_ms, "sim_sensor_pulsed");
        }
    });
}

//! Mock occupancy collector
//!
//! Stands in for the dashboard backend so the controller can be bench tested
//! without the real collector.
//!
//! Behavior:
//! 1. Listens on a configurable port (default 5000)
//! 2. `POST /api/people` with `{"jumlah_orang": n}` -> 201
//! 3. Missing or non-numeric `jumlah_orang` -> 400
//! 4. With `--fail-status <code>` every report is answered with that status
//!
//! Usage:
//!   cargo run --bin mock-collector -- --port 5000
//!   cargo run --bin mock-collector -- --fail-status 503

use auto_door::io::collector::{serve, CollectorState};
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "mock-collector")]
#[command(about = "Mock occupancy collector for local testing")]
struct Args {
    /// TCP port to listen on
    #[arg(short, long, default_value = "5000")]
    port: u16,

    /// Answer every report with this HTTP status instead of 201
    #[arg(long)]
    fail_status: Option<u16>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    let args = Args::parse();

    let state = match args.fail_status {
        Some(status) => Arc::new(CollectorState::failing_with(status)),
        None => Arc::new(CollectorState::new()),
    };

    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    let listener = TcpListener::bind(addr).await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        let _ = shutdown_tx.send(true);
    });

    serve(listener, state.clone(), shutdown_rx).await?;

    let received = state.received();
    info!(reports = %received.len(), last_count = ?received.last(), "mock_collector_stopped");
    Ok(())
}

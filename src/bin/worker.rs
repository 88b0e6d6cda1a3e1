//! Cipherwatch Worker
//!
//! Runs one evaluation pass per finalized candle bucket and, when
//! `CIPHERWATCH_HTTP_PORT` is set, serves health, metrics and the latest
//! run report.

use cipherwatch::config::{get_environment, Config};
use cipherwatch::core::http::{start_server, AppState};
use cipherwatch::core::runtime::SignalRuntime;
use cipherwatch::core::scheduler::JobScheduler;
use cipherwatch::logging;
use cipherwatch::metrics::Metrics;
use dotenvy::dotenv;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    logging::init_logging();

    let config = Config::from_env()?;
    config.validate()?;

    info!("Starting Cipherwatch Worker");
    info!(environment = %get_environment(), "Environment");

    let symbols = config.active_symbols();
    if symbols.is_empty() {
        warn!("No symbols to evaluate, set CIPHERWATCH_SYMBOLS");
    } else {
        info!(symbols = ?symbols, "Symbols: {}", symbols.join(", "));
    }
    info!(
        width_minutes = config.bucket_width_minutes,
        grace_minutes = config.finality_grace_minutes,
        dedup_mode = %config.dedup_mode,
        policy = %config.signal_policy,
        ma_type = %config.ma_type,
        "Signal evaluation settings"
    );

    let metrics = Arc::new(Metrics::new()?);
    let runtime = Arc::new(SignalRuntime::from_config(&config)?.with_metrics(metrics.clone()));

    if let Some(port) = config.http_port {
        let state = AppState::new(metrics.clone(), runtime.latest_report());
        tokio::spawn(async move {
            if let Err(e) = start_server(port, state).await {
                error!(error = %e, "Status server stopped");
            }
        });
    }

    info!("Starting job scheduler...");
    let scheduler = JobScheduler::new(
        runtime.clone(),
        config.bucket_width_minutes,
        config.finality_grace_minutes,
    )?;
    scheduler.start().await;

    info!("Worker started, waiting for shutdown signal...");
    signal::ctrl_c().await?;

    info!("Shutting down worker, letting any running pass dispatch and flush...");
    scheduler.stop().await;
    info!("Worker stopped");

    Ok(())
}

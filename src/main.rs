//! Run one evaluation pass and exit.

use chrono::Utc;
use cipherwatch::config::{get_environment, Config};
use cipherwatch::core::runtime::SignalRuntime;
use cipherwatch::logging;
use cipherwatch::metrics::Metrics;
use dotenvy::dotenv;
use std::sync::Arc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    logging::init_logging();

    let config = Config::from_env()?;
    config.validate()?;
    info!(environment = %get_environment(), "Starting single evaluation pass");

    if config.active_symbols().is_empty() {
        warn!("No symbols configured, set CIPHERWATCH_SYMBOLS");
    }

    let runtime = SignalRuntime::from_config(&config)?.with_metrics(Arc::new(Metrics::new()?));
    let report = runtime.run_pass(Utc::now()).await;

    for warning in &report.warnings {
        warn!(warning = %warning, "Cache warning");
    }
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}

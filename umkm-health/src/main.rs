//! UMKM Health - financial health assessment service.
//!
//! Serves `POST /predict`: ratios, health tier and recommendation for one
//! set of business figures.

use anyhow::{Context, Result};
use umkm_common::config::Config;
use umkm_common::logging::init_logging_with_exclusions;
use umkm_health::HealthService;

#[tokio::main]
async fn main() -> Result<()> {
    // Start timing immediately for cold-start measurement
    let startup_start = std::time::Instant::now();

    let config = Config::load_with_env()?;

    init_logging_with_exclusions(
        &config.observability.log_level,
        &config.observability.log_format,
        &config.observability.excluded_targets,
    );

    config.validate().context("Invalid configuration")?;

    tracing::info!("UMKM Health v{}", env!("CARGO_PKG_VERSION"));

    let service = HealthService::new(config)?;

    let startup_duration = startup_start.elapsed();
    tracing::info!(
        duration_ms = startup_duration.as_millis() as u64,
        "Service initialized in {:?}",
        startup_duration
    );

    service.start().await
}

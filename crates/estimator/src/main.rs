//! Resource Estimator - percentile-based resource recommendations
//!
//! This binary serves container CPU and memory estimations for vertical
//! autoscaling, backed by a remote percentile predictor.

use anyhow::Result;
use estimator_lib::{
    observability::{EstimatorMetrics, StructuredLogger},
    HttpPredictor, PercentileResourceEstimator,
};
use resource_estimator::{api, config::EstimatorConfig};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const ESTIMATOR_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting resource-estimator");

    let config = EstimatorConfig::load()?;
    info!(
        instance = %config.instance_name,
        predictor_endpoint = %config.predictor_endpoint,
        "Estimator configured"
    );

    // Register metrics before the first scrape
    let _metrics = EstimatorMetrics::new();

    let logger = StructuredLogger::new(&config.instance_name);
    logger.log_startup(ESTIMATOR_VERSION, &config.predictor_endpoint);

    let predictor = Arc::new(HttpPredictor::new(config.predictor())?);
    let estimator = Arc::new(PercentileResourceEstimator::new(predictor));
    let app_state = Arc::new(api::AppState::new(estimator));
    app_state.set_ready(true);

    let api_handle = tokio::spawn(api::serve(config.api_port, app_state.clone()));

    tokio::select! {
        result = api_handle => {
            match result {
                Ok(Ok(())) => info!("API server stopped"),
                Ok(Err(e)) => error!(error = %e, "API server failed"),
                Err(e) => error!(error = %e, "API server task panicked"),
            }
        }
        signal = tokio::signal::ctrl_c() => {
            signal?;
            app_state.set_ready(false);
            logger.log_shutdown("SIGINT received");
        }
    }

    info!("Shutting down");
    Ok(())
}

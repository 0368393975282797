//! Estimator service configuration

use anyhow::Result;
use estimator_lib::HttpPredictorConfig;
use serde::Deserialize;
use std::time::Duration;

/// Service configuration, read from `ESTIMATOR_*` environment variables
#[derive(Debug, Clone, Deserialize)]
pub struct EstimatorConfig {
    /// Instance name used in lifecycle logs
    #[serde(default = "default_instance_name")]
    pub instance_name: String,

    /// API server port for estimations, health and metrics
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Base URL of the percentile predictor
    #[serde(default = "default_predictor_endpoint")]
    pub predictor_endpoint: String,

    /// Predictor request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_instance_name() -> String {
    std::env::var("POD_NAME").unwrap_or_else(|_| "resource-estimator".to_string())
}

fn default_api_port() -> u16 {
    8080
}

fn default_predictor_endpoint() -> String {
    "http://predictor:8080".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

impl EstimatorConfig {
    /// Load configuration from the environment
    pub fn load() -> Result<Self> {
        Self::from_source(config::Environment::with_prefix("ESTIMATOR"))
    }

    fn from_source<S>(source: S) -> Result<Self>
    where
        S: config::Source + Send + Sync + 'static,
    {
        let config = config::Config::builder().add_source(source).build()?;
        Ok(config.try_deserialize()?)
    }

    pub fn predictor(&self) -> HttpPredictorConfig {
        HttpPredictorConfig {
            endpoint: self.predictor_endpoint.clone(),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
        }
    }
}

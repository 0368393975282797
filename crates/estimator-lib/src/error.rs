//! Error types for resource estimation

use thiserror::Error;

/// Why an estimation could not be produced
#[derive(Debug, Error)]
pub enum EstimationError {
    /// An override value cannot be understood
    #[error("invalid value {value:?} for {field}: {reason}")]
    Configuration {
        field: String,
        value: String,
        reason: String,
    },

    /// The predictor call itself failed
    #[error("prediction query failed for {key}: {source:#}")]
    Query {
        key: String,
        #[source]
        source: anyhow::Error,
    },

    /// The predictor has no samples for the query yet
    #[error("no value returned for query {key}")]
    NoData { key: String },

    /// The predictor returned a value that cannot be a resource amount
    #[error("invalid predicted value {value} for query {key}")]
    InvalidSample { key: String, value: f64 },
}

impl EstimationError {
    /// Short stable label for metrics and API responses
    pub fn kind(&self) -> &'static str {
        match self {
            EstimationError::Configuration { .. } => "configuration",
            EstimationError::Query { .. } => "query",
            EstimationError::NoData { .. } => "no_data",
            EstimationError::InvalidSample { .. } => "invalid_sample",
        }
    }

    /// Query key the error relates to, if any
    pub fn query_key(&self) -> Option<&str> {
        match self {
            EstimationError::Configuration { .. } => None,
            EstimationError::Query { key, .. }
            | EstimationError::NoData { key }
            | EstimationError::InvalidSample { key, .. } => Some(key),
        }
    }
}

pub type Result<T> = std::result::Result<T, EstimationError>;

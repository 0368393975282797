//! Estimator library for percentile-based container resource recommendations
//!
//! This crate provides the core functionality for:
//! - Resolving prediction configuration from operator overrides
//! - Naming standing predictor queries per container resource
//! - Turning predicted percentiles into CPU and memory quantities
//! - Cleaning up queries when an autoscaler object goes away

pub mod config;
pub mod error;
pub mod estimator;
pub mod models;
pub mod naming;
pub mod observability;
pub mod predictor;

pub use config::{ModelInitMode, PredictionConfig, ResourceOverrides};
pub use error::EstimationError;
pub use estimator::{PercentileResourceEstimator, ResourceEstimator};
pub use models::*;
pub use naming::QueryIdentity;
pub use observability::{EstimatorMetrics, StructuredLogger};
pub use predictor::{HttpPredictor, HttpPredictorConfig, Predictor};

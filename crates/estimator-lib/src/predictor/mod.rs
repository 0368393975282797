//! Percentile predictor capability
//!
//! The estimator never computes percentiles itself; it issues named standing
//! queries against a predictor that owns the histogram models.

mod http;

pub use http::{HttpPredictor, HttpPredictorConfig};

use crate::config::PredictionConfig;
use crate::models::TimeSeries;
use crate::naming::QueryIdentity;
use anyhow::Result;
use async_trait::async_trait;

/// Query interface of a percentile predictor
#[async_trait]
pub trait Predictor: Send + Sync {
    /// Latest predicted values of the query named by `identity`
    ///
    /// Registers the query on first use; re-issuing it is idempotent.
    async fn query_latest_predicted_values(
        &self,
        caller: &str,
        config: &PredictionConfig,
        identity: &QueryIdentity,
    ) -> Result<Vec<TimeSeries>>;

    /// Remove a standing query; succeeds if the query does not exist
    async fn delete_query(&self, identity: &QueryIdentity, caller: &str) -> Result<()>;
}

//! Resource estimation for vertical autoscaling

mod percentile;

pub use percentile::{convert_sample, PercentileResourceEstimator};

use crate::error::EstimationError;
use crate::models::{EstimationTarget, ResourceList, ResourceRequirements};
use async_trait::async_trait;
use std::collections::HashMap;

/// Produces resource recommendations for the containers of an autoscaled workload
#[async_trait]
pub trait ResourceEstimator: Send + Sync {
    /// Recommend CPU and memory for `container_name` of `target`
    ///
    /// `overrides` is the operator's string-keyed tuning map. Either every
    /// resource is estimated or an error is returned.
    async fn get_resource_estimation(
        &self,
        target: &EstimationTarget,
        overrides: &HashMap<String, String>,
        container_name: &str,
        current_resources: Option<&ResourceRequirements>,
    ) -> Result<ResourceList, EstimationError>;

    /// Release everything held on behalf of `target`; never fails
    async fn delete_estimation(&self, target: &EstimationTarget);
}

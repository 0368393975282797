//! Query identities for container resource predictions
//!
//! A query is named purely from what it measures, so the same
//! (namespace, workload, container, resource) stream always maps to the same
//! key and can be found again for deletion without any bookkeeping. The
//! caller tag scopes the query to one autoscaler object instance.

use crate::models::{EstimationTarget, ResourceKind};
use serde::{Deserialize, Serialize};

/// Prefix of every caller tag issued by the estimator
pub const CALLER_PREFIX: &str = "EVPACaller";

/// Metric type segment of container query keys
const CONTAINER_METRIC_TYPE: &str = "container";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryIdentity {
    /// Canonical key of the predicted series
    pub key: String,
    /// Owner of the query on the predictor side
    pub caller: String,
}

/// Caller tag for an owner: `EVPACaller-<owner_ref>-<owner_uid>`
pub fn caller_tag(owner_ref: &str, owner_uid: &str) -> String {
    format!("{}-{}-{}", CALLER_PREFIX, owner_ref, owner_uid)
}

/// Key of a container resource series; independent of any caller
pub fn query_key(namespace: &str, workload: &str, container: &str, kind: ResourceKind) -> String {
    format!(
        "{}/{}/{}/{}/{}",
        CONTAINER_METRIC_TYPE,
        namespace,
        workload,
        container,
        kind.as_str()
    )
}

impl QueryIdentity {
    pub fn new(
        namespace: &str,
        workload: &str,
        container: &str,
        kind: ResourceKind,
        owner_ref: &str,
        owner_uid: &str,
    ) -> Self {
        Self {
            key: query_key(namespace, workload, container, kind),
            caller: caller_tag(owner_ref, owner_uid),
        }
    }

    /// Identity of `container`'s `kind` query on behalf of `target`
    pub fn for_target(target: &EstimationTarget, container: &str, kind: ResourceKind) -> Self {
        Self::new(
            &target.namespace,
            target.workload_name(),
            container,
            kind,
            &target.object_ref(),
            &target.uid,
        )
    }
}

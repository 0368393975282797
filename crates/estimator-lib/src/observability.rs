//! Observability infrastructure for the resource estimator
//!
//! Provides:
//! - Prometheus metrics (estimation latency and outcomes, query deletions, last recommendations)
//! - Structured JSON logging with tracing

use crate::models::{Quantity, ResourceKind};
use prometheus::{
    register_gauge_vec, register_histogram, register_int_counter_vec, GaugeVec, Histogram,
    IntCounterVec,
};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Mutex, OnceLock};
use tracing::info;

/// Histogram buckets for estimation latency (in seconds); dominated by predictor round trips
const LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<EstimatorMetricsInner> = OnceLock::new();

struct EstimatorMetricsInner {
    estimation_latency_seconds: Histogram,
    estimations_total: IntCounterVec,
    query_deletes_total: IntCounterVec,
    recommended_value: GaugeVec,
    /// Label sets of `recommended_value` per owner, for removal on delete
    recommended_series: Mutex<HashMap<String, BTreeSet<Vec<String>>>>,
}

impl EstimatorMetricsInner {
    fn new() -> Self {
        Self {
            estimation_latency_seconds: register_histogram!(
                "resource_estimator_estimation_latency_seconds",
                "Time spent producing a container resource estimation",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register estimation_latency_seconds"),

            estimations_total: register_int_counter_vec!(
                "resource_estimator_estimations_total",
                "Estimation requests by outcome",
                &["result"]
            )
            .expect("Failed to register estimations_total"),

            query_deletes_total: register_int_counter_vec!(
                "resource_estimator_query_deletes_total",
                "Prediction query deletions by outcome",
                &["result"]
            )
            .expect("Failed to register query_deletes_total"),

            recommended_value: register_gauge_vec!(
                "resource_estimator_recommended_value",
                "Last recommended amount per container resource (cores or bytes)",
                &["owner", "namespace", "workload", "container", "resource"]
            )
            .expect("Failed to register recommended_value"),

            recommended_series: Mutex::new(HashMap::new()),
        }
    }
}

/// Estimator metrics for Prometheus exposition
///
/// Lightweight handle to the global metrics instance; clones share it.
#[derive(Clone)]
pub struct EstimatorMetrics {
    _private: (),
}

impl Default for EstimatorMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl EstimatorMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(EstimatorMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &EstimatorMetricsInner {
        GLOBAL_METRICS.get_or_init(EstimatorMetricsInner::new)
    }

    pub fn observe_estimation_latency(&self, duration_secs: f64) {
        self.inner().estimation_latency_seconds.observe(duration_secs);
    }

    /// Count one estimation outcome (`ok` or an error kind)
    pub fn inc_estimation(&self, result: &str) {
        self.inner()
            .estimations_total
            .with_label_values(&[result])
            .inc();
    }

    pub fn inc_query_delete(&self, success: bool) {
        let result = if success { "ok" } else { "error" };
        self.inner()
            .query_deletes_total
            .with_label_values(&[result])
            .inc();
    }

    /// Record the latest recommendation in natural units (cores, bytes)
    ///
    /// Series are keyed by `owner` so objects targeting the same workload do
    /// not overwrite each other.
    pub fn set_recommendation(
        &self,
        owner: &str,
        namespace: &str,
        workload: &str,
        container: &str,
        kind: ResourceKind,
        quantity: Quantity,
    ) {
        let value = quantity.milli_value() as f64 / 1000.0;
        let labels = [owner, namespace, workload, container, kind.as_str()];
        self.inner()
            .recommended_value
            .with_label_values(&labels)
            .set(value);

        let mut series = self
            .inner()
            .recommended_series
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        series
            .entry(owner.to_string())
            .or_default()
            .insert(labels.iter().map(|l| l.to_string()).collect());
    }

    /// Drop every recommendation series recorded for `owner`
    pub fn clear_recommendations(&self, owner: &str) {
        let removed = self
            .inner()
            .recommended_series
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(owner)
            .unwrap_or_default();
        for labels in removed {
            let labels: Vec<&str> = labels.iter().map(String::as_str).collect();
            let _ = self.inner().recommended_value.remove_label_values(&labels);
        }
    }
}

/// Structured logger for service lifecycle events
#[derive(Clone)]
pub struct StructuredLogger {
    instance: String,
}

impl StructuredLogger {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    pub fn log_startup(&self, version: &str, predictor_endpoint: &str) {
        info!(
            event = "estimator_started",
            instance = %self.instance,
            version = %version,
            predictor_endpoint = %predictor_endpoint,
            "Resource estimator started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "estimator_shutdown",
            instance = %self.instance,
            reason = %reason,
            "Resource estimator shutting down"
        );
    }
}

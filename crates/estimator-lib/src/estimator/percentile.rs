//! Percentile-based container resource estimator
//!
//! Asks the predictor for the latest percentile prediction of each container
//! resource and turns the first sample into a Kubernetes quantity.

use super::ResourceEstimator;
use crate::config::PredictionConfig;
use crate::error::EstimationError;
use crate::models::{
    first_sample, EstimationTarget, Quantity, ResourceKind, ResourceList, ResourceRequirements,
    TimeSeries,
};
use crate::naming::QueryIdentity;
use crate::observability::EstimatorMetrics;
use crate::predictor::Predictor;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Estimator backed by a percentile [`Predictor`]
pub struct PercentileResourceEstimator {
    predictor: Arc<dyn Predictor>,
    metrics: EstimatorMetrics,
}

impl PercentileResourceEstimator {
    pub fn new(predictor: Arc<dyn Predictor>) -> Self {
        Self {
            predictor,
            metrics: EstimatorMetrics::new(),
        }
    }

    async fn estimate_resource(
        &self,
        target: &EstimationTarget,
        overrides: &HashMap<String, String>,
        container_name: &str,
        kind: ResourceKind,
    ) -> Result<Quantity, EstimationError> {
        let identity = QueryIdentity::for_target(target, container_name, kind);
        let config = PredictionConfig::resolve(overrides, kind)?;
        config.validate(kind)?;

        let series = self
            .predictor
            .query_latest_predicted_values(&identity.caller, &config, &identity)
            .await
            .map_err(|e| EstimationError::Query {
                key: identity.key.clone(),
                source: e,
            })?;

        let quantity = convert_sample(kind, &identity.key, &series)?;
        debug!(
            query_key = %identity.key,
            resource = %kind,
            quantity = %quantity,
            predicted_at = ?first_sample(&series).and_then(|s| s.timestamp_utc()),
            "Estimated container resource"
        );
        Ok(quantity)
    }

    /// Delete one query, reporting whether it succeeded
    async fn delete_query(&self, identity: &QueryIdentity) -> bool {
        match self.predictor.delete_query(identity, &identity.caller).await {
            Ok(()) => {
                self.metrics.inc_query_delete(true);
                true
            }
            Err(e) => {
                self.metrics.inc_query_delete(false);
                error!(query_key = %identity.key, error = %e, "Failed to delete query");
                false
            }
        }
    }
}

/// Convert the first predicted sample into a quantity of `kind`
///
/// CPU predictions are cores and become milli-cores, memory predictions are
/// bytes. Both truncate toward zero.
pub fn convert_sample(
    kind: ResourceKind,
    key: &str,
    series: &[TimeSeries],
) -> Result<Quantity, EstimationError> {
    let sample = first_sample(series).ok_or_else(|| EstimationError::NoData {
        key: key.to_string(),
    })?;

    let value = sample.value;
    if !value.is_finite() || value < 0.0 {
        return Err(EstimationError::InvalidSample {
            key: key.to_string(),
            value,
        });
    }

    Ok(match kind {
        ResourceKind::Cpu => Quantity::Milli((value * 1000.0) as i64),
        ResourceKind::Memory => Quantity::Bytes(value as i64),
    })
}

#[async_trait]
impl ResourceEstimator for PercentileResourceEstimator {
    async fn get_resource_estimation(
        &self,
        target: &EstimationTarget,
        overrides: &HashMap<String, String>,
        container_name: &str,
        _current_resources: Option<&ResourceRequirements>,
    ) -> Result<ResourceList, EstimationError> {
        let start = Instant::now();
        let mut recommendation = ResourceList::new();

        let mut outcome = Ok(());
        for kind in ResourceKind::ALL {
            match self
                .estimate_resource(target, overrides, container_name, kind)
                .await
            {
                Ok(quantity) => {
                    recommendation.insert(kind, quantity);
                }
                Err(e) => {
                    outcome = Err(e);
                    break;
                }
            }
        }

        self.metrics
            .observe_estimation_latency(start.elapsed().as_secs_f64());

        match outcome {
            Ok(()) => {
                self.metrics.inc_estimation("ok");
                let owner = target.object_ref();
                for (kind, quantity) in &recommendation {
                    self.metrics.set_recommendation(
                        &owner,
                        &target.namespace,
                        target.workload_name(),
                        container_name,
                        *kind,
                        *quantity,
                    );
                }
                Ok(recommendation)
            }
            Err(e) => {
                self.metrics.inc_estimation(e.kind());
                warn!(
                    target = %target.object_ref(),
                    container = %container_name,
                    error = %e,
                    "Resource estimation failed"
                );
                Err(e)
            }
        }
    }

    async fn delete_estimation(&self, target: &EstimationTarget) {
        let mut failed = 0usize;
        let mut attempted = 0usize;

        for policy in &target.container_policies {
            for kind in ResourceKind::ALL {
                let identity = QueryIdentity::for_target(target, &policy.container_name, kind);
                attempted += 1;
                if !self.delete_query(&identity).await {
                    failed += 1;
                }
            }
        }
        self.metrics.clear_recommendations(&target.object_ref());

        info!(
            target = %target.object_ref(),
            attempted = attempted,
            failed = failed,
            "Deleted estimation queries"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelInitMode;
    use crate::models::{ContainerPolicy, Sample, TargetRef};
    use std::collections::HashSet;
    use std::sync::Mutex;

    /// Recorded query call: (caller, config, key)
    type QueryCall = (String, PredictionConfig, String);

    /// Predictor stub answering from a fixed table
    #[derive(Default)]
    struct StubPredictor {
        values: HashMap<String, Vec<TimeSeries>>,
        failing_queries: HashSet<String>,
        failing_deletes: HashSet<String>,
        queries: Mutex<Vec<QueryCall>>,
        deletes: Mutex<Vec<(String, String)>>,
    }

    impl StubPredictor {
        fn with_value(mut self, key: &str, value: f64) -> Self {
            self.values.insert(key.to_string(), vec![series(&[value])]);
            self
        }

        fn with_series(mut self, key: &str, series: Vec<TimeSeries>) -> Self {
            self.values.insert(key.to_string(), series);
            self
        }

        fn failing_query(mut self, key: &str) -> Self {
            self.failing_queries.insert(key.to_string());
            self
        }

        fn failing_delete(mut self, key: &str) -> Self {
            self.failing_deletes.insert(key.to_string());
            self
        }

        fn queried_keys(&self) -> Vec<String> {
            self.queries
                .lock()
                .unwrap()
                .iter()
                .map(|(_, _, key)| key.clone())
                .collect()
        }
    }

    #[async_trait]
    impl Predictor for StubPredictor {
        async fn query_latest_predicted_values(
            &self,
            caller: &str,
            config: &PredictionConfig,
            identity: &QueryIdentity,
        ) -> anyhow::Result<Vec<TimeSeries>> {
            self.queries.lock().unwrap().push((
                caller.to_string(),
                config.clone(),
                identity.key.clone(),
            ));
            if self.failing_queries.contains(&identity.key) {
                anyhow::bail!("predictor unavailable");
            }
            Ok(self.values.get(&identity.key).cloned().unwrap_or_default())
        }

        async fn delete_query(&self, identity: &QueryIdentity, caller: &str) -> anyhow::Result<()> {
            self.deletes
                .lock()
                .unwrap()
                .push((identity.key.clone(), caller.to_string()));
            if self.failing_deletes.contains(&identity.key) {
                anyhow::bail!("delete rejected");
            }
            Ok(())
        }
    }

    fn series(values: &[f64]) -> TimeSeries {
        TimeSeries {
            labels: vec![],
            samples: values
                .iter()
                .enumerate()
                .map(|(i, v)| Sample {
                    value: *v,
                    timestamp: 1_700_000_000 + i as i64 * 60,
                })
                .collect(),
        }
    }

    fn target(containers: &[&str]) -> EstimationTarget {
        EstimationTarget {
            name: "evpa".to_string(),
            namespace: "ns1".to_string(),
            uid: "uid-1".to_string(),
            target_ref: TargetRef {
                kind: "Deployment".to_string(),
                name: "wl1".to_string(),
            },
            container_policies: containers
                .iter()
                .map(|c| ContainerPolicy {
                    container_name: c.to_string(),
                })
                .collect(),
        }
    }

    const CPU_KEY: &str = "container/ns1/wl1/app/cpu";
    const MEM_KEY: &str = "container/ns1/wl1/app/memory";

    fn estimator(stub: StubPredictor) -> (PercentileResourceEstimator, Arc<StubPredictor>) {
        let stub = Arc::new(stub);
        (PercentileResourceEstimator::new(stub.clone()), stub)
    }

    #[tokio::test]
    async fn test_end_to_end_estimation() {
        let (estimator, stub) = estimator(
            StubPredictor::default()
                .with_value(CPU_KEY, 1.5)
                .with_value(MEM_KEY, 536_870_912.0),
        );
        let overrides: HashMap<String, String> =
            [("cpu-request-percentile".to_string(), "0.95".to_string())].into();

        let result = estimator
            .get_resource_estimation(&target(&["app"]), &overrides, "app", None)
            .await
            .unwrap();

        assert_eq!(result[&ResourceKind::Cpu], Quantity::Milli(1500));
        assert_eq!(result[&ResourceKind::Memory], Quantity::Bytes(536_870_912));
        assert_eq!(result[&ResourceKind::Cpu].to_string(), "1500m");

        let queries = stub.queries.lock().unwrap();
        assert_eq!(queries.len(), 2);

        let (caller, cpu_config, key) = &queries[0];
        assert_eq!(key, CPU_KEY);
        assert_eq!(caller, "EVPACaller-ns1/evpa-uid-1");
        let mut expected = PredictionConfig::resolve(&HashMap::new(), ResourceKind::Cpu).unwrap();
        expected.percentile.percentile = "0.95".to_string();
        assert_eq!(cpu_config, &expected);

        let (_, mem_config, key) = &queries[1];
        assert_eq!(key, MEM_KEY);
        assert_eq!(mem_config.percentile.percentile, "0.99");
        assert_eq!(mem_config.init_mode, ModelInitMode::LazyTraining);
    }

    #[tokio::test]
    async fn test_cpu_converted_to_millicores() {
        let (estimator, _) = estimator(
            StubPredictor::default()
                .with_value(CPU_KEY, 0.25)
                .with_value(MEM_KEY, 104_857_600.0),
        );

        let result = estimator
            .get_resource_estimation(&target(&["app"]), &HashMap::new(), "app", None)
            .await
            .unwrap();

        assert_eq!(result[&ResourceKind::Cpu].milli_value(), 250);
        assert_eq!(result[&ResourceKind::Memory], Quantity::Bytes(104_857_600));
    }

    #[test]
    fn test_conversion_truncates() {
        let cpu = convert_sample(ResourceKind::Cpu, CPU_KEY, &[series(&[0.0019])]).unwrap();
        assert_eq!(cpu, Quantity::Milli(1));

        let mem = convert_sample(ResourceKind::Memory, MEM_KEY, &[series(&[1023.99])]).unwrap();
        assert_eq!(mem, Quantity::Bytes(1023));
    }

    #[test]
    fn test_only_first_sample_of_first_series_used() {
        let data = vec![series(&[2.0, 9.0]), series(&[7.0])];
        let cpu = convert_sample(ResourceKind::Cpu, CPU_KEY, &data).unwrap();
        assert_eq!(cpu, Quantity::Milli(2000));
    }

    #[test]
    fn test_invalid_samples_rejected() {
        for value in [-0.5, f64::NAN, f64::INFINITY] {
            let err = convert_sample(ResourceKind::Cpu, CPU_KEY, &[series(&[value])]).unwrap_err();
            assert_eq!(err.kind(), "invalid_sample");
            assert_eq!(err.query_key(), Some(CPU_KEY));
        }
    }

    #[tokio::test]
    async fn test_empty_series_is_no_data() {
        let (estimator, _) = estimator(StubPredictor::default().with_value(MEM_KEY, 1.0));

        let err = estimator
            .get_resource_estimation(&target(&["app"]), &HashMap::new(), "app", None)
            .await
            .unwrap_err();

        match err {
            EstimationError::NoData { key } => assert_eq!(key, CPU_KEY),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_series_without_samples_is_no_data() {
        let (estimator, _) = estimator(
            StubPredictor::default()
                .with_value(CPU_KEY, 1.0)
                .with_series(MEM_KEY, vec![series(&[])]),
        );

        let err = estimator
            .get_resource_estimation(&target(&["app"]), &HashMap::new(), "app", None)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), "no_data");
        assert_eq!(err.query_key(), Some(MEM_KEY));
    }

    #[tokio::test]
    async fn test_query_failure_carries_key() {
        let (estimator, _) = estimator(
            StubPredictor::default()
                .with_value(CPU_KEY, 1.0)
                .failing_query(MEM_KEY),
        );

        let err = estimator
            .get_resource_estimation(&target(&["app"]), &HashMap::new(), "app", None)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), "query");
        assert_eq!(err.query_key(), Some(MEM_KEY));
        assert!(err.to_string().contains("predictor unavailable"));
        let source = std::error::Error::source(&err).expect("predictor error kept as source");
        assert_eq!(source.to_string(), "predictor unavailable");
    }

    #[tokio::test]
    async fn test_cpu_failure_skips_memory() {
        let (estimator, stub) = estimator(
            StubPredictor::default()
                .failing_query(CPU_KEY)
                .with_value(MEM_KEY, 1.0),
        );

        let result = estimator
            .get_resource_estimation(&target(&["app"]), &HashMap::new(), "app", None)
            .await;

        assert!(result.is_err());
        assert_eq!(stub.queried_keys(), vec![CPU_KEY.to_string()]);
    }

    #[tokio::test]
    async fn test_malformed_override_never_reaches_predictor() {
        let (estimator, stub) = estimator(
            StubPredictor::default()
                .with_value(CPU_KEY, 1.0)
                .with_value(MEM_KEY, 1.0),
        );
        let overrides: HashMap<String, String> =
            [("cpu-sample-interval".to_string(), "often".to_string())].into();

        let err = estimator
            .get_resource_estimation(&target(&["app"]), &overrides, "app", None)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), "configuration");
        assert!(stub.queried_keys().is_empty());
    }

    #[tokio::test]
    async fn test_delete_continues_past_failures() {
        let (estimator, stub) = estimator(
            StubPredictor::default().failing_delete("container/ns1/wl1/second/cpu"),
        );

        estimator
            .delete_estimation(&target(&["first", "second", "third"]))
            .await;

        let deletes = stub.deletes.lock().unwrap();
        let keys: Vec<&str> = deletes.iter().map(|(key, _)| key.as_str()).collect();
        assert_eq!(
            keys,
            vec![
                "container/ns1/wl1/first/cpu",
                "container/ns1/wl1/first/memory",
                "container/ns1/wl1/second/cpu",
                "container/ns1/wl1/second/memory",
                "container/ns1/wl1/third/cpu",
                "container/ns1/wl1/third/memory",
            ]
        );
        assert!(deletes
            .iter()
            .all(|(_, caller)| caller == "EVPACaller-ns1/evpa-uid-1"));
    }

    fn recommended_containers(owner: &str) -> Vec<String> {
        let families = prometheus::gather();
        let Some(gauge) = families
            .iter()
            .find(|f| f.get_name() == "resource_estimator_recommended_value")
        else {
            return vec![];
        };
        gauge
            .get_metric()
            .iter()
            .filter(|m| {
                m.get_label()
                    .iter()
                    .any(|l| l.get_name() == "owner" && l.get_value() == owner)
            })
            .filter_map(|m| {
                m.get_label()
                    .iter()
                    .find(|l| l.get_name() == "container")
                    .map(|l| l.get_value().to_string())
            })
            .collect()
    }

    #[tokio::test]
    async fn test_delete_clears_recommendations_of_owner_only() {
        let (estimator, _) = estimator(
            StubPredictor::default()
                .with_value("container/ns1/wl1/sidecar/cpu", 0.1)
                .with_value("container/ns1/wl1/sidecar/memory", 1024.0),
        );
        let mut first = target(&["app"]);
        first.name = "gauge-first".to_string();
        let mut second = target(&["app"]);
        second.name = "gauge-second".to_string();

        // The sidecar is not listed in either policy set
        for owner in [&first, &second] {
            estimator
                .get_resource_estimation(owner, &HashMap::new(), "sidecar", None)
                .await
                .unwrap();
        }
        assert_eq!(recommended_containers("ns1/gauge-first").len(), 2);
        assert_eq!(recommended_containers("ns1/gauge-second").len(), 2);

        estimator.delete_estimation(&first).await;

        assert!(recommended_containers("ns1/gauge-first").is_empty());
        assert_eq!(
            recommended_containers("ns1/gauge-second"),
            vec!["sidecar".to_string(), "sidecar".to_string()]
        );
        estimator.delete_estimation(&second).await;
    }

    #[tokio::test]
    async fn test_delete_without_policies_is_noop() {
        let (estimator, stub) = estimator(StubPredictor::default());

        estimator.delete_estimation(&target(&[])).await;

        assert!(stub.deletes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_repeated_estimations_reuse_identity() {
        let (estimator, stub) = estimator(
            StubPredictor::default()
                .with_value(CPU_KEY, 1.0)
                .with_value(MEM_KEY, 1.0),
        );
        let target = target(&["app"]);

        for _ in 0..2 {
            estimator
                .get_resource_estimation(&target, &HashMap::new(), "app", None)
                .await
                .unwrap();
        }

        let keys = stub.queried_keys();
        assert_eq!(keys, vec![CPU_KEY, MEM_KEY, CPU_KEY, MEM_KEY]);
    }
}

//! HTTP client for a remote percentile predictor
//!
//! Speaks a small JSON protocol:
//! - `POST /v1/queries/latest` with `{caller, queryKey, config}` returns `{series}`
//! - `DELETE /v1/queries/{queryKey}?caller=...` removes a standing query

use super::Predictor;
use crate::config::PredictionConfig;
use crate::models::TimeSeries;
use crate::naming::QueryIdentity;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Configuration for the predictor client
#[derive(Debug, Clone)]
pub struct HttpPredictorConfig {
    /// Base URL of the predictor (e.g., "http://predictor:8080")
    pub endpoint: String,
    /// Per-request timeout
    pub request_timeout: Duration,
}

impl Default for HttpPredictorConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://predictor:8080".to_string(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LatestRequest<'a> {
    caller: &'a str,
    query_key: &'a str,
    config: &'a PredictionConfig,
}

#[derive(Debug, Deserialize)]
struct LatestResponse {
    #[serde(default)]
    series: Vec<TimeSeries>,
}

/// [`Predictor`] backed by a remote service
pub struct HttpPredictor {
    client: Client,
    base_url: Url,
}

impl HttpPredictor {
    pub fn new(config: HttpPredictorConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(&config.endpoint).context("Invalid predictor URL")?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!("Predictor URL cannot be a base: {}", config.endpoint);
        }

        Ok(Self { client, base_url })
    }

    /// URL with `segments` appended to the base path, each percent-encoded
    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("Predictor URL cannot be a base"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

#[async_trait]
impl Predictor for HttpPredictor {
    async fn query_latest_predicted_values(
        &self,
        caller: &str,
        config: &PredictionConfig,
        identity: &QueryIdentity,
    ) -> Result<Vec<TimeSeries>> {
        let url = self.url(&["v1", "queries", "latest"])?;
        let body = LatestRequest {
            caller,
            query_key: &identity.key,
            config,
        };

        let response = self
            .client
            .post(url)
            .json(&body)
            .send()
            .await
            .context("Failed to send request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Predictor error ({}): {}", status, body);
        }

        let parsed: LatestResponse = response.json().await.context("Failed to parse response")?;
        debug!(query_key = %identity.key, series = parsed.series.len(), "Fetched predicted values");
        Ok(parsed.series)
    }

    async fn delete_query(&self, identity: &QueryIdentity, caller: &str) -> Result<()> {
        let mut url = self.url(&["v1", "queries", &identity.key])?;
        url.query_pairs_mut().append_pair("caller", caller);

        let response = self
            .client
            .delete(url)
            .send()
            .await
            .context("Failed to send request")?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            debug!(query_key = %identity.key, "Query already absent");
            return Ok(());
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Predictor error ({}): {}", status, body);
        }
        Ok(())
    }
}

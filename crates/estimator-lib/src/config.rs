//! Prediction configuration resolution
//!
//! Operators tune the percentile predictor through a flat string map on the
//! autoscaler object. This module turns that map into a fully populated
//! [`PredictionConfig`] for one resource kind, falling back to per-kind
//! defaults for every key that is absent.

use crate::error::EstimationError;
use crate::models::ResourceKind;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_SAMPLE_INTERVAL: &str = "1m";
pub const DEFAULT_REQUEST_PERCENTILE: &str = "0.99";
pub const DEFAULT_MARGIN_FRACTION: &str = "0.15";

const CPU_HISTORY_LENGTH: &str = "24h";
const CPU_HALF_LIFE: &str = "24h";
const CPU_BUCKET_SIZE: &str = "0.1";
const CPU_MAX_VALUE: &str = "100";

const MEM_HISTORY_LENGTH: &str = "48h";
const MEM_HALF_LIFE: &str = "48h";
const MEM_BUCKET_SIZE: &str = "104857600";
const MEM_MAX_VALUE: &str = "104857600000";

/// How the predictor builds a model before enough history exists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelInitMode {
    /// Train from samples as they arrive
    #[default]
    #[serde(rename = "lazytraining")]
    LazyTraining,
    /// Bootstrap from stored history
    History,
}

impl ModelInitMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelInitMode::LazyTraining => "lazytraining",
            ModelInitMode::History => "history",
        }
    }
}

impl fmt::Display for ModelInitMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelInitMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "lazytraining" => Ok(ModelInitMode::LazyTraining),
            "history" => Ok(ModelInitMode::History),
            other => Err(format!("unknown model init mode {:?}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistogramConfig {
    pub half_life: String,
    pub bucket_size: String,
    pub max_value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PercentileConfig {
    pub aggregated: bool,
    pub history_length: String,
    pub sample_interval: String,
    pub margin_fraction: String,
    pub percentile: String,
    pub histogram: HistogramConfig,
}

/// Fully specified request configuration for one percentile query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionConfig {
    pub init_mode: ModelInitMode,
    pub percentile: PercentileConfig,
}

/// Overrides for one resource kind, lifted out of the raw string map
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceOverrides {
    pub sample_interval: Option<String>,
    pub request_percentile: Option<String>,
    pub margin_fraction: Option<String>,
    pub init_mode: Option<String>,
    pub history_length: Option<String>,
}

impl ResourceOverrides {
    /// Pick this kind's keys (`<prefix>-sample-interval`, ...) from `map`
    pub fn from_map(map: &HashMap<String, String>, kind: ResourceKind) -> Self {
        let prefix = kind.override_prefix();
        let get = |suffix: &str| map.get(&format!("{}-{}", prefix, suffix)).cloned();
        Self {
            sample_interval: get("sample-interval"),
            request_percentile: get("request-percentile"),
            margin_fraction: get("request-margin-fraction"),
            init_mode: get("model-init-mode"),
            history_length: get("model-history-length"),
        }
    }

    /// Override map key for a tunable of `kind`
    pub fn key(kind: ResourceKind, suffix: &str) -> String {
        format!("{}-{}", kind.override_prefix(), suffix)
    }
}

impl PredictionConfig {
    /// Resolve the configuration for `kind` from the operator's override map
    pub fn resolve(
        overrides: &HashMap<String, String>,
        kind: ResourceKind,
    ) -> Result<Self, EstimationError> {
        Self::from_overrides(ResourceOverrides::from_map(overrides, kind), kind)
    }

    pub fn from_overrides(
        overrides: ResourceOverrides,
        kind: ResourceKind,
    ) -> Result<Self, EstimationError> {
        let init_mode = match overrides.init_mode {
            Some(raw) => raw.parse::<ModelInitMode>().map_err(|reason| EstimationError::Configuration {
                field: ResourceOverrides::key(kind, "model-init-mode"),
                value: raw,
                reason,
            })?,
            None => ModelInitMode::default(),
        };

        let (history_length, histogram) = match kind {
            ResourceKind::Cpu => (
                CPU_HISTORY_LENGTH,
                HistogramConfig {
                    half_life: CPU_HALF_LIFE.to_string(),
                    bucket_size: CPU_BUCKET_SIZE.to_string(),
                    max_value: CPU_MAX_VALUE.to_string(),
                },
            ),
            ResourceKind::Memory => (
                MEM_HISTORY_LENGTH,
                HistogramConfig {
                    half_life: MEM_HALF_LIFE.to_string(),
                    bucket_size: MEM_BUCKET_SIZE.to_string(),
                    max_value: MEM_MAX_VALUE.to_string(),
                },
            ),
        };

        Ok(Self {
            init_mode,
            percentile: PercentileConfig {
                aggregated: true,
                history_length: overrides
                    .history_length
                    .unwrap_or_else(|| history_length.to_string()),
                sample_interval: overrides
                    .sample_interval
                    .unwrap_or_else(|| DEFAULT_SAMPLE_INTERVAL.to_string()),
                margin_fraction: overrides
                    .margin_fraction
                    .unwrap_or_else(|| DEFAULT_MARGIN_FRACTION.to_string()),
                percentile: overrides
                    .request_percentile
                    .unwrap_or_else(|| DEFAULT_REQUEST_PERCENTILE.to_string()),
                histogram,
            },
        })
    }

    /// Check that every opaque string parses the way the predictor expects
    ///
    /// `kind` only selects the override key names used in the error.
    pub fn validate(&self, kind: ResourceKind) -> Result<(), EstimationError> {
        let p = &self.percentile;
        let invalid = |suffix: &str, value: &str, reason: &str| EstimationError::Configuration {
            field: ResourceOverrides::key(kind, suffix),
            value: value.to_string(),
            reason: reason.to_string(),
        };

        for (suffix, value) in [
            ("sample-interval", &p.sample_interval),
            ("model-history-length", &p.history_length),
        ] {
            match parse_duration(value) {
                Some(d) if !d.is_zero() => {}
                _ => return Err(invalid(suffix, value, "expected a positive duration such as 1m or 24h")),
            }
        }
        if parse_duration(&p.histogram.half_life).map_or(true, |d| d.is_zero()) {
            return Err(invalid("histogram-half-life", &p.histogram.half_life, "expected a positive duration"));
        }

        match p.percentile.parse::<f64>() {
            Ok(v) if v > 0.0 && v <= 1.0 => {}
            _ => return Err(invalid("request-percentile", &p.percentile, "expected a number in (0, 1]")),
        }
        match p.margin_fraction.parse::<f64>() {
            Ok(v) if v >= 0.0 && v.is_finite() => {}
            _ => {
                return Err(invalid(
                    "request-margin-fraction",
                    &p.margin_fraction,
                    "expected a non-negative number",
                ))
            }
        }

        let bucket = p.histogram.bucket_size.parse::<f64>().ok().filter(|v| *v > 0.0);
        let max = p.histogram.max_value.parse::<f64>().ok().filter(|v| *v > 0.0);
        match (bucket, max) {
            (Some(b), Some(m)) if b <= m => Ok(()),
            (None, _) => Err(invalid("histogram-bucket-size", &p.histogram.bucket_size, "expected a positive number")),
            (_, None) => Err(invalid("histogram-max-value", &p.histogram.max_value, "expected a positive number")),
            _ => Err(invalid(
                "histogram-bucket-size",
                &p.histogram.bucket_size,
                "bucket size exceeds histogram max value",
            )),
        }
    }
}

/// Parse a Go-style duration string (`90s`, `1m`, `1h30m`, `1.5h`)
pub fn parse_duration(s: &str) -> Option<Duration> {
    if s.is_empty() {
        return None;
    }
    if s == "0" {
        return Some(Duration::ZERO);
    }

    let mut total = 0f64;
    let mut rest = s;
    while !rest.is_empty() {
        let num_end = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if num_end == 0 {
            return None;
        }
        let value: f64 = rest[..num_end].parse().ok()?;
        rest = &rest[num_end..];

        let unit_end = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let nanos_per_unit = match &rest[..unit_end] {
            "ns" => 1.0,
            "us" | "µs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60e9,
            "h" => 3600e9,
            _ => return None,
        };
        rest = &rest[unit_end..];
        total += value * nanos_per_unit;
    }

    if !total.is_finite() || total > u64::MAX as f64 {
        return None;
    }
    Some(Duration::from_nanos(total as u64))
}

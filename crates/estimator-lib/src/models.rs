//! Core data models for the resource estimator

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Resources the estimator produces recommendations for
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Cpu,
    Memory,
}

impl ResourceKind {
    /// Every kind, in the order estimations are computed
    pub const ALL: [ResourceKind; 2] = [ResourceKind::Cpu, ResourceKind::Memory];

    /// Canonical resource name as used by Kubernetes
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Cpu => "cpu",
            ResourceKind::Memory => "memory",
        }
    }

    /// Prefix used for this kind's keys in the override map
    pub fn override_prefix(&self) -> &'static str {
        match self {
            ResourceKind::Cpu => "cpu",
            ResourceKind::Memory => "mem",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reference to the workload under autoscaling
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetRef {
    #[serde(default)]
    pub kind: String,
    pub name: String,
}

/// Per-container policy declared on the autoscaler object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerPolicy {
    pub container_name: String,
}

/// The vertical autoscaler object asking for estimations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EstimationTarget {
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    pub uid: String,
    pub target_ref: TargetRef,
    #[serde(default)]
    pub container_policies: Vec<ContainerPolicy>,
}

impl EstimationTarget {
    /// `namespace/name` reference used in caller tags and logs
    pub fn object_ref(&self) -> String {
        if self.namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}/{}", self.namespace, self.name)
        }
    }

    /// Name of the workload whose containers are estimated
    pub fn workload_name(&self) -> &str {
        &self.target_ref.name
    }
}

/// A single predicted sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub value: f64,
    /// Unix timestamp in seconds
    pub timestamp: i64,
}

impl Sample {
    /// Time the prediction was made for
    pub fn timestamp_utc(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.timestamp, 0).single()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub name: String,
    pub value: String,
}

/// One series returned by the predictor
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TimeSeries {
    #[serde(default)]
    pub labels: Vec<Label>,
    #[serde(default)]
    pub samples: Vec<Sample>,
}

/// First sample of the first series, the only one estimations consume
pub fn first_sample(series: &[TimeSeries]) -> Option<&Sample> {
    series.first().and_then(|ts| ts.samples.first())
}

/// A resource amount in Kubernetes quantity semantics
///
/// CPU is held in milli-cores and rendered in decimal SI, memory is held in
/// bytes and rendered in binary SI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quantity {
    Milli(i64),
    Bytes(i64),
}

const BINARY_SUFFIXES: [(&str, i64); 6] = [
    ("Ei", 1 << 60),
    ("Pi", 1 << 50),
    ("Ti", 1 << 40),
    ("Gi", 1 << 30),
    ("Mi", 1 << 20),
    ("Ki", 1 << 10),
];

impl Quantity {
    /// Value in milli-units
    pub fn milli_value(&self) -> i64 {
        match self {
            Quantity::Milli(m) => *m,
            Quantity::Bytes(b) => b.saturating_mul(1000),
        }
    }

    /// Parse a Kubernetes quantity string (`250m`, `1.5`, `512Mi`, `1.5Gi`, `1G`, `1k`)
    ///
    /// Results finer than the kind's unit (milli-core, byte) are rounded to
    /// the nearest unit. Negative amounts are rejected.
    pub fn parse(kind: ResourceKind, s: &str) -> Option<Self> {
        let s = s.trim();
        let split = s
            .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == '+'))
            .unwrap_or(s.len());
        let (mantissa, suffix) = s.split_at(split);
        if mantissa.is_empty() {
            return None;
        }
        let mantissa: f64 = mantissa.parse().ok()?;
        let scale = suffix_scale(suffix)?;

        let units = mantissa * scale;
        let amount = match kind {
            ResourceKind::Cpu => units * 1000.0,
            ResourceKind::Memory => units,
        };
        if !amount.is_finite() || amount < 0.0 || amount > i64::MAX as f64 {
            return None;
        }
        let amount = amount.round() as i64;
        Some(match kind {
            ResourceKind::Cpu => Quantity::Milli(amount),
            ResourceKind::Memory => Quantity::Bytes(amount),
        })
    }
}

/// Multiplier of a quantity suffix, decimal or binary SI
fn suffix_scale(suffix: &str) -> Option<f64> {
    if let Some((_, scale)) = BINARY_SUFFIXES.iter().find(|(s, _)| *s == suffix) {
        return Some(*scale as f64);
    }
    let scale = match suffix {
        "" => 1.0,
        "m" => 1e-3,
        "k" => 1e3,
        "M" => 1e6,
        "G" => 1e9,
        "T" => 1e12,
        "P" => 1e15,
        "E" => 1e18,
        _ => return None,
    };
    Some(scale)
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Quantity::Milli(m) if m % 1000 == 0 => write!(f, "{}", m / 1000),
            Quantity::Milli(m) => write!(f, "{}m", m),
            Quantity::Bytes(0) => f.write_str("0"),
            Quantity::Bytes(b) => {
                for (suffix, scale) in BINARY_SUFFIXES {
                    if b % scale == 0 {
                        return write!(f, "{}{}", b / scale, suffix);
                    }
                }
                write!(f, "{}", b)
            }
        }
    }
}

impl Serialize for Quantity {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Recommended (or current) amounts per resource
pub type ResourceList = BTreeMap<ResourceKind, Quantity>;

/// Current requests and limits of a container
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResourceRequirements {
    pub requests: ResourceList,
    pub limits: ResourceList,
}

/// Wire form of [`ResourceRequirements`] with string quantities
#[derive(Debug, Clone, Default, Deserialize)]
struct RawRequirements {
    #[serde(default)]
    requests: BTreeMap<ResourceKind, String>,
    #[serde(default)]
    limits: BTreeMap<ResourceKind, String>,
}

fn parse_list<E: serde::de::Error>(raw: BTreeMap<ResourceKind, String>) -> Result<ResourceList, E> {
    raw.into_iter()
        .map(|(kind, s)| {
            Quantity::parse(kind, &s)
                .map(|q| (kind, q))
                .ok_or_else(|| E::custom(format!("invalid {} quantity {:?}", kind, s)))
        })
        .collect()
}

impl<'de> Deserialize<'de> for ResourceRequirements {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = RawRequirements::deserialize(deserializer)?;
        Ok(Self {
            requests: parse_list(raw.requests)?,
            limits: parse_list(raw.limits)?,
        })
    }
}

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProbeError;

/// The four health signals combined by the supervisor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Signal {
    Dataset,
    Resource,
    LogIntegrity,
    Governance,
}

impl Signal {
    pub const ALL: [Signal; 4] = [
        Signal::Dataset,
        Signal::Resource,
        Signal::LogIntegrity,
        Signal::Governance,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Signal::Dataset => "dataset",
            Signal::Resource => "resource",
            Signal::LogIntegrity => "log_integrity",
            Signal::Governance => "governance",
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One measured sub-score with the raw metrics behind it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProbeReading {
    /// Normalized sub-score in `[0, 100]`.
    pub score: f64,
    pub metrics: BTreeMap<String, f64>,
    pub detail: Option<String>,
}

impl ProbeReading {
    pub fn new(score: f64) -> Self {
        Self {
            score: if score.is_nan() {
                0.0
            } else {
                score.clamp(0.0, 100.0)
            },
            metrics: BTreeMap::new(),
            detail: None,
        }
    }

    pub fn with_metric(mut self, name: impl Into<String>, value: f64) -> Self {
        self.metrics.insert(name.into(), value);
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// A health signal source. Sampling must be side-effect free towards the
/// system being measured, so an in-flight sample can be abandoned.
#[async_trait]
pub trait IntegrityProbe: Send + Sync {
    fn signal(&self) -> Signal;

    async fn sample(&self) -> Result<ProbeReading, ProbeError>;
}

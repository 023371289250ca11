use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use warden_probes::{ProbeError, ProbeReading, Signal};

use crate::config::{StatusThresholds, SupervisorConfig, Weights};
use crate::error::ConfigError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IntegrityStatus {
    Safe,
    Degraded,
    Blocked,
}

impl IntegrityStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntegrityStatus::Safe => "SAFE",
            IntegrityStatus::Degraded => "DEGRADED",
            IntegrityStatus::Blocked => "BLOCKED",
        }
    }
}

impl fmt::Display for IntegrityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One signal in the score breakdown.
///
/// Unavailable components are listed with score 0 and their reason but do
/// not contribute to the composite.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ComponentReport {
    pub signal: Signal,
    pub score: f64,
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Stable error code when unavailable (`probe_unavailable`, `probe_timeout`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    pub metrics: BTreeMap<String, f64>,
    pub weight: f64,
    /// Weight after renormalization over available components.
    pub effective_weight: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IntegrityScore {
    pub components: BTreeMap<Signal, ComponentReport>,
    pub weights: Weights,
    pub composite: f64,
    pub status: IntegrityStatus,
    pub computed_at: DateTime<Utc>,
    /// Sum of configured weights over available components.
    pub available_weight: f64,
    /// Too little weight answered to classify. `status` is then BLOCKED.
    pub insufficient_evidence: bool,
    /// Latch state as of this evaluation.
    pub shadow_mode_disabled: bool,
}

impl IntegrityScore {
    pub fn component(&self, signal: Signal) -> Option<&ComponentReport> {
        self.components.get(&signal)
    }

    pub fn unavailable(&self) -> impl Iterator<Item = &ComponentReport> {
        self.components.values().filter(|c| !c.available)
    }
}

/// Pure combination of probe outcomes into an [`IntegrityScore`].
#[derive(Clone, Debug)]
pub struct IntegrityScorer {
    weights: Weights,
    thresholds: StatusThresholds,
    min_available_weight: f64,
}

impl IntegrityScorer {
    pub fn new(weights: Weights, thresholds: StatusThresholds) -> Result<Self, ConfigError> {
        weights.validate()?;
        thresholds.validate()?;
        Ok(Self {
            weights,
            thresholds,
            min_available_weight: 0.0,
        })
    }

    pub fn from_config(config: &SupervisorConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            weights: config.weights,
            thresholds: config.thresholds,
            min_available_weight: config.min_available_weight,
        })
    }

    pub fn with_min_available_weight(mut self, min: f64) -> Self {
        self.min_available_weight = min.clamp(0.0, 1.0);
        self
    }

    pub fn weights(&self) -> &Weights {
        &self.weights
    }

    pub fn thresholds(&self) -> &StatusThresholds {
        &self.thresholds
    }

    /// Score probe outcomes. Signals absent from `readings` count as
    /// unavailable.
    pub fn score(
        &self,
        readings: &BTreeMap<Signal, Result<ProbeReading, ProbeError>>,
    ) -> IntegrityScore {
        let mut components = BTreeMap::new();
        let mut available_weight = 0.0;
        let mut weighted_sum = 0.0;

        for signal in Signal::ALL {
            let weight = self.weights.get(signal);
            let report = match readings.get(&signal) {
                Some(Ok(reading)) => {
                    available_weight += weight;
                    weighted_sum += weight * reading.score;
                    ComponentReport {
                        signal,
                        score: reading.score,
                        available: true,
                        reason: reading.detail.clone(),
                        error_code: None,
                        metrics: reading.metrics.clone(),
                        weight,
                        effective_weight: 0.0,
                    }
                }
                Some(Err(e)) => unavailable(signal, weight, e.to_string(), e.code()),
                None => unavailable(signal, weight, "no probe registered".into(), "probe_unavailable"),
            };
            components.insert(signal, report);
        }

        let composite = if available_weight > 0.0 {
            (weighted_sum / available_weight).clamp(0.0, 100.0)
        } else {
            0.0
        };
        for report in components.values_mut().filter(|c| c.available) {
            report.effective_weight = if available_weight > 0.0 {
                report.weight / available_weight
            } else {
                0.0
            };
        }

        let insufficient_evidence =
            available_weight <= 0.0 || available_weight < self.min_available_weight;
        let status = if insufficient_evidence {
            IntegrityStatus::Blocked
        } else {
            self.thresholds.classify(composite)
        };

        IntegrityScore {
            components,
            weights: self.weights,
            composite,
            status,
            computed_at: Utc::now(),
            available_weight,
            insufficient_evidence,
            shadow_mode_disabled: false,
        }
    }
}

fn unavailable(signal: Signal, weight: f64, reason: String, code: &str) -> ComponentReport {
    ComponentReport {
        signal,
        score: 0.0,
        available: false,
        reason: Some(reason),
        error_code: Some(code.to_string()),
        metrics: BTreeMap::new(),
        weight,
        effective_weight: 0.0,
    }
}

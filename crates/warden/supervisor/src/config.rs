use std::time::Duration;

use serde::{Deserialize, Serialize};
use warden_probes::Signal;

use crate::error::ConfigError;
use crate::score::IntegrityStatus;

const WEIGHT_TOLERANCE: f64 = 1e-6;

/// Fixed weight per signal. Must be non-negative and sum to 1.0.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Weights {
    pub dataset: f64,
    pub resource: f64,
    pub log_integrity: f64,
    pub governance: f64,
}

impl Default for Weights {
    fn default() -> Self {
        Self {
            dataset: 0.25,
            resource: 0.25,
            log_integrity: 0.25,
            governance: 0.25,
        }
    }
}

impl Weights {
    pub fn get(&self, signal: Signal) -> f64 {
        match signal {
            Signal::Dataset => self.dataset,
            Signal::Resource => self.resource,
            Signal::LogIntegrity => self.log_integrity,
            Signal::Governance => self.governance,
        }
    }

    pub fn total(&self) -> f64 {
        Signal::ALL.iter().map(|s| self.get(*s)).sum()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for signal in Signal::ALL {
            let w = self.get(signal);
            if !w.is_finite() || w < 0.0 {
                return Err(ConfigError::InvalidWeights(format!(
                    "{signal} weight {w} must be finite and non-negative"
                )));
            }
        }
        let total = self.total();
        if (total - 1.0).abs() > WEIGHT_TOLERANCE {
            return Err(ConfigError::InvalidWeights(format!(
                "weights sum to {total}, expected 1.0"
            )));
        }
        Ok(())
    }
}

/// Composite cut points: `SAFE` at or above `safe_at`, `BLOCKED` below
/// `blocked_below`, `DEGRADED` in between.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusThresholds {
    pub safe_at: f64,
    pub blocked_below: f64,
}

impl Default for StatusThresholds {
    fn default() -> Self {
        Self {
            safe_at: 95.0,
            blocked_below: 70.0,
        }
    }
}

impl StatusThresholds {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let ordered = 0.0 <= self.blocked_below
            && self.blocked_below < self.safe_at
            && self.safe_at <= 100.0;
        if !ordered {
            return Err(ConfigError::InvalidThresholds(format!(
                "need 0 <= blocked_below ({}) < safe_at ({}) <= 100",
                self.blocked_below, self.safe_at
            )));
        }
        Ok(())
    }

    pub fn classify(&self, composite: f64) -> IntegrityStatus {
        if composite >= self.safe_at {
            IntegrityStatus::Safe
        } else if composite >= self.blocked_below {
            IntegrityStatus::Degraded
        } else {
            IntegrityStatus::Blocked
        }
    }
}

/// Supervisor configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    pub weights: Weights,
    pub thresholds: StatusThresholds,
    /// Per-probe budget.
    pub probe_timeout_ms: u64,
    /// Overall evaluation deadline; caps every probe budget.
    pub deadline_ms: u64,
    /// Below this share of available weight the status is forced to `BLOCKED`.
    pub min_available_weight: f64,
    /// Consecutive `BLOCKED` evaluations that latch `shadow_mode_disabled`.
    pub blocked_latch_after: u32,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            weights: Weights::default(),
            thresholds: StatusThresholds::default(),
            probe_timeout_ms: 2_000,
            deadline_ms: 5_000,
            min_available_weight: 0.5,
            blocked_latch_after: 2,
        }
    }
}

impl SupervisorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.weights.validate()?;
        self.thresholds.validate()?;
        if self.probe_timeout_ms == 0 || self.deadline_ms == 0 {
            return Err(ConfigError::InvalidTiming(
                "probe_timeout_ms and deadline_ms must be positive".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.min_available_weight) {
            return Err(ConfigError::InvalidWeights(format!(
                "min_available_weight {} outside [0, 1]",
                self.min_available_weight
            )));
        }
        if self.blocked_latch_after == 0 {
            return Err(ConfigError::InvalidTiming(
                "blocked_latch_after must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Budget each probe actually gets.
    pub fn probe_budget(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms.min(self.deadline_ms))
    }
}

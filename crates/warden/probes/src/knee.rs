use serde::{Deserialize, Serialize};

use crate::error::ProbeError;

/// Linear ramp from 100 at `healthy` to 0 at `saturated`.
///
/// Works in either direction: `healthy < saturated` for "higher is worse"
/// metrics (utilization, latency), `healthy > saturated` for "lower is
/// worse" metrics (free disk).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Knee {
    pub healthy: f64,
    pub saturated: f64,
}

impl Knee {
    pub const fn new(healthy: f64, saturated: f64) -> Self {
        Self { healthy, saturated }
    }

    /// Sub-score in `[0, 100]`, monotone in the pressure direction.
    pub fn score(&self, value: f64) -> f64 {
        if value.is_nan() {
            return 0.0;
        }
        let span = self.saturated - self.healthy;
        let progress = (value - self.healthy) / span;
        (100.0 * (1.0 - progress)).clamp(0.0, 100.0)
    }

    pub fn validate(&self, name: &str) -> Result<(), ProbeError> {
        if !self.healthy.is_finite() || !self.saturated.is_finite() {
            return Err(ProbeError::InvalidConfig(format!(
                "{name}: knee endpoints must be finite"
            )));
        }
        if self.healthy == self.saturated {
            return Err(ProbeError::InvalidConfig(format!(
                "{name}: knee endpoints must differ"
            )));
        }
        Ok(())
    }
}

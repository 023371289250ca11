use serde::{Deserialize, Serialize};

use crate::error::GateError;

/// Capability switches. Both default to off and are fixed for the lifetime
/// of an evaluator.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CapabilityFlags {
    /// Permit destructive actions while in `SHADOW`.
    pub allow_destructive_in_shadow: bool,
    /// Treat the human-online condition as satisfied without a signal.
    pub allow_unattended: bool,
}

/// Immutable evaluator configuration, built once and shared behind an `Arc`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutonomyConfig {
    pub required_approvals: usize,
    /// Ledger action that counts as an approval to enable autonomy.
    pub approval_action: String,
    /// Rolling window for counting approvals.
    pub approval_window_ms: u64,
    /// Count each approving actor once.
    pub distinct_approvers: bool,
    /// Heartbeat lifetime for [`PresenceSignal`](crate::PresenceSignal).
    pub presence_ttl_ms: u64,
    pub capabilities: CapabilityFlags,
}

impl Default for AutonomyConfig {
    fn default() -> Self {
        Self {
            required_approvals: 2,
            approval_action: "enable_autonomy".to_string(),
            approval_window_ms: 24 * 60 * 60 * 1000,
            distinct_approvers: true,
            presence_ttl_ms: 5 * 60 * 1000,
            capabilities: CapabilityFlags::default(),
        }
    }
}

impl AutonomyConfig {
    pub fn validate(&self) -> Result<(), GateError> {
        if self.required_approvals == 0 {
            return Err(GateError::InvalidConfig(
                "required_approvals must be at least 1".into(),
            ));
        }
        if self.approval_action.trim().is_empty() {
            return Err(GateError::InvalidConfig("approval_action is empty".into()));
        }
        if self.approval_window_ms == 0 || self.presence_ttl_ms == 0 {
            return Err(GateError::InvalidConfig(
                "approval_window_ms and presence_ttl_ms must be positive".into(),
            ));
        }
        Ok(())
    }
}

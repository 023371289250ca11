use std::fmt;

use serde::{Deserialize, Serialize};

/// Why the gate said no. Every denial names exactly one of these.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialReason {
    IntegrityDegraded,
    IntegrityBlocked,
    InsufficientApprovals,
    LedgerHalted,
    LogIntegrityGap,
    LogIntegrityBreak,
    HumanOffline,
    ShadowModeDisabled,
    DestructiveActionForbidden,
    AutonomyNotActive,
}

impl DenialReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DenialReason::IntegrityDegraded => "integrity_degraded",
            DenialReason::IntegrityBlocked => "integrity_blocked",
            DenialReason::InsufficientApprovals => "insufficient_approvals",
            DenialReason::LedgerHalted => "ledger_halted",
            DenialReason::LogIntegrityGap => "log_integrity_gap",
            DenialReason::LogIntegrityBreak => "log_integrity_break",
            DenialReason::HumanOffline => "human_offline",
            DenialReason::ShadowModeDisabled => "shadow_mode_disabled",
            DenialReason::DestructiveActionForbidden => "destructive_action_forbidden",
            DenialReason::AutonomyNotActive => "autonomy_not_active",
        }
    }
}

impl fmt::Display for DenialReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CheckOutcome {
    Allowed,
    Denied { reason: DenialReason },
    /// The check had no usable evidence. Fails closed like a denial.
    Unavailable { reason: String },
}

impl CheckOutcome {
    pub fn denied(reason: DenialReason) -> Self {
        CheckOutcome::Denied { reason }
    }

    pub fn is_allowed(&self) -> bool {
        matches!(self, CheckOutcome::Allowed)
    }

    pub fn denial(&self) -> Option<DenialReason> {
        match self {
            CheckOutcome::Denied { reason } => Some(*reason),
            _ => None,
        }
    }

    /// Short machine-readable label.
    pub fn label(&self) -> String {
        match self {
            CheckOutcome::Allowed => "allowed".to_string(),
            CheckOutcome::Denied { reason } => reason.as_str().to_string(),
            CheckOutcome::Unavailable { reason } => format!("unavailable: {reason}"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    LedgerHealthy,
    LogIntegrity,
    IntegritySafe,
    ShadowModeAvailable,
    ApprovalQuorum,
    HumanOnline,
}

impl Condition {
    /// Evaluation order. The first failing condition names the denial.
    pub const ALL: [Condition; 6] = [
        Condition::LedgerHealthy,
        Condition::LogIntegrity,
        Condition::IntegritySafe,
        Condition::ShadowModeAvailable,
        Condition::ApprovalQuorum,
        Condition::HumanOnline,
    ];

    /// Denial reported when this condition could not be checked at all.
    pub fn denial_when_unavailable(&self) -> DenialReason {
        match self {
            Condition::LedgerHealthy => DenialReason::LedgerHalted,
            Condition::LogIntegrity => DenialReason::LogIntegrityBreak,
            Condition::IntegritySafe => DenialReason::IntegrityBlocked,
            Condition::ShadowModeAvailable => DenialReason::ShadowModeDisabled,
            Condition::ApprovalQuorum => DenialReason::InsufficientApprovals,
            Condition::HumanOnline => DenialReason::HumanOffline,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConditionReport {
    pub condition: Condition,
    pub outcome: CheckOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ConditionReport {
    pub fn new(condition: Condition, outcome: CheckOutcome) -> Self {
        Self {
            condition,
            outcome,
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

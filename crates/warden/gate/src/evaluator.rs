use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{info, warn};
use warden_ledger::{ApprovalLedger, LedgerStatus};
use warden_probes::LogIntegrityMonitor;
use warden_supervisor::{IntegrityStatus, SystemIntegritySupervisor};
use warden_types::now_ms;

use crate::config::AutonomyConfig;
use crate::error::GateError;
use crate::outcome::{CheckOutcome, Condition, ConditionReport, DenialReason};
use crate::presence::HumanPresence;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AutonomyMode {
    Disabled,
    /// Elevated autonomy, non-destructive actions only unless configured.
    Shadow,
    Blocked,
}

impl fmt::Display for AutonomyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AutonomyMode::Disabled => "DISABLED",
            AutonomyMode::Shadow => "SHADOW",
            AutonomyMode::Blocked => "BLOCKED",
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionClass {
    NonDestructive,
    Destructive,
}

/// Result of the last evaluation, one report per condition.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AutonomyState {
    pub mode: AutonomyMode,
    pub conditions: Vec<ConditionReport>,
    /// `all_conditions_met`, or the label of the first failing condition.
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub denial: Option<DenialReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub composite: Option<f64>,
    pub evaluated_at: DateTime<Utc>,
}

impl AutonomyState {
    fn initial() -> Self {
        Self {
            mode: AutonomyMode::Disabled,
            conditions: Vec::new(),
            reason: "not_evaluated".to_string(),
            denial: None,
            composite: None,
            evaluated_at: Utc::now(),
        }
    }

    pub fn condition(&self, condition: Condition) -> Option<&ConditionReport> {
        self.conditions.iter().find(|c| c.condition == condition)
    }

    pub fn failing(&self) -> impl Iterator<Item = &ConditionReport> {
        self.conditions.iter().filter(|c| !c.outcome.is_allowed())
    }
}

/// Gate combining live integrity, ledger approvals, log continuity and
/// human presence into the autonomy mode.
///
/// Conditions are checked in [`Condition::ALL`] order: direct tamper
/// evidence (ledger, log chain) before the aggregate score, so the reported
/// reason names the most specific cause.
pub struct AutonomyConditionEvaluator {
    config: Arc<AutonomyConfig>,
    supervisor: Arc<SystemIntegritySupervisor>,
    ledger: Arc<ApprovalLedger>,
    log_monitor: Arc<LogIntegrityMonitor>,
    presence: Arc<dyn HumanPresence>,
    state: Mutex<AutonomyState>,
}

impl AutonomyConditionEvaluator {
    pub fn new(
        config: Arc<AutonomyConfig>,
        supervisor: Arc<SystemIntegritySupervisor>,
        ledger: Arc<ApprovalLedger>,
        log_monitor: Arc<LogIntegrityMonitor>,
        presence: Arc<dyn HumanPresence>,
    ) -> Result<Self, GateError> {
        config.validate()?;
        Ok(Self {
            config,
            supervisor,
            ledger,
            log_monitor,
            presence,
            state: Mutex::new(AutonomyState::initial()),
        })
    }

    pub fn config(&self) -> &AutonomyConfig {
        &self.config
    }

    pub async fn mode(&self) -> AutonomyMode {
        self.state.lock().await.mode
    }

    pub async fn state(&self) -> AutonomyState {
        self.state.lock().await.clone()
    }

    /// Re-check every condition and transition. All pass: `SHADOW`.
    /// Anything else: `BLOCKED`.
    pub async fn evaluate(&self) -> AutonomyState {
        let mut state = self.state.lock().await;
        self.evaluate_locked(&mut state).await;
        state.clone()
    }

    async fn evaluate_locked(&self, state: &mut MutexGuard<'_, AutonomyState>) {
        let (conditions, composite) = self.check_all().await;
        let first_failure = conditions.iter().find(|c| !c.outcome.is_allowed());
        let (mode, denial, reason) = match first_failure {
            None => (AutonomyMode::Shadow, None, "all_conditions_met".to_string()),
            Some(failed) => (
                AutonomyMode::Blocked,
                failed
                    .outcome
                    .denial()
                    .or(Some(failed.condition.denial_when_unavailable())),
                failed.outcome.label(),
            ),
        };

        if mode != state.mode {
            match mode {
                AutonomyMode::Shadow => info!(from = %state.mode, "autonomy entering SHADOW"),
                _ => warn!(from = %state.mode, reason = %reason, "autonomy forced to BLOCKED"),
            }
        }

        **state = AutonomyState {
            mode,
            conditions,
            reason,
            denial,
            composite,
            evaluated_at: Utc::now(),
        };
    }

    async fn check_all(&self) -> (Vec<ConditionReport>, Option<f64>) {
        let score = self.supervisor.evaluate().await;
        let mut reports = Vec::with_capacity(Condition::ALL.len());

        for condition in Condition::ALL {
            let report = match condition {
                Condition::LedgerHealthy => self.check_ledger().await,
                Condition::LogIntegrity => self.check_log(),
                Condition::IntegritySafe if score.insufficient_evidence => {
                    ConditionReport::new(
                        condition,
                        CheckOutcome::Unavailable {
                            reason: format!(
                                "available weight {:.2} below {:.2}",
                                score.available_weight,
                                self.supervisor.config().min_available_weight
                            ),
                        },
                    )
                    .with_detail(format!(
                        "{} of {} components unavailable",
                        score.unavailable().count(),
                        score.components.len()
                    ))
                }
                Condition::IntegritySafe => {
                    let outcome = match score.status {
                        IntegrityStatus::Safe => CheckOutcome::Allowed,
                        IntegrityStatus::Degraded => {
                            CheckOutcome::denied(DenialReason::IntegrityDegraded)
                        }
                        IntegrityStatus::Blocked => {
                            CheckOutcome::denied(DenialReason::IntegrityBlocked)
                        }
                    };
                    ConditionReport::new(condition, outcome).with_detail(format!(
                        "composite {:.1} ({})",
                        score.composite, score.status
                    ))
                }
                Condition::ShadowModeAvailable => {
                    let outcome = if score.shadow_mode_disabled {
                        CheckOutcome::denied(DenialReason::ShadowModeDisabled)
                    } else {
                        CheckOutcome::Allowed
                    };
                    ConditionReport::new(condition, outcome)
                }
                Condition::ApprovalQuorum => self.check_approvals().await,
                Condition::HumanOnline => self.check_presence(),
            };
            reports.push(report);
        }
        (reports, Some(score.composite))
    }

    async fn check_ledger(&self) -> ConditionReport {
        match self.ledger.status().await {
            LedgerStatus::Ready => ConditionReport::new(Condition::LedgerHealthy, CheckOutcome::Allowed),
            LedgerStatus::Halted {
                first_invalid_index,
                reason,
            } => ConditionReport::new(
                Condition::LedgerHealthy,
                CheckOutcome::denied(DenialReason::LedgerHalted),
            )
            .with_detail(format!("{reason} at index {first_invalid_index}")),
        }
    }

    fn check_log(&self) -> ConditionReport {
        let report = self.log_monitor.verify();
        if let Some(seq) = report.first_break {
            ConditionReport::new(
                Condition::LogIntegrity,
                CheckOutcome::denied(DenialReason::LogIntegrityBreak),
            )
            .with_detail(format!("hash chain break at seq {seq}"))
        } else if report.has_gap() {
            ConditionReport::new(
                Condition::LogIntegrity,
                CheckOutcome::denied(DenialReason::LogIntegrityGap),
            )
            .with_detail(format!("missing seq {:?}", report.gaps))
        } else {
            ConditionReport::new(Condition::LogIntegrity, CheckOutcome::Allowed)
        }
    }

    async fn check_approvals(&self) -> ConditionReport {
        let since = now_ms().saturating_sub(self.config.approval_window_ms);
        let approvals = self
            .ledger
            .valid_approvals(Some(&self.config.approval_action), Some(since))
            .await;
        let count = if self.config.distinct_approvers {
            approvals
                .iter()
                .map(|t| t.actor_id.as_str())
                .collect::<HashSet<_>>()
                .len()
        } else {
            approvals.len()
        };
        let outcome = if count >= self.config.required_approvals {
            CheckOutcome::Allowed
        } else {
            CheckOutcome::denied(DenialReason::InsufficientApprovals)
        };
        ConditionReport::new(Condition::ApprovalQuorum, outcome)
            .with_detail(format!("{count}/{} valid approvals", self.config.required_approvals))
    }

    fn check_presence(&self) -> ConditionReport {
        if self.presence.is_online() {
            ConditionReport::new(Condition::HumanOnline, CheckOutcome::Allowed)
        } else if self.config.capabilities.allow_unattended {
            ConditionReport::new(Condition::HumanOnline, CheckOutcome::Allowed)
                .with_detail("unattended operation allowed")
        } else {
            ConditionReport::new(
                Condition::HumanOnline,
                CheckOutcome::denied(DenialReason::HumanOffline),
            )
        }
    }

    /// May `action` run autonomously right now?
    ///
    /// Only in `SHADOW`, which is re-confirmed against live conditions first.
    /// Does not move the gate out of `DISABLED` or `BLOCKED`; that takes an
    /// explicit [`evaluate`](Self::evaluate).
    pub async fn authorize(&self, action: ActionClass) -> CheckOutcome {
        let mut state = self.state.lock().await;
        match state.mode {
            AutonomyMode::Disabled => return CheckOutcome::denied(DenialReason::AutonomyNotActive),
            AutonomyMode::Blocked => {
                return CheckOutcome::denied(
                    state.denial.unwrap_or(DenialReason::AutonomyNotActive),
                )
            }
            AutonomyMode::Shadow => {}
        }

        self.evaluate_locked(&mut state).await;
        if state.mode != AutonomyMode::Shadow {
            return CheckOutcome::denied(state.denial.unwrap_or(DenialReason::AutonomyNotActive));
        }
        if action == ActionClass::Destructive
            && !self.config.capabilities.allow_destructive_in_shadow
        {
            return CheckOutcome::denied(DenialReason::DestructiveActionForbidden);
        }
        CheckOutcome::Allowed
    }

    /// Operator stand-down. Returns to `DISABLED`.
    pub async fn disable(&self, operator_id: &str) -> AutonomyState {
        let mut state = self.state.lock().await;
        info!(operator = operator_id, from = %state.mode, "autonomy disabled by operator");
        *state = AutonomyState {
            reason: format!("disabled_by_operator:{operator_id}"),
            ..AutonomyState::initial()
        };
        state.clone()
    }
}

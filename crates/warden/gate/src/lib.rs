#![deny(unsafe_code)]
//! # warden-gate
//!
//! Final allow/deny gate for elevated ("shadow") autonomy.
//!
//! [`AutonomyConditionEvaluator`] moves between three modes:
//!
//! ```text
//! DISABLED ──all conditions pass──▶ SHADOW
//!    │                                │ any condition fails
//!    └────any condition fails──▶ BLOCKED ◀┘
//!                                   │ all conditions re-checked and pass
//!                                   └──────────────▶ SHADOW
//! ```
//!
//! The conditions are: integrity status `SAFE`, the supervisor's
//! shadow-mode latch clear, enough valid human approvals in the rolling
//! window, ledger not halted, no unresolved log gap or break, and a human
//! online. Every evaluation re-checks all of them. Denials are values
//! ([`CheckOutcome::Denied`]) carrying an enumerable [`DenialReason`].

pub mod config;
pub mod error;
pub mod evaluator;
pub mod outcome;
pub mod presence;

pub use config::{AutonomyConfig, CapabilityFlags};
pub use error::GateError;
pub use evaluator::{ActionClass, AutonomyConditionEvaluator, AutonomyMode, AutonomyState};
pub use outcome::{CheckOutcome, Condition, ConditionReport, DenialReason};
pub use presence::{HumanPresence, PresenceSignal};

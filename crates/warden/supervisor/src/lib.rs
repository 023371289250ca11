#![deny(unsafe_code)]
//! # warden-supervisor
//!
//! Combines the four integrity signals into one composite score.
//!
//! ```text
//! probes ──sample (bounded)──▶ IntegrityScorer ──▶ IntegrityScore { composite, status }
//! ```
//!
//! Scores are recomputed from live probes on every evaluation and never
//! cached as authoritative state. A probe that fails or times out is
//! excluded and the remaining weights are renormalized; it is never read
//! as a pass.

pub mod config;
pub mod error;
pub mod score;
pub mod supervisor;

pub use config::{StatusThresholds, SupervisorConfig, Weights};
pub use error::{ConfigError, SupervisorError};
pub use score::{ComponentReport, IntegrityScore, IntegrityScorer, IntegrityStatus};
pub use supervisor::SystemIntegritySupervisor;
pub use warden_probes::Signal;

#![deny(unsafe_code)]
//! # warden-probes
//!
//! Independent health signals feeding the integrity supervisor.
//!
//! | Signal | Source |
//! |---|---|
//! | `resource` | [`ResourceMonitor`]: GPU, disk, IO latency, memory pressure |
//! | `dataset` | [`DatasetIntegrityWatchdog`]: imbalance, KL drift, duplicates |
//! | `log_integrity` | [`LogIntegrityMonitor`]: rolling CRC-32 chain, gaps and breaks |
//! | `governance` | [`GovernanceIntegrityReader`]: external state artifacts |
//!
//! A probe that cannot measure reports [`ProbeError::Unavailable`]; no value
//! is ever synthesized in its place.

pub mod dataset;
pub mod error;
pub mod governance;
pub mod knee;
pub mod log_chain;
pub mod probe;
pub mod resource;
pub mod simulated;

pub use dataset::{DatasetConfig, DatasetIntegrityWatchdog, DatasetReport, DatasetWeights};
pub use error::ProbeError;
pub use governance::{
    ArtifactReading, GovernanceArtifact, GovernanceConfig, GovernanceIntegrityReader,
    GovernanceState,
};
pub use knee::Knee;
pub use log_chain::{
    LogAnchor, LogChainEntry, LogIntegrityMonitor, LogIssue, LogIssueKind, LogMonitorConfig,
    LogVerification,
};
pub use probe::{IntegrityProbe, ProbeReading, Signal};
pub use resource::{
    Dimension, HardwareProbe, IoLatencyProbe, NvidiaSmiProbe, Reading, ResourceConfig,
    ResourceKnees, ResourceMonitor, ResourceSnapshot, SysinfoDiskProbe, SysinfoMemoryProbe,
};
pub use simulated::{SimulatedHardwareProbe, SimulatedProbe};

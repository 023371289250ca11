use thiserror::Error;
use warden_probes::Signal;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("invalid weights: {0}")]
    InvalidWeights(String),

    #[error("invalid status thresholds: {0}")]
    InvalidThresholds(String),

    #[error("invalid timing: {0}")]
    InvalidTiming(String),
}

impl ConfigError {
    pub fn code(&self) -> &'static str {
        "invalid_config"
    }
}

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("a probe for signal {0} is already registered")]
    DuplicateProbe(Signal),
}

impl SupervisorError {
    pub fn code(&self) -> &'static str {
        match self {
            SupervisorError::Config(e) => e.code(),
            SupervisorError::DuplicateProbe(_) => "duplicate_probe",
        }
    }
}

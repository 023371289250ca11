//! CLI error types and structured error output.

use thiserror::Error;
use warden_gate::GateError;
use warden_keys::KeyError;
use warden_ledger::LedgerError;
use warden_probes::ProbeError;
use warden_supervisor::{ConfigError, SupervisorError};

#[derive(Debug, Error)]
pub enum CliError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl CliError {
    pub fn code(&self) -> &'static str {
        match self {
            CliError::Config(_) => "invalid_config",
            CliError::InvalidInput(_) => "invalid_input",
            CliError::Io(_) => "io_error",
        }
    }
}

/// Stable code for the first typed error in the chain.
pub fn error_code(err: &anyhow::Error) -> &'static str {
    for cause in err.chain() {
        if let Some(e) = cause.downcast_ref::<LedgerError>() {
            return e.code();
        }
        if let Some(e) = cause.downcast_ref::<KeyError>() {
            return e.code();
        }
        if let Some(e) = cause.downcast_ref::<ProbeError>() {
            return e.code();
        }
        if let Some(e) = cause.downcast_ref::<SupervisorError>() {
            return e.code();
        }
        if let Some(e) = cause.downcast_ref::<ConfigError>() {
            return e.code();
        }
        if let Some(e) = cause.downcast_ref::<GateError>() {
            return e.code();
        }
        if let Some(e) = cause.downcast_ref::<CliError>() {
            return e.code();
        }
    }
    "internal_error"
}

/// Whether the chain carries a ledger error that must stop the operator.
pub fn is_fatal(err: &anyhow::Error) -> bool {
    err.chain()
        .filter_map(|cause| cause.downcast_ref::<LedgerError>())
        .any(LedgerError::is_fatal)
}

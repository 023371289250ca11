use thiserror::Error;
use warden_keys::KeyError;

use crate::verify::ChainBreak;

/// Errors from ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Signing is impossible. No unsigned token is ever issued instead.
    #[error("signing key unavailable: {0}")]
    KeyUnavailable(#[from] KeyError),

    /// Persisted records failed verification.
    #[error("approval chain corrupt at index {index}: {reason}")]
    ChainCorruption { index: usize, reason: ChainBreak },

    /// The ledger is halted and refuses writes until corruption is acknowledged.
    #[error("ledger halted at index {index} ({reason}); operator acknowledgement required")]
    Halted { index: usize, reason: ChainBreak },

    #[error("ledger is not halted")]
    NotHalted,

    #[error("ledger storage error: {0}")]
    Storage(String),

    #[error("ledger I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("unknown token: {0}")]
    UnknownToken(String),

    #[error("invalid ledger configuration: {0}")]
    InvalidConfig(String),

    #[error("ledger lock poisoned")]
    LockPoisoned,
}

impl LedgerError {
    /// Stable identifier for structured output.
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::KeyUnavailable(_) => "key_unavailable",
            LedgerError::ChainCorruption { .. } => "chain_corruption",
            LedgerError::Halted { .. } => "ledger_halted",
            LedgerError::NotHalted => "ledger_not_halted",
            LedgerError::Storage(_) => "storage_error",
            LedgerError::Io(_) => "storage_io",
            LedgerError::Serialization(_) => "serialization_error",
            LedgerError::InvalidInput(_) => "invalid_input",
            LedgerError::UnknownToken(_) => "unknown_token",
            LedgerError::InvalidConfig(_) => "invalid_config",
            LedgerError::LockPoisoned => "lock_poisoned",
        }
    }

    /// Corruption and key failures are hard stops for the caller.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            LedgerError::KeyUnavailable(_)
                | LedgerError::ChainCorruption { .. }
                | LedgerError::Halted { .. }
        )
    }
}

impl From<serde_json::Error> for LedgerError {
    fn from(e: serde_json::Error) -> Self {
        LedgerError::Serialization(e.to_string())
    }
}

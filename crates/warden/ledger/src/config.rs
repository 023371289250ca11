use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::LedgerError;

/// Approval ledger configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Directory holding `approval-*.json` records.
    pub data_dir: PathBuf,
    /// fsync records and the directory on every append.
    pub sync_writes: bool,
    /// Upper bound on `action` / `actor_id` length in bytes.
    pub max_field_len: usize,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("warden-data/ledger"),
            sync_writes: true,
            max_field_len: 512,
        }
    }
}

impl LedgerConfig {
    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.max_field_len == 0 {
            return Err(LedgerError::InvalidConfig(
                "max_field_len must be at least 1".into(),
            ));
        }
        if self.data_dir.as_os_str().is_empty() {
            return Err(LedgerError::InvalidConfig("data_dir is empty".into()));
        }
        Ok(())
    }
}

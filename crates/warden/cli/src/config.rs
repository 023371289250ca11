//! CLI configuration

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use warden_gate::AutonomyConfig;
use warden_keys::FileKeyStore;
use warden_ledger::LedgerConfig;
use warden_probes::{DatasetConfig, GovernanceConfig, LogMonitorConfig, ResourceConfig};
use warden_supervisor::SupervisorConfig;

use crate::error::CliError;

const DEFAULT_CONFIG_FILE: &str = "warden.toml";

/// Where key material lives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyConfig {
    pub seed_path: PathBuf,
    /// Extra verifying keys (retired signers), one hex key per line.
    pub trusted_keys_path: Option<PathBuf>,
}

impl Default for KeyConfig {
    fn default() -> Self {
        Self {
            seed_path: PathBuf::from("warden-data/keys/signing.key"),
            trusted_keys_path: None,
        }
    }
}

impl KeyConfig {
    pub fn store(&self) -> FileKeyStore {
        let store = FileKeyStore::new(&self.seed_path);
        match &self.trusted_keys_path {
            Some(path) => store.with_trusted_keys(path),
            None => store,
        }
    }
}

/// Files fed to the probes by `warden status`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputsConfig {
    /// JSON lines of `{seq, payload_hash, running_hash}`.
    pub log_stream: Option<PathBuf>,
    /// One class label per line.
    pub dataset_labels: Option<PathBuf>,
}

/// Aggregated configuration for every component.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WardenConfig {
    pub ledger: LedgerConfig,
    pub keys: KeyConfig,
    pub resource: ResourceConfig,
    pub dataset: DatasetConfig,
    pub log: LogMonitorConfig,
    pub governance: GovernanceConfig,
    pub supervisor: SupervisorConfig,
    pub autonomy: AutonomyConfig,
    pub inputs: InputsConfig,
}

impl WardenConfig {
    /// Load from `path`, else `./warden.toml` if present, else defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, CliError> {
        let config = match path {
            Some(p) => Self::from_file(p)?,
            None => {
                let default = Path::new(DEFAULT_CONFIG_FILE);
                if default.exists() {
                    Self::from_file(default)?
                } else {
                    Self::default()
                }
            }
        };
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self, CliError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| CliError::Config(format!("{}: {e}", path.display())))?;
        toml::from_str(&contents).map_err(|e| CliError::Config(format!("{}: {e}", path.display())))
    }

    pub fn validate(&self) -> Result<(), CliError> {
        fn invalid(e: impl std::fmt::Display) -> CliError {
            CliError::Config(e.to_string())
        }
        self.ledger.validate().map_err(invalid)?;
        self.resource.validate().map_err(invalid)?;
        self.dataset.validate().map_err(invalid)?;
        self.log.validate().map_err(invalid)?;
        self.governance.validate().map_err(invalid)?;
        self.supervisor.validate().map_err(invalid)?;
        self.autonomy.validate().map_err(invalid)?;
        Ok(())
    }
}

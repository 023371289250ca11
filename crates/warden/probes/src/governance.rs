//! Adapter over governance-state files written by external collaborators.
//!
//! The reader holds no authority: it only maps artifact contents onto the
//! `governance` sub-score. Anything it cannot read or trust becomes
//! `Unavailable`, never a pass.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::ProbeError;
use crate::probe::{IntegrityProbe, ProbeReading, Signal};

/// Coarse health reported by a governance artifact.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GovernanceState {
    Healthy,
    Degraded,
    Failed,
}

impl GovernanceState {
    pub fn default_score(&self) -> f64 {
        match self {
            GovernanceState::Healthy => 100.0,
            GovernanceState::Degraded => 50.0,
            GovernanceState::Failed => 0.0,
        }
    }
}

/// On-disk artifact format.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GovernanceArtifact {
    pub status: GovernanceState,
    /// Finer grade in `[0, 100]`; overrides the status default when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl GovernanceArtifact {
    pub fn score(&self) -> Result<f64, ProbeError> {
        match self.score {
            None => Ok(self.status.default_score()),
            Some(s) if s.is_finite() && (0.0..=100.0).contains(&s) => Ok(s),
            Some(s) => Err(ProbeError::unavailable(format!(
                "artifact score {s} outside [0, 100]"
            ))),
        }
    }
}

/// One successfully read artifact.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ArtifactReading {
    pub path: PathBuf,
    pub state: GovernanceState,
    pub score: f64,
    pub age_ms: Option<u64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GovernanceConfig {
    pub paths: Vec<PathBuf>,
    /// Artifacts older than this are stale. `None` disables the check.
    pub max_age_ms: Option<u64>,
    pub read_timeout_ms: u64,
}

impl Default for GovernanceConfig {
    fn default() -> Self {
        Self {
            paths: Vec::new(),
            max_age_ms: Some(15 * 60 * 1000),
            read_timeout_ms: 1000,
        }
    }
}

impl GovernanceConfig {
    pub fn validate(&self) -> Result<(), ProbeError> {
        if self.read_timeout_ms == 0 {
            return Err(ProbeError::InvalidConfig(
                "read_timeout_ms must be positive".into(),
            ));
        }
        if self.max_age_ms == Some(0) {
            return Err(ProbeError::InvalidConfig("max_age_ms must be positive".into()));
        }
        Ok(())
    }
}

pub struct GovernanceIntegrityReader {
    config: GovernanceConfig,
}

impl GovernanceIntegrityReader {
    pub fn new(config: GovernanceConfig) -> Result<Self, ProbeError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &GovernanceConfig {
        &self.config
    }

    /// Read and validate one artifact.
    pub async fn read_artifact(&self, path: &Path) -> Result<ArtifactReading, ProbeError> {
        let timeout = Duration::from_millis(self.config.read_timeout_ms);
        let bytes = match tokio::time::timeout(timeout, tokio::fs::read(path)).await {
            Ok(Ok(bytes)) => bytes,
            Ok(Err(e)) => {
                return Err(ProbeError::unavailable(format!(
                    "{}: {e}",
                    path.display()
                )))
            }
            Err(_) => {
                return Err(ProbeError::Timeout {
                    timeout_ms: self.config.read_timeout_ms,
                })
            }
        };
        let artifact: GovernanceArtifact = serde_json::from_slice(&bytes).map_err(|e| {
            ProbeError::unavailable(format!("{}: malformed artifact: {e}", path.display()))
        })?;
        let score = artifact.score()?;

        let age_ms = artifact
            .updated_at
            .map(|at| (Utc::now() - at).num_milliseconds().max(0) as u64);
        if let Some(max_age) = self.config.max_age_ms {
            match age_ms {
                None => {
                    return Err(ProbeError::unavailable(format!(
                        "{}: no updated_at, cannot check freshness",
                        path.display()
                    )))
                }
                Some(age) if age > max_age => {
                    return Err(ProbeError::unavailable(format!(
                        "{}: stale artifact ({age}ms old)",
                        path.display()
                    )))
                }
                Some(_) => {}
            }
        }

        Ok(ArtifactReading {
            path: path.to_path_buf(),
            state: artifact.status,
            score,
            age_ms,
        })
    }

    /// Every configured artifact. The first failure fails the read.
    pub async fn read_all(&self) -> Result<Vec<ArtifactReading>, ProbeError> {
        if self.config.paths.is_empty() {
            return Err(ProbeError::unavailable("no governance artifacts configured"));
        }
        let mut readings = Vec::with_capacity(self.config.paths.len());
        for path in &self.config.paths {
            match self.read_artifact(path).await {
                Ok(reading) => readings.push(reading),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "governance artifact unavailable");
                    return Err(e);
                }
            }
        }
        Ok(readings)
    }
}

#[async_trait]
impl IntegrityProbe for GovernanceIntegrityReader {
    fn signal(&self) -> Signal {
        Signal::Governance
    }

    async fn sample(&self) -> Result<ProbeReading, ProbeError> {
        let readings = self.read_all().await?;
        let worst = readings
            .iter()
            .min_by(|a, b| a.score.total_cmp(&b.score))
            .ok_or_else(|| ProbeError::unavailable("no governance artifacts read"))?;
        debug!(
            artifacts = readings.len(),
            score = worst.score,
            "governance sampled"
        );
        let mut reading = ProbeReading::new(worst.score)
            .with_metric("artifacts", readings.len() as f64);
        if worst.state != GovernanceState::Healthy {
            reading = reading.with_detail(format!(
                "{} reports {:?}",
                worst.path.display(),
                worst.state
            ));
        }
        Ok(reading)
    }
}

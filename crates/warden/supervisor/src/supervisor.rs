use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::future::join_all;
use tracing::{debug, info, warn};
use warden_probes::{IntegrityProbe, ProbeError, Signal};

use crate::config::SupervisorConfig;
use crate::error::SupervisorError;
use crate::score::{IntegrityScore, IntegrityScorer, IntegrityStatus};

#[derive(Debug, Default)]
struct Latch {
    consecutive_blocked: u32,
    shadow_mode_disabled: bool,
}

/// Runs every registered probe concurrently and scores the outcome.
///
/// The only state kept between evaluations is the `shadow_mode_disabled`
/// latch: set after `blocked_latch_after` consecutive `BLOCKED` results,
/// cleared by the next `SAFE` one.
pub struct SystemIntegritySupervisor {
    config: SupervisorConfig,
    scorer: IntegrityScorer,
    probes: BTreeMap<Signal, Arc<dyn IntegrityProbe>>,
    latch: Mutex<Latch>,
}

impl SystemIntegritySupervisor {
    pub fn new(config: SupervisorConfig) -> Result<Self, SupervisorError> {
        let scorer = IntegrityScorer::from_config(&config)?;
        Ok(Self {
            config,
            scorer,
            probes: BTreeMap::new(),
            latch: Mutex::new(Latch::default()),
        })
    }

    /// Register the probe for its signal. One probe per signal.
    pub fn with_probe(mut self, probe: Arc<dyn IntegrityProbe>) -> Result<Self, SupervisorError> {
        let signal = probe.signal();
        if self.probes.contains_key(&signal) {
            return Err(SupervisorError::DuplicateProbe(signal));
        }
        self.probes.insert(signal, probe);
        Ok(self)
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    pub fn registered(&self) -> impl Iterator<Item = Signal> + '_ {
        self.probes.keys().copied()
    }

    fn latch(&self) -> MutexGuard<'_, Latch> {
        self.latch.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn shadow_mode_disabled(&self) -> bool {
        self.latch().shadow_mode_disabled
    }

    /// Sample all probes and score them. Never fails: probe errors and
    /// timeouts become unavailable components.
    pub async fn evaluate(&self) -> IntegrityScore {
        let budget = self.config.probe_budget();
        let samples = self
            .probes
            .iter()
            .map(|(signal, probe)| sample(*signal, Arc::clone(probe), budget));
        let readings: BTreeMap<_, _> = join_all(samples).await.into_iter().collect();

        let mut score = self.scorer.score(&readings);
        score.shadow_mode_disabled = self.record(score.status);

        debug!(
            composite = score.composite,
            status = %score.status,
            available_weight = score.available_weight,
            "integrity evaluated"
        );
        score
    }

    fn record(&self, status: IntegrityStatus) -> bool {
        let mut latch = self.latch();
        match status {
            IntegrityStatus::Blocked => {
                latch.consecutive_blocked = latch.consecutive_blocked.saturating_add(1);
                warn!(
                    consecutive = latch.consecutive_blocked,
                    "integrity status BLOCKED"
                );
                if latch.consecutive_blocked >= self.config.blocked_latch_after
                    && !latch.shadow_mode_disabled
                {
                    latch.shadow_mode_disabled = true;
                    warn!("shadow mode disabled after consecutive BLOCKED evaluations");
                }
            }
            IntegrityStatus::Degraded => latch.consecutive_blocked = 0,
            IntegrityStatus::Safe => {
                latch.consecutive_blocked = 0;
                if latch.shadow_mode_disabled {
                    latch.shadow_mode_disabled = false;
                    info!("integrity SAFE, shadow mode latch cleared");
                }
            }
        }
        latch.shadow_mode_disabled
    }
}

async fn sample(
    signal: Signal,
    probe: Arc<dyn IntegrityProbe>,
    budget: Duration,
) -> (Signal, Result<warden_probes::ProbeReading, ProbeError>) {
    let result = match tokio::time::timeout(budget, probe.sample()).await {
        Ok(result) => result,
        Err(_) => Err(ProbeError::Timeout {
            timeout_ms: budget.as_millis() as u64,
        }),
    };
    if let Err(e) = &result {
        debug!(signal = %signal, error = %e, "probe excluded from composite");
    }
    (signal, result)
}

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use warden_types::Hash;

use crate::error::ProbeError;
use crate::knee::Knee;
use crate::probe::{IntegrityProbe, ProbeReading, Signal};

/// Additive smoothing for reference classes with zero mass.
const KL_EPSILON: f64 = 1e-9;

/// Score ceiling for the imbalance component once the ratio is below the floor.
const BELOW_FLOOR_CEILING: f64 = 90.0;

/// Relative weight of each dataset metric.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetWeights {
    pub imbalance: f64,
    pub kl: f64,
    pub duplicates: f64,
}

impl Default for DatasetWeights {
    fn default() -> Self {
        Self {
            imbalance: 0.4,
            kl: 0.4,
            duplicates: 0.2,
        }
    }
}

/// Dataset watchdog configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    /// Minority/majority ratio below which the dataset counts as degraded.
    pub imbalance_floor: f64,
    pub kl_knee: Knee,
    pub duplicate_knee: Knee,
    /// Size of the recent sample-hash window.
    pub recent_hash_capacity: usize,
    pub weights: DatasetWeights,
    /// Baseline class distribution. Need not be normalized.
    pub reference: Option<BTreeMap<String, f64>>,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            imbalance_floor: 0.2,
            kl_knee: Knee::new(0.05, 1.0),
            duplicate_knee: Knee::new(0.02, 0.3),
            recent_hash_capacity: 10_000,
            weights: DatasetWeights::default(),
            reference: None,
        }
    }
}

impl DatasetConfig {
    pub fn validate(&self) -> Result<(), ProbeError> {
        if !(self.imbalance_floor > 0.0 && self.imbalance_floor <= 1.0) {
            return Err(ProbeError::InvalidConfig(
                "imbalance_floor must be in (0, 1]".into(),
            ));
        }
        if self.recent_hash_capacity == 0 {
            return Err(ProbeError::InvalidConfig(
                "recent_hash_capacity must be positive".into(),
            ));
        }
        let w = self.weights;
        if [w.imbalance, w.kl, w.duplicates]
            .iter()
            .any(|x| !x.is_finite() || *x < 0.0)
            || w.imbalance + w.kl + w.duplicates <= 0.0
        {
            return Err(ProbeError::InvalidConfig(
                "dataset weights must be non-negative with a positive sum".into(),
            ));
        }
        self.kl_knee.validate("kl_knee")?;
        self.duplicate_knee.validate("duplicate_knee")?;
        if let Some(reference) = &self.reference {
            normalize(reference)?;
        }
        Ok(())
    }
}

/// Dataset sub-score with the metrics that produced it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DatasetReport {
    pub score: f64,
    pub imbalance_ratio: f64,
    pub below_floor: bool,
    pub kl_divergence: Option<f64>,
    pub duplicate_rate: Option<f64>,
    pub samples: u64,
    pub batches: u64,
}

struct WatchdogState {
    counts: BTreeMap<String, u64>,
    samples: u64,
    batches: u64,
    reference: Option<BTreeMap<String, f64>>,
    recent: VecDeque<Hash>,
    recent_set: HashSet<Hash>,
    last_duplicate_rate: Option<f64>,
}

/// Running class-frequency statistics over observed training batches.
///
/// Shared between the pipeline that records batches and the supervisor that
/// samples it. It only reports a number; it never blocks training.
pub struct DatasetIntegrityWatchdog {
    config: DatasetConfig,
    state: Mutex<WatchdogState>,
}

impl DatasetIntegrityWatchdog {
    pub fn new(config: DatasetConfig) -> Result<Self, ProbeError> {
        config.validate()?;
        let reference = config.reference.as_ref().map(normalize).transpose()?;
        Ok(Self {
            state: Mutex::new(WatchdogState {
                counts: BTreeMap::new(),
                samples: 0,
                batches: 0,
                reference,
                recent: VecDeque::new(),
                recent_set: HashSet::new(),
                last_duplicate_rate: None,
            }),
            config,
        })
    }

    fn state(&self) -> std::sync::MutexGuard<'_, WatchdogState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add one batch of labels to the running counts.
    pub fn record_batch<I, S>(&self, labels: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut state = self.state();
        let mut added = 0u64;
        for label in labels {
            *state.counts.entry(label.as_ref().to_string()).or_insert(0) += 1;
            added += 1;
        }
        state.samples += added;
        state.batches += 1;
        debug!(added, total = state.samples, "dataset batch recorded");
    }

    /// Replace the baseline distribution used for drift.
    pub fn set_reference(&self, reference: &BTreeMap<String, f64>) -> Result<(), ProbeError> {
        let normalized = normalize(reference)?;
        self.state().reference = Some(normalized);
        Ok(())
    }

    /// Minority over majority class count, across observed and reference
    /// classes. `1.0` with fewer than two classes or no data.
    pub fn imbalance_ratio(&self) -> f64 {
        let state = self.state();
        imbalance(&state.counts, state.reference.as_ref())
    }

    /// KL divergence of the current empirical distribution from `reference`.
    pub fn kl_divergence(&self, reference: &BTreeMap<String, f64>) -> Result<f64, ProbeError> {
        let reference = normalize(reference)?;
        let state = self.state();
        Ok(kl(&state.counts, state.samples, &reference))
    }

    /// Fraction of `sample_hashes` already seen in the recent window (or
    /// earlier in the same call). Updates the window, FIFO eviction.
    pub fn duplicate_rate(&self, sample_hashes: &[Hash]) -> f64 {
        if sample_hashes.is_empty() {
            return 0.0;
        }
        let capacity = self.config.recent_hash_capacity;
        let mut state = self.state();
        let mut duplicates = 0usize;
        for hash in sample_hashes {
            if state.recent_set.contains(hash) {
                duplicates += 1;
                continue;
            }
            state.recent.push_back(*hash);
            state.recent_set.insert(*hash);
            while state.recent.len() > capacity {
                if let Some(evicted) = state.recent.pop_front() {
                    state.recent_set.remove(&evicted);
                }
            }
        }
        let rate = duplicates as f64 / sample_hashes.len() as f64;
        state.last_duplicate_rate = Some(rate);
        if rate > 0.0 {
            debug!(duplicates, rate, "duplicate samples observed");
        }
        rate
    }

    /// Combined dataset sub-score. Metrics without data (no reference, no
    /// duplicate check yet) are left out and the remaining weights renormalized.
    pub fn report(&self) -> Result<DatasetReport, ProbeError> {
        let state = self.state();
        if state.samples == 0 {
            return Err(ProbeError::unavailable("no batches observed"));
        }

        let floor = self.config.imbalance_floor;
        let ratio = imbalance(&state.counts, state.reference.as_ref());
        let below_floor = ratio < floor;
        let imbalance_score = if below_floor {
            BELOW_FLOOR_CEILING * ratio / floor
        } else {
            100.0
        };

        let kl_value = state
            .reference
            .as_ref()
            .map(|r| kl(&state.counts, state.samples, r));
        let duplicate_rate = state.last_duplicate_rate;

        let w = self.config.weights;
        let mut parts = vec![(w.imbalance, imbalance_score)];
        if let Some(d) = kl_value {
            parts.push((w.kl, self.config.kl_knee.score(d)));
        }
        if let Some(rate) = duplicate_rate {
            parts.push((w.duplicates, self.config.duplicate_knee.score(rate)));
        }
        let total_weight: f64 = parts.iter().map(|(w, _)| w).sum();
        let score = if total_weight > 0.0 {
            parts.iter().map(|(w, s)| w * s).sum::<f64>() / total_weight
        } else {
            imbalance_score
        };

        if below_floor {
            warn!(ratio, floor, "dataset class imbalance below floor");
        }

        Ok(DatasetReport {
            score: score.clamp(0.0, 100.0),
            imbalance_ratio: ratio,
            below_floor,
            kl_divergence: kl_value,
            duplicate_rate,
            samples: state.samples,
            batches: state.batches,
        })
    }

    /// Drop all counts and recent hashes, keeping the reference.
    pub fn reset(&self) {
        let mut state = self.state();
        state.counts.clear();
        state.samples = 0;
        state.batches = 0;
        state.recent.clear();
        state.recent_set.clear();
        state.last_duplicate_rate = None;
    }
}

#[async_trait]
impl IntegrityProbe for DatasetIntegrityWatchdog {
    fn signal(&self) -> Signal {
        Signal::Dataset
    }

    async fn sample(&self) -> Result<ProbeReading, ProbeError> {
        let report = self.report()?;
        let mut reading = ProbeReading::new(report.score)
            .with_metric("imbalance_ratio", report.imbalance_ratio)
            .with_metric("samples", report.samples as f64);
        if let Some(d) = report.kl_divergence {
            reading = reading.with_metric("kl_divergence", d);
        }
        if let Some(rate) = report.duplicate_rate {
            reading = reading.with_metric("duplicate_rate", rate);
        }
        if report.below_floor {
            reading = reading.with_detail("class imbalance below floor");
        }
        Ok(reading)
    }
}

fn normalize(reference: &BTreeMap<String, f64>) -> Result<BTreeMap<String, f64>, ProbeError> {
    if reference.values().any(|p| !p.is_finite() || *p < 0.0) {
        return Err(ProbeError::InvalidConfig(
            "reference distribution has negative or non-finite mass".into(),
        ));
    }
    let total: f64 = reference.values().sum();
    if total <= 0.0 {
        return Err(ProbeError::InvalidConfig(
            "reference distribution has no mass".into(),
        ));
    }
    Ok(reference
        .iter()
        .map(|(k, v)| (k.clone(), v / total))
        .collect())
}

fn imbalance(counts: &BTreeMap<String, u64>, reference: Option<&BTreeMap<String, f64>>) -> f64 {
    let mut classes: BTreeMap<&str, u64> =
        counts.iter().map(|(k, v)| (k.as_str(), *v)).collect();
    if let Some(reference) = reference {
        for class in reference.keys() {
            classes.entry(class.as_str()).or_insert(0);
        }
    }
    if classes.len() < 2 {
        return 1.0;
    }
    let max = classes.values().copied().max().unwrap_or(0);
    let min = classes.values().copied().min().unwrap_or(0);
    if max == 0 {
        return 1.0;
    }
    min as f64 / max as f64
}

/// `D(P_observed ‖ Q_reference)` with ε-smoothing on `Q`.
fn kl(counts: &BTreeMap<String, u64>, samples: u64, reference: &BTreeMap<String, f64>) -> f64 {
    if samples == 0 {
        return 0.0;
    }
    let unseen = counts.keys().filter(|k| !reference.contains_key(*k)).count();
    let support = (reference.len() + unseen) as f64;
    let denom = 1.0 + KL_EPSILON * support;

    counts
        .iter()
        .filter(|(_, c)| **c > 0)
        .map(|(class, count)| {
            let p = *count as f64 / samples as f64;
            let q = (reference.get(class).copied().unwrap_or(0.0) + KL_EPSILON) / denom;
            p * (p / q).ln()
        })
        .sum::<f64>()
        .max(0.0)
}

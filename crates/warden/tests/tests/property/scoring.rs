//! Property tests: the composite is the renormalized weighted mean of the
//! available signals, and unavailable signals never count as a pass.

use std::collections::BTreeMap;

use proptest::prelude::*;
use warden_probes::{ProbeError, ProbeReading, Signal};
use warden_supervisor::{IntegrityScorer, IntegrityStatus, StatusThresholds, Weights};

// ---------------------------------------------------------------------------
// Helpers / Strategies
// ---------------------------------------------------------------------------

const MIN_AVAILABLE: f64 = 0.5;

/// Positive weights normalized to sum to one.
fn arb_weights() -> impl Strategy<Value = Weights> {
    prop::array::uniform4(1u32..100).prop_map(|raw| {
        let total: f64 = raw.iter().map(|w| *w as f64).sum();
        let [dataset, resource, log_integrity, governance] = raw.map(|w| w as f64 / total);
        Weights {
            dataset,
            resource,
            log_integrity,
            governance,
        }
    })
}

/// Per-signal outcome: `Some(score)` when available.
fn arb_outcomes() -> impl Strategy<Value = [Option<f64>; 4]> {
    prop::array::uniform4(prop::option::weighted(
        0.8,
        prop_oneof![Just(100.0), 0.0f64..100.0],
    ))
}

fn readings(outcomes: &[Option<f64>; 4]) -> BTreeMap<Signal, Result<ProbeReading, ProbeError>> {
    Signal::ALL
        .iter()
        .zip(outcomes)
        .map(|(signal, outcome)| {
            let result = match outcome {
                Some(score) => Ok(ProbeReading::new(*score)),
                None => Err(ProbeError::unavailable("offline")),
            };
            (*signal, result)
        })
        .collect()
}

fn scorer(weights: Weights) -> IntegrityScorer {
    IntegrityScorer::new(weights, StatusThresholds::default())
        .unwrap()
        .with_min_available_weight(MIN_AVAILABLE)
}

// ---------------------------------------------------------------------------
// Property Tests
// ---------------------------------------------------------------------------

proptest! {
    /// Composite equals sum(w_i * s_i) / sum(w_i) over available signals.
    #[test]
    fn composite_is_renormalized_mean(weights in arb_weights(), outcomes in arb_outcomes()) {
        let score = scorer(weights).score(&readings(&outcomes));

        let (mut num, mut den) = (0.0, 0.0);
        for (signal, outcome) in Signal::ALL.iter().zip(&outcomes) {
            if let Some(s) = outcome {
                num += weights.get(*signal) * s;
                den += weights.get(*signal);
            }
        }
        prop_assert!((score.available_weight - den).abs() < 1e-9);
        if den > 0.0 {
            prop_assert!((score.composite - num / den).abs() < 1e-6);
        } else {
            prop_assert_eq!(score.composite, 0.0);
            prop_assert_eq!(score.status, IntegrityStatus::Blocked);
        }
    }

    /// The composite lies between the worst and best available signal.
    #[test]
    fn composite_is_bounded_by_available_scores(
        weights in arb_weights(),
        outcomes in arb_outcomes(),
    ) {
        let available: Vec<f64> = outcomes.iter().flatten().copied().collect();
        prop_assume!(!available.is_empty());
        let score = scorer(weights).score(&readings(&outcomes));

        let lo = available.iter().copied().fold(f64::INFINITY, f64::min);
        let hi = available.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        prop_assert!(score.composite >= lo - 1e-9);
        prop_assert!(score.composite <= hi + 1e-9);
    }

    /// Unavailable signals report zero, carry an error code and no weight.
    #[test]
    fn unavailable_signals_are_marked(weights in arb_weights(), outcomes in arb_outcomes()) {
        let score = scorer(weights).score(&readings(&outcomes));
        for (signal, outcome) in Signal::ALL.iter().zip(&outcomes) {
            let report = score.component(*signal).unwrap();
            prop_assert_eq!(report.available, outcome.is_some());
            if outcome.is_none() {
                prop_assert_eq!(report.score, 0.0);
                prop_assert_eq!(report.effective_weight, 0.0);
                prop_assert_eq!(report.error_code.as_deref(), Some("probe_unavailable"));
            }
        }
        let effective: f64 = score.components.values().map(|c| c.effective_weight).sum();
        if score.available_weight > 0.0 {
            prop_assert!((effective - 1.0).abs() < 1e-9);
        }
    }

    /// Too little available weight forces BLOCKED regardless of scores.
    #[test]
    fn thin_evidence_blocks(weights in arb_weights(), outcomes in arb_outcomes()) {
        let score = scorer(weights).score(&readings(&outcomes));
        if score.available_weight < MIN_AVAILABLE {
            prop_assert_eq!(score.status, IntegrityStatus::Blocked);
        } else {
            prop_assert_eq!(score.status, StatusThresholds::default().classify(score.composite));
        }
    }
}

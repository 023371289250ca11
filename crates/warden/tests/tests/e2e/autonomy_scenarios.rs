//! E2E: approvals, integrity and log continuity driving the autonomy gate.

use warden_gate::{ActionClass, AutonomyMode, CheckOutcome, Condition, DenialReason};
use warden_ledger::{ChainBreak, LedgerStatus};
use warden_probes::{LogAnchor, Signal};
use warden_tests::{flip_field_byte, produce_log, Harness};

#[tokio::test]
async fn three_approvals_and_clean_signals_enter_shadow() {
    let h = Harness::requiring(3).await;
    h.approve(&["alice", "bob", "carol"]).await;
    h.log_lines(10);

    assert_eq!(h.evaluator.mode().await, AutonomyMode::Disabled);
    let state = h.evaluator.evaluate().await;
    assert_eq!(state.mode, AutonomyMode::Shadow);
    assert_eq!(state.reason, "all_conditions_met");
    assert_eq!(state.composite, Some(100.0));
}

#[tokio::test]
async fn log_gap_at_seq_seven_blocks() {
    let h = Harness::requiring(3).await;
    h.approve(&["alice", "bob", "carol"]).await;
    for entry in produce_log(LogAnchor::GENESIS, 10)
        .into_iter()
        .filter(|e| e.seq != 7)
    {
        h.log.ingest(entry);
    }

    let state = h.evaluator.evaluate().await;
    assert_eq!(state.mode, AutonomyMode::Blocked);
    assert_eq!(state.reason, "log_integrity_gap");
    assert_eq!(state.denial, Some(DenialReason::LogIntegrityGap));
    let log = state.condition(Condition::LogIntegrity).unwrap();
    assert!(log.detail.as_deref().unwrap().contains('7'));
}

#[tokio::test]
async fn gap_forces_shadow_to_blocked_and_resolution_reenters() {
    let h = Harness::requiring(2).await;
    h.approve(&["alice", "bob"]).await;
    let entries = produce_log(LogAnchor::GENESIS, 10);
    for e in &entries[..6] {
        h.log.ingest(*e);
    }
    assert_eq!(h.evaluator.evaluate().await.mode, AutonomyMode::Shadow);

    for e in &entries[7..] {
        h.log.ingest(*e);
    }
    assert_eq!(
        h.evaluator.authorize(ActionClass::NonDestructive).await,
        CheckOutcome::denied(DenialReason::LogIntegrityGap)
    );
    assert_eq!(h.evaluator.mode().await, AutonomyMode::Blocked);

    assert!(h.log.resolve(7));
    assert_eq!(h.evaluator.evaluate().await.mode, AutonomyMode::Shadow);
}

#[tokio::test]
async fn corrupted_ledger_blocks_until_acknowledged() {
    let h = Harness::requiring(2).await;
    h.approve(&["alice", "bob", "carol"]).await;
    assert_eq!(h.evaluator.evaluate().await.mode, AutonomyMode::Shadow);

    h.storage
        .tamper(1, |bytes| {
            assert!(flip_field_byte(bytes, "actor_id", 0));
        })
        .unwrap();
    let audit = h.ledger.audit_storage().await.unwrap();
    assert_eq!(audit.first_invalid_index, Some(1));

    let state = h.evaluator.evaluate().await;
    assert_eq!(state.mode, AutonomyMode::Blocked);
    assert_eq!(state.denial, Some(DenialReason::LedgerHalted));
    // only alice's approval survives in the verified prefix
    assert_eq!(
        state.condition(Condition::ApprovalQuorum).unwrap().outcome,
        CheckOutcome::denied(DenialReason::InsufficientApprovals)
    );

    h.ledger.acknowledge_corruption("ops-lead").await.unwrap();
    assert_eq!(h.ledger.status().await, LedgerStatus::Ready);
    assert_eq!(h.storage.quarantined().unwrap().len(), 2);

    h.approve(&["dave"]).await;
    assert_eq!(h.evaluator.evaluate().await.mode, AutonomyMode::Shadow);
    assert!(h.ledger.verify_chain().await.unwrap().valid);
}

#[tokio::test]
async fn audit_reports_the_break_reason() {
    let h = Harness::requiring(1).await;
    h.approve(&["alice", "bob"]).await;
    h.storage
        .tamper(1, |bytes| {
            assert!(flip_field_byte(bytes, "value", 3));
        })
        .unwrap();
    h.ledger.audit_storage().await.unwrap();
    assert_eq!(
        h.ledger.status().await,
        LedgerStatus::Halted {
            first_invalid_index: 1,
            reason: ChainBreak::BadSignature,
        }
    );
}

#[tokio::test]
async fn integrity_drop_in_shadow_blocks_actions() {
    let h = Harness::requiring(1).await;
    h.approve(&["alice"]).await;
    h.evaluator.evaluate().await;
    assert!(h
        .evaluator
        .authorize(ActionClass::NonDestructive)
        .await
        .is_allowed());

    h.resource.set_score(20.0);
    assert_eq!(
        h.evaluator.authorize(ActionClass::NonDestructive).await,
        CheckOutcome::denied(DenialReason::IntegrityDegraded)
    );
}

#[tokio::test]
async fn governance_unavailable_still_allows_on_remaining_signals() {
    let h = Harness::requiring(1).await;
    h.approve(&["alice"]).await;
    h.governance.set_unavailable("artifact missing");

    let score = h.supervisor.evaluate().await;
    assert!(!score.component(Signal::Governance).unwrap().available);
    assert_eq!(score.composite, 100.0);

    assert_eq!(h.evaluator.evaluate().await.mode, AutonomyMode::Shadow);
}

#[tokio::test]
async fn expired_approvals_lapse() {
    let h = Harness::requiring(1).await;
    let soon = warden_types::now_ms() + 150;
    h.ledger
        .append(warden_tests::ENABLE_AUTONOMY, "alice", Some(soon))
        .await
        .unwrap();
    assert_eq!(h.evaluator.evaluate().await.mode, AutonomyMode::Shadow);

    tokio::time::sleep(std::time::Duration::from_millis(300)).await;
    assert_eq!(
        h.evaluator.evaluate().await.denial,
        Some(DenialReason::InsufficientApprovals)
    );
}

#[tokio::test]
async fn integrity_without_enough_evidence_is_unavailable() {
    let h = Harness::requiring(1).await;
    h.approve(&["alice"]).await;
    assert_eq!(h.evaluator.evaluate().await.mode, AutonomyMode::Shadow);

    h.dataset.set_unavailable("sampler offline");
    h.resource.set_unavailable("sysinfo unavailable");
    h.governance.set_unavailable("artifact missing");

    let state = h.evaluator.evaluate().await;
    assert_eq!(state.mode, AutonomyMode::Blocked);
    assert_eq!(state.denial, Some(DenialReason::IntegrityBlocked));
    assert!(state.reason.starts_with("unavailable: available weight 0.25"));

    let integrity = state.condition(Condition::IntegritySafe).unwrap();
    assert!(matches!(integrity.outcome, CheckOutcome::Unavailable { .. }));
    assert_eq!(integrity.detail.as_deref(), Some("3 of 4 components unavailable"));
    assert_eq!(
        h.evaluator.authorize(ActionClass::NonDestructive).await,
        CheckOutcome::denied(DenialReason::IntegrityBlocked)
    );

    // a thin but sufficient set of signals is scored, not reported unavailable
    h.dataset.set_score(100.0);
    let state = h.evaluator.evaluate().await;
    let integrity = state.condition(Condition::IntegritySafe).unwrap();
    assert!(!matches!(integrity.outcome, CheckOutcome::Unavailable { .. }));
}

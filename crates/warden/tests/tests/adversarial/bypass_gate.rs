//! Adversarial: attempts to reach SHADOW, or act in it, without meeting
//! every condition.

use std::time::Duration;

use warden_gate::{ActionClass, AutonomyConfig, AutonomyMode, CapabilityFlags, CheckOutcome, DenialReason};
use warden_keys::Ed25519KeyManager;
use warden_ledger::ApprovalToken;
use warden_tests::{Harness, ENABLE_AUTONOMY};
use warden_types::{now_ms, HlcTimestamp, TokenId};

async fn denial(h: &Harness) -> Option<DenialReason> {
    let state = h.evaluator.evaluate().await;
    assert_eq!(state.mode == AutonomyMode::Shadow, state.denial.is_none());
    state.denial
}

// ---- Approval quorum ----

#[tokio::test]
async fn approvals_for_another_action_do_not_count() {
    let h = Harness::requiring(2).await;
    h.ledger.append("export_report", "alice", None).await.unwrap();
    h.ledger.append("export_report", "bob", None).await.unwrap();
    assert_eq!(denial(&h).await, Some(DenialReason::InsufficientApprovals));
}

#[tokio::test]
async fn one_actor_cannot_approve_twice() {
    let h = Harness::requiring(2).await;
    h.approve(&["alice", "alice", "alice"]).await;
    assert_eq!(denial(&h).await, Some(DenialReason::InsufficientApprovals));
}

#[tokio::test]
async fn repeat_approvals_count_when_distinct_actors_are_not_required() {
    let h = Harness::new(AutonomyConfig {
        distinct_approvers: false,
        ..Default::default()
    })
    .await;
    h.approve(&["alice", "alice"]).await;
    assert_eq!(denial(&h).await, None);
}

#[tokio::test]
async fn already_expired_approvals_do_not_count() {
    let h = Harness::requiring(2).await;
    let past = now_ms() - 1_000;
    h.ledger.append(ENABLE_AUTONOMY, "alice", Some(past)).await.unwrap();
    h.ledger.append(ENABLE_AUTONOMY, "bob", Some(past)).await.unwrap();
    assert_eq!(denial(&h).await, Some(DenialReason::InsufficientApprovals));
}

#[tokio::test]
async fn revoked_approval_breaks_quorum() {
    let h = Harness::requiring(2).await;
    let alice = h.ledger.append(ENABLE_AUTONOMY, "alice", None).await.unwrap();
    h.approve(&["bob"]).await;
    assert_eq!(denial(&h).await, None);

    h.ledger.revoke(alice.token_id, "security").await.unwrap();
    assert_eq!(
        h.evaluator.authorize(ActionClass::NonDestructive).await,
        CheckOutcome::denied(DenialReason::InsufficientApprovals)
    );
    assert_eq!(h.evaluator.mode().await, AutonomyMode::Blocked);
}

#[tokio::test]
async fn approvals_outside_the_window_do_not_count() {
    let h = Harness::new(AutonomyConfig {
        approval_window_ms: 200,
        ..Default::default()
    })
    .await;
    h.approve(&["alice", "bob"]).await;
    assert_eq!(denial(&h).await, None);

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(denial(&h).await, Some(DenialReason::InsufficientApprovals));
}

#[tokio::test]
async fn forged_records_in_storage_never_count_and_halt_on_audit() {
    let h = Harness::requiring(3).await;
    h.approve(&["alice"]).await;

    let forger = Ed25519KeyManager::generate();
    let tip = h.ledger.snapshot().await.entries[0].clone();
    let mut prev = tip.entry_hash;
    for (i, actor) in ["mallory", "trudy"].iter().enumerate() {
        let forged = ApprovalToken::seal(
            TokenId::new(),
            ENABLE_AUTONOMY,
            *actor,
            HlcTimestamp::new(tip.issued_at.physical_ms + 1 + i as u64, 0),
            None,
            prev,
            &forger,
        )
        .unwrap();
        prev = forged.entry_hash;
        h.storage
            .insert_raw(1 + i as u64, serde_json::to_vec(&forged).unwrap())
            .unwrap();
    }

    // the committed chain is what counts, not whatever is on disk
    assert_eq!(denial(&h).await, Some(DenialReason::InsufficientApprovals));

    h.ledger.audit_storage().await.unwrap();
    assert_eq!(denial(&h).await, Some(DenialReason::LedgerHalted));
}

// ---- Presence and capabilities ----

#[tokio::test]
async fn absent_human_blocks() {
    let h = Harness::requiring(2).await;
    h.approve(&["alice", "bob"]).await;
    h.presence.mark_offline("operator");
    assert_eq!(denial(&h).await, Some(DenialReason::HumanOffline));
}

#[tokio::test]
async fn unattended_capability_satisfies_presence() {
    let h = Harness::new(AutonomyConfig {
        capabilities: CapabilityFlags {
            allow_unattended: true,
            ..Default::default()
        },
        ..Default::default()
    })
    .await;
    h.approve(&["alice", "bob"]).await;
    h.presence.mark_offline("operator");
    assert_eq!(denial(&h).await, None);
}

#[tokio::test]
async fn destructive_actions_are_refused_in_shadow() {
    let h = Harness::requiring(2).await;
    h.approve(&["alice", "bob"]).await;
    h.evaluator.evaluate().await;

    assert_eq!(
        h.evaluator.authorize(ActionClass::Destructive).await,
        CheckOutcome::denied(DenialReason::DestructiveActionForbidden)
    );
    // refusing one action does not leave SHADOW
    assert_eq!(h.evaluator.mode().await, AutonomyMode::Shadow);
    assert!(h.evaluator.authorize(ActionClass::NonDestructive).await.is_allowed());
}

#[tokio::test]
async fn destructive_capability_is_honored() {
    let h = Harness::new(AutonomyConfig {
        capabilities: CapabilityFlags {
            allow_destructive_in_shadow: true,
            ..Default::default()
        },
        ..Default::default()
    })
    .await;
    h.approve(&["alice", "bob"]).await;
    h.evaluator.evaluate().await;
    assert!(h.evaluator.authorize(ActionClass::Destructive).await.is_allowed());
}

// ---- Mode discipline ----

#[tokio::test]
async fn authorize_never_leaves_disabled() {
    let h = Harness::requiring(2).await;
    h.approve(&["alice", "bob"]).await;
    assert_eq!(
        h.evaluator.authorize(ActionClass::NonDestructive).await,
        CheckOutcome::denied(DenialReason::AutonomyNotActive)
    );
    assert_eq!(h.evaluator.mode().await, AutonomyMode::Disabled);
}

#[tokio::test]
async fn authorize_never_leaves_blocked() {
    let h = Harness::requiring(2).await;
    h.approve(&["alice"]).await;
    assert_eq!(denial(&h).await, Some(DenialReason::InsufficientApprovals));

    // conditions now hold, but only an explicit evaluation re-enters SHADOW
    h.approve(&["bob"]).await;
    assert_eq!(
        h.evaluator.authorize(ActionClass::NonDestructive).await,
        CheckOutcome::denied(DenialReason::InsufficientApprovals)
    );
    assert_eq!(h.evaluator.evaluate().await.mode, AutonomyMode::Shadow);
}

#[tokio::test]
async fn operator_disable_revokes_authority() {
    let h = Harness::requiring(2).await;
    h.approve(&["alice", "bob"]).await;
    h.evaluator.evaluate().await;

    let state = h.evaluator.disable("ops-lead").await;
    assert_eq!(state.mode, AutonomyMode::Disabled);
    assert_eq!(state.reason, "disabled_by_operator:ops-lead");
    assert_eq!(
        h.evaluator.authorize(ActionClass::NonDestructive).await,
        CheckOutcome::denied(DenialReason::AutonomyNotActive)
    );
}

#[tokio::test]
async fn sustained_blocked_integrity_latches_shadow_off() {
    let h = Harness::requiring(2).await;
    h.approve(&["alice", "bob"]).await;
    h.dataset.set_score(10.0);
    h.resource.set_score(10.0);

    assert_eq!(denial(&h).await, Some(DenialReason::IntegrityBlocked));
    let state = h.evaluator.evaluate().await;
    assert_eq!(state.denial, Some(DenialReason::IntegrityBlocked));
    assert!(!state
        .condition(warden_gate::Condition::ShadowModeAvailable)
        .unwrap()
        .outcome
        .is_allowed());

    // partial recovery to DEGRADED keeps the latch
    h.dataset.set_score(80.0);
    h.resource.set_score(80.0);
    let state = h.evaluator.evaluate().await;
    assert_eq!(state.denial, Some(DenialReason::IntegrityDegraded));
    assert!(h.supervisor.shadow_mode_disabled());

    // full recovery clears it
    h.dataset.set_score(100.0);
    h.resource.set_score(100.0);
    assert_eq!(denial(&h).await, None);
}

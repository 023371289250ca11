//! Property tests: any single-byte edit of a persisted approval is located
//! exactly, reported as `hash_mismatch`, and nothing after it is trusted.

use std::sync::Arc;

use proptest::prelude::*;
use tokio::runtime::Runtime;
use warden_keys::Ed25519KeyManager;
use warden_ledger::{ApprovalLedger, ChainBreak, LedgerConfig, MemoryLedgerStorage};
use warden_tests::{corrupt_field_byte, flip_field_byte, ledger_with, ENABLE_AUTONOMY};
use warden_types::now_ms;

// ---------------------------------------------------------------------------
// Helpers / Strategies
// ---------------------------------------------------------------------------

/// 2100-01-01 in epoch milliseconds.
const FAR_FUTURE: u64 = 4_102_444_800_000;

fn runtime() -> Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

/// Fields covered by the entry hash, directly or through the link.
fn arb_hashed_field() -> impl Strategy<Value = &'static str> {
    prop_oneof![
        Just("token_id"),
        Just("action"),
        Just("actor_id"),
        Just("prev_hash"),
        Just("entry_hash"),
        Just("physical_ms"),
        Just("logical"),
        Just("expires_at"),
    ]
}

/// Ledger over shared in-memory storage with one approval per expiry.
async fn ledger_expiring(
    expiries: &[Option<u64>],
) -> (Arc<Ed25519KeyManager>, Arc<MemoryLedgerStorage>, ApprovalLedger) {
    let keys = Arc::new(Ed25519KeyManager::generate());
    let storage = Arc::new(MemoryLedgerStorage::new());
    let ledger = ApprovalLedger::open(LedgerConfig::default(), storage.clone(), keys.clone())
        .await
        .unwrap();
    for (k, expires_at) in expiries.iter().enumerate() {
        ledger
            .append(ENABLE_AUTONOMY, &format!("actor-{k}"), *expires_at)
            .await
            .unwrap();
    }
    (keys, storage, ledger)
}

/// Chain length and the index to tamper.
fn arb_target() -> impl Strategy<Value = (usize, usize)> {
    (1usize..8).prop_flat_map(|n| (Just(n), 0..n))
}

// ---------------------------------------------------------------------------
// Property Tests
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    /// An untouched chain verifies in full.
    #[test]
    fn untouched_chain_is_valid(n in 0usize..10) {
        let rt = runtime();
        let result = rt.block_on(async {
            let (_keys, _storage, ledger) = ledger_with(n).await;
            ledger.verify_chain().await.unwrap()
        });
        prop_assert!(result.valid);
        prop_assert_eq!(result.verified, n);
    }

    /// Editing one byte of a hashed field at index i breaks the chain at i.
    #[test]
    fn single_edit_is_located(
        (n, i) in arb_target(),
        field in arb_hashed_field(),
        offset in 0usize..64,
    ) {
        let rt = runtime();
        let result = rt.block_on(async {
            let (_keys, storage, ledger) = ledger_expiring(&vec![Some(FAR_FUTURE); n]).await;
            storage
                .tamper(i as u64, |b| assert!(flip_field_byte(b, field, offset)))
                .unwrap();
            ledger.verify_chain().await.unwrap()
        });
        prop_assert!(!result.valid);
        prop_assert_eq!(result.first_invalid_index, Some(i));
        prop_assert_eq!(result.reason, Some(ChainBreak::HashMismatch));
        prop_assert_eq!(result.verified, i);
    }

    /// Overwriting one raw byte of any hashed value, whether or not the record
    /// still decodes, is a hash mismatch at i for both verify and load.
    #[test]
    fn corrupted_value_byte_is_hash_mismatch(
        (n, i) in arb_target(),
        field in arb_hashed_field(),
        offset in 0usize..64,
    ) {
        let expiries: Vec<Option<u64>> = (0..n)
            .map(|k| (k % 2 == 0).then_some(FAR_FUTURE))
            .collect();
        let rt = runtime();
        let (result, loaded) = rt.block_on(async {
            let (keys, storage, ledger) = ledger_expiring(&expiries).await;
            storage
                .tamper(i as u64, |b| assert!(corrupt_field_byte(b, field, offset)))
                .unwrap();
            let result = ledger.verify_chain().await.unwrap();
            let loaded = ApprovalLedger::load(LedgerConfig::default(), storage, keys).await;
            (result, loaded.err().map(|e| e.to_string()))
        });
        prop_assert_eq!(result.break_point(), Some((i, ChainBreak::HashMismatch)));
        prop_assert_eq!(result.verified, i);
        prop_assert_eq!(
            loaded,
            Some(format!("approval chain corrupt at index {i}: hash_mismatch"))
        );
    }

    /// Reloading an untouched store reproduces the committed tip.
    #[test]
    fn reload_reproduces_tip(n in 0usize..8) {
        let rt = runtime();
        let (before, after) = rt.block_on(async {
            let (keys, storage, ledger) = ledger_with(n).await;
            let reloaded = ApprovalLedger::load(LedgerConfig::default(), storage, keys)
                .await
                .unwrap();
            (ledger.tip().await, reloaded.tip().await)
        });
        prop_assert_eq!(before, after);
    }

    /// After a tamper, a halted ledger counts only unexpired approvals from
    /// the verified prefix.
    #[test]
    fn halted_ledger_counts_only_verified_prefix(
        expired in prop::collection::vec(any::<bool>(), 1..8),
        pick in any::<prop::sample::Index>(),
        field in arb_hashed_field(),
    ) {
        let i = pick.index(expired.len());
        let rt = runtime();
        let counted = rt.block_on(async {
            let keys = Arc::new(Ed25519KeyManager::generate());
            let storage = Arc::new(MemoryLedgerStorage::new());
            let ledger = ApprovalLedger::open(LedgerConfig::default(), storage.clone(), keys.clone())
                .await
                .unwrap();
            for (k, lapsed) in expired.iter().enumerate() {
                let expires_at = if *lapsed {
                    Some(now_ms().saturating_sub(1))
                } else {
                    Some(FAR_FUTURE)
                };
                ledger
                    .append(ENABLE_AUTONOMY, &format!("actor-{k}"), expires_at)
                    .await
                    .unwrap();
            }
            storage
                .tamper(i as u64, |b| assert!(flip_field_byte(b, field, 7)))
                .unwrap();

            let reopened = ApprovalLedger::open(LedgerConfig::default(), storage, keys)
                .await
                .unwrap();
            assert!(reopened.is_halted().await);
            reopened.count_valid_approvals(Some(ENABLE_AUTONOMY), None).await
        });
        let expected = expired[..i].iter().filter(|lapsed| !**lapsed).count();
        prop_assert_eq!(counted, expected);
    }
}

//! Property tests: concurrent writers never fork the approval chain.

use std::collections::HashSet;
use std::sync::Arc;

use proptest::prelude::*;
use warden_keys::Ed25519KeyManager;
use warden_ledger::{ApprovalLedger, LedgerConfig, MemoryLedgerStorage};
use warden_tests::ENABLE_AUTONOMY;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(4)
        .enable_all()
        .build()
        .unwrap()
}

async fn hammer(writers: usize, per_writer: usize) -> (Arc<MemoryLedgerStorage>, Arc<ApprovalLedger>) {
    let keys = Arc::new(Ed25519KeyManager::generate());
    let storage = Arc::new(MemoryLedgerStorage::new());
    let ledger = Arc::new(
        ApprovalLedger::open(LedgerConfig::default(), storage.clone(), keys)
            .await
            .unwrap(),
    );

    let handles: Vec<_> = (0..writers)
        .map(|w| {
            let ledger = Arc::clone(&ledger);
            tokio::spawn(async move {
                for k in 0..per_writer {
                    ledger
                        .append(ENABLE_AUTONOMY, &format!("writer-{w}-{k}"), None)
                        .await
                        .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap();
    }
    (storage, ledger)
}

// ---------------------------------------------------------------------------
// Property Tests
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// Every append lands exactly once, linked to a distinct predecessor.
    #[test]
    fn chain_stays_linear(writers in 1usize..8, per_writer in 1usize..6) {
        let rt = runtime();
        let (snapshot, result) = rt.block_on(async {
            let (_storage, ledger) = hammer(writers, per_writer).await;
            (ledger.snapshot().await, ledger.verify_chain().await.unwrap())
        });

        prop_assert!(result.valid);
        prop_assert_eq!(snapshot.entries.len(), writers * per_writer);

        let prevs: HashSet<_> = snapshot.entries.iter().map(|t| t.prev_hash).collect();
        prop_assert_eq!(prevs.len(), snapshot.entries.len());
        let ids: HashSet<_> = snapshot.entries.iter().map(|t| t.token_id).collect();
        prop_assert_eq!(ids.len(), snapshot.entries.len());
        prop_assert!(snapshot
            .entries
            .windows(2)
            .all(|w| w[0].issued_at < w[1].issued_at));
    }

    /// Storage holds exactly the committed records, in order.
    #[test]
    fn storage_matches_committed_chain(writers in 1usize..6, per_writer in 1usize..4) {
        let rt = runtime();
        let (storage, snapshot) = rt.block_on(async {
            let (storage, ledger) = hammer(writers, per_writer).await;
            (storage, ledger.snapshot().await)
        });
        for (index, token) in snapshot.entries.iter().enumerate() {
            let raw = storage.raw(index as u64).unwrap().unwrap();
            let persisted: warden_ledger::ApprovalToken = serde_json::from_slice(&raw).unwrap();
            prop_assert_eq!(&persisted, token);
        }
        prop_assert!(storage.raw(snapshot.entries.len() as u64).unwrap().is_none());
    }
}

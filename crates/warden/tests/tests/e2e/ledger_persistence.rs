//! E2E: file-backed ledger persistence, reload and recovery.

use std::fs;
use std::sync::Arc;

use tempfile::TempDir;
use warden_keys::{Ed25519KeyManager, FileKeyStore, KeyManager};
use warden_ledger::{ApprovalLedger, ChainBreak, FileLedgerStorage, LedgerConfig, LedgerError, LedgerStatus};
use warden_tests::{flip_field_byte, ENABLE_AUTONOMY};

fn config(dir: &TempDir) -> LedgerConfig {
    LedgerConfig {
        data_dir: dir.path().join("ledger"),
        sync_writes: false,
        ..Default::default()
    }
}

fn keys_from(dir: &TempDir) -> Arc<dyn KeyManager> {
    let path = dir.path().join("signing.key");
    if !path.exists() {
        FileKeyStore::generate(&path).unwrap();
    }
    Arc::new(Ed25519KeyManager::load(&FileKeyStore::new(&path)).unwrap())
}

#[tokio::test]
async fn reload_reproduces_tip() {
    let dir = TempDir::new().unwrap();
    let tip = {
        let ledger = ApprovalLedger::open_dir(config(&dir), keys_from(&dir))
            .await
            .unwrap();
        for actor in ["alice", "bob", "carol", "dave"] {
            ledger.append(ENABLE_AUTONOMY, actor, None).await.unwrap();
        }
        ledger.tip().await
    };

    let reloaded = ApprovalLedger::load_dir(config(&dir), keys_from(&dir))
        .await
        .unwrap();
    assert_eq!(reloaded.tip().await, tip);
    assert_eq!(reloaded.len().await, 4);
    assert_eq!(
        reloaded
            .count_valid_approvals(Some(ENABLE_AUTONOMY), None)
            .await,
        4
    );
}

#[tokio::test]
async fn appends_after_reload_sort_after_persisted_tokens() {
    let dir = TempDir::new().unwrap();
    let first = {
        let ledger = ApprovalLedger::open_dir(config(&dir), keys_from(&dir))
            .await
            .unwrap();
        ledger.append(ENABLE_AUTONOMY, "alice", None).await.unwrap()
    };
    let ledger = ApprovalLedger::open_dir(config(&dir), keys_from(&dir))
        .await
        .unwrap();
    let second = ledger.append(ENABLE_AUTONOMY, "bob", None).await.unwrap();
    assert!(second.issued_at > first.issued_at);
    assert_eq!(second.prev_hash, first.entry_hash);
    assert!(ledger.verify_chain().await.unwrap().valid);
}

#[tokio::test]
async fn stray_temp_file_is_ignored() {
    let dir = TempDir::new().unwrap();
    {
        let ledger = ApprovalLedger::open_dir(config(&dir), keys_from(&dir))
            .await
            .unwrap();
        ledger.append(ENABLE_AUTONOMY, "alice", None).await.unwrap();
    }
    // a crash between temp write and rename leaves this behind
    fs::write(
        dir.path().join("ledger").join(".approval-0000000000000001.tmp"),
        b"{\"partial\":",
    )
    .unwrap();

    let ledger = ApprovalLedger::load_dir(config(&dir), keys_from(&dir))
        .await
        .unwrap();
    assert_eq!(ledger.len().await, 1);
    ledger.append(ENABLE_AUTONOMY, "bob", None).await.unwrap();
}

#[tokio::test]
async fn tampered_file_fails_load_and_halts_open() {
    let dir = TempDir::new().unwrap();
    {
        let ledger = ApprovalLedger::open_dir(config(&dir), keys_from(&dir))
            .await
            .unwrap();
        for actor in ["alice", "bob", "carol"] {
            ledger.append(ENABLE_AUTONOMY, actor, None).await.unwrap();
        }
    }
    let storage = FileLedgerStorage::new(dir.path().join("ledger")).unwrap();
    let path = storage.record_path(1);
    let mut bytes = fs::read(&path).unwrap();
    assert!(flip_field_byte(&mut bytes, "action", 2));
    fs::write(&path, bytes).unwrap();

    let err = ApprovalLedger::load_dir(config(&dir), keys_from(&dir))
        .await
        .err()
        .unwrap();
    assert!(matches!(
        err,
        LedgerError::ChainCorruption {
            index: 1,
            reason: ChainBreak::HashMismatch
        }
    ));

    let ledger = ApprovalLedger::open_dir(config(&dir), keys_from(&dir))
        .await
        .unwrap();
    assert!(ledger.is_halted().await);
    assert_eq!(ledger.len().await, 1);
    assert!(matches!(
        ledger.append(ENABLE_AUTONOMY, "mallory", None).await,
        Err(LedgerError::Halted { index: 1, .. })
    ));

    let audit = ledger.acknowledge_corruption("ops-lead").await.unwrap();
    assert!(audit.action.starts_with("ledger.corruption_acknowledged:1:hash_mismatch"));
    assert_eq!(ledger.status().await, LedgerStatus::Ready);

    // the corrupt tail was moved aside, not deleted
    let quarantine = dir.path().join("ledger").join("quarantine");
    let moved: usize = fs::read_dir(&quarantine)
        .unwrap()
        .map(|d| fs::read_dir(d.unwrap().path()).unwrap().count())
        .sum();
    assert_eq!(moved, 2);

    let reloaded = ApprovalLedger::load_dir(config(&dir), keys_from(&dir))
        .await
        .unwrap();
    assert_eq!(reloaded.len().await, 2);
    assert_eq!(reloaded.tip().await, audit.entry_hash);
}

#[tokio::test]
async fn rotated_key_still_verifies_old_tokens() {
    let dir = TempDir::new().unwrap();
    let old = Ed25519KeyManager::generate();
    let old_public = old.verifying_key().unwrap();
    {
        let ledger = ApprovalLedger::open_dir(config(&dir), Arc::new(old))
            .await
            .unwrap();
        ledger.append(ENABLE_AUTONOMY, "alice", None).await.unwrap();
    }

    let mut new = Ed25519KeyManager::generate();
    new.trust(old_public);
    let ledger = ApprovalLedger::load_dir(config(&dir), Arc::new(new))
        .await
        .unwrap();
    ledger.append(ENABLE_AUTONOMY, "bob", None).await.unwrap();
    assert!(ledger.verify_chain().await.unwrap().valid);

    // without the retired key the first record no longer verifies
    let stranger = Ed25519KeyManager::generate();
    let err = ApprovalLedger::load_dir(config(&dir), Arc::new(stranger))
        .await
        .err()
        .unwrap();
    assert!(matches!(
        err,
        LedgerError::ChainCorruption {
            index: 0,
            reason: ChainBreak::BadSignature
        }
    ));
}

#[tokio::test]
async fn verify_only_keys_read_but_cannot_append() {
    let dir = TempDir::new().unwrap();
    let signer = Ed25519KeyManager::generate();
    let public = signer.verifying_key().unwrap();
    {
        let ledger = ApprovalLedger::open_dir(config(&dir), Arc::new(signer))
            .await
            .unwrap();
        ledger.append(ENABLE_AUTONOMY, "alice", None).await.unwrap();
    }
    let reader = ApprovalLedger::load_dir(config(&dir), Arc::new(Ed25519KeyManager::verify_only([public])))
        .await
        .unwrap();
    assert_eq!(reader.count_valid_approvals(Some(ENABLE_AUTONOMY), None).await, 1);
    let err = reader.append(ENABLE_AUTONOMY, "bob", None).await.unwrap_err();
    assert_eq!(err.code(), "key_unavailable");
}

//! Subcommand implementations

pub mod keys;
pub mod ledger;
pub mod status;

use std::sync::Arc;

use anyhow::Context;
use serde::Serialize;
use warden_keys::{Ed25519KeyManager, KeyManager};
use warden_ledger::ApprovalLedger;

use crate::config::WardenConfig;

/// Print a value as pretty JSON on stdout.
pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn load_keys(config: &WardenConfig) -> anyhow::Result<Arc<dyn KeyManager>> {
    let store = config.keys.store();
    let keys = Ed25519KeyManager::load(&store)
        .with_context(|| format!("loading keys from {}", config.keys.seed_path.display()))?;
    Ok(Arc::new(keys))
}

/// Open the ledger the way a long-running process does: corruption leaves
/// it halted instead of failing.
pub async fn open_ledger(config: &WardenConfig) -> anyhow::Result<ApprovalLedger> {
    let keys = load_keys(config)?;
    let ledger = ApprovalLedger::open_dir(config.ledger.clone(), keys)
        .await
        .with_context(|| format!("opening ledger at {}", config.ledger.data_dir.display()))?;
    Ok(ledger)
}

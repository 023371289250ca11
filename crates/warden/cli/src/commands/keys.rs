//! Key management commands

use clap::Subcommand;
use serde_json::json;
use warden_keys::{Ed25519KeyManager, FileKeyStore, KeyManager};

use super::print_json;
use crate::config::WardenConfig;

#[derive(Subcommand)]
pub enum KeyCommands {
    /// Generate a new signing key at the configured seed path
    Generate,

    /// Show the active key id and trusted keys
    Show,
}

pub async fn execute(command: KeyCommands, config: &WardenConfig) -> anyhow::Result<()> {
    match command {
        KeyCommands::Generate => {
            let path = &config.keys.seed_path;
            let public = FileKeyStore::generate(path)?;
            let keys = Ed25519KeyManager::load(&FileKeyStore::new(path))?;
            print_json(&json!({
                "key_id": keys.active_key_id()?.as_str(),
                "public_key": hex::encode(public),
                "seed_path": path.display().to_string(),
            }))
        }
        KeyCommands::Show => {
            let keys = Ed25519KeyManager::load(&config.keys.store())?;
            let active = if keys.can_sign() {
                Some(keys.active_key_id()?.as_str().to_string())
            } else {
                None
            };
            let trusted: Vec<String> = keys
                .trusted_key_ids()
                .iter()
                .map(|id| id.as_str().to_string())
                .collect();
            print_json(&json!({
                "active_key_id": active,
                "trusted_key_ids": trusted,
            }))
        }
    }
}

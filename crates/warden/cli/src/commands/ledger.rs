//! Approval ledger commands

use clap::Subcommand;
use serde_json::json;
use warden_ledger::LedgerError;
use warden_types::{now_ms, TokenId};

use super::{open_ledger, print_json};
use crate::config::WardenConfig;
use crate::error::CliError;

#[derive(Subcommand)]
pub enum LedgerCommands {
    /// Record a human approval
    Append {
        /// Approved action, e.g. enable_autonomy
        #[arg(short, long)]
        action: String,

        /// Approving actor id
        #[arg(long)]
        actor: String,

        /// Expire the approval after this many milliseconds
        #[arg(long)]
        expires_in_ms: Option<u64>,
    },

    /// Verify the chain against persisted records
    Verify {
        /// Halt the ledger on mismatch (re-reads storage)
        #[arg(long)]
        audit: bool,
    },

    /// Count valid approvals
    Count {
        #[arg(short, long)]
        action: Option<String>,

        /// Only approvals issued within this window
        #[arg(long)]
        window_ms: Option<u64>,
    },

    /// Revoke an approval
    Revoke {
        #[arg(long)]
        token_id: String,

        #[arg(long)]
        actor: String,
    },

    /// Acknowledge detected corruption and resume appends
    Acknowledge {
        #[arg(long)]
        operator: String,
    },

    /// Show ledger statistics
    Stats,
}

pub async fn execute(command: LedgerCommands, config: &WardenConfig) -> anyhow::Result<()> {
    let ledger = open_ledger(config).await?;
    match command {
        LedgerCommands::Append {
            action,
            actor,
            expires_in_ms,
        } => {
            let expires_at = expires_in_ms.map(|ms| now_ms().saturating_add(ms));
            let token = ledger.append(&action, &actor, expires_at).await?;
            print_json(&token)
        }
        LedgerCommands::Verify { audit } => {
            let result = if audit {
                ledger.audit_storage().await?
            } else {
                ledger.verify_chain().await?
            };
            if let Some((index, reason)) = result.break_point() {
                return Err(LedgerError::ChainCorruption { index, reason }.into());
            }
            print_json(&json!({
                "result": result,
                "status": ledger.status().await,
            }))
        }
        LedgerCommands::Count { action, window_ms } => {
            let since = window_ms.map(|w| now_ms().saturating_sub(w));
            let count = ledger.count_valid_approvals(action.as_deref(), since).await;
            print_json(&json!({
                "action": action,
                "since_ms": since,
                "count": count,
            }))
        }
        LedgerCommands::Revoke { token_id, actor } => {
            let id: TokenId = token_id
                .parse()
                .map_err(|_| CliError::InvalidInput(format!("not a token id: {token_id}")))?;
            let token = ledger.revoke(id, &actor).await?;
            print_json(&token)
        }
        LedgerCommands::Acknowledge { operator } => {
            let token = ledger.acknowledge_corruption(&operator).await?;
            print_json(&json!({
                "acknowledged": token,
                "status": ledger.status().await,
            }))
        }
        LedgerCommands::Stats => print_json(&ledger.statistics().await),
    }
}

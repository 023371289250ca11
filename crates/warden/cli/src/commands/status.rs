//! One-shot integrity and autonomy evaluation

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Args;
use serde_json::json;
use tracing::{debug, info};
use warden_gate::{AutonomyConditionEvaluator, PresenceSignal};
use warden_probes::{
    DatasetIntegrityWatchdog, GovernanceIntegrityReader, LogChainEntry, LogIntegrityMonitor,
    ResourceMonitor,
};
use warden_supervisor::SystemIntegritySupervisor;

use super::{open_ledger, print_json};
use crate::config::WardenConfig;
use crate::error::CliError;

#[derive(Args)]
pub struct StatusArgs {
    /// Operator vouching that a human is online for this evaluation
    #[arg(long)]
    human_online: Option<String>,

    /// Only score integrity, skip the autonomy gate
    #[arg(long)]
    integrity_only: bool,
}

pub async fn execute(args: StatusArgs, config: &WardenConfig) -> anyhow::Result<()> {
    let log = Arc::new(LogIntegrityMonitor::new(config.log.clone())?);
    if let Some(path) = &config.inputs.log_stream {
        let entries = read_log_stream(path).await?;
        info!(entries = entries.len(), path = %path.display(), "replaying log stream");
        for entry in entries {
            log.ingest(entry);
        }
    }

    let dataset = Arc::new(DatasetIntegrityWatchdog::new(config.dataset.clone())?);
    if let Some(path) = &config.inputs.dataset_labels {
        let labels = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading dataset labels {}", path.display()))?;
        dataset.record_batch(labels.lines().map(str::trim).filter(|l| !l.is_empty()));
    }

    let supervisor = SystemIntegritySupervisor::new(config.supervisor.clone())?
        .with_probe(Arc::new(ResourceMonitor::from_config(&config.resource)?))?
        .with_probe(dataset)?
        .with_probe(log.clone())?
        .with_probe(Arc::new(GovernanceIntegrityReader::new(
            config.governance.clone(),
        )?))?;
    let supervisor = Arc::new(supervisor);

    if args.integrity_only {
        return print_json(&supervisor.evaluate().await);
    }

    let presence = Arc::new(PresenceSignal::new(Duration::from_millis(
        config.autonomy.presence_ttl_ms,
    )));
    if let Some(operator) = &args.human_online {
        presence.mark_online(operator);
    }

    let ledger = Arc::new(open_ledger(config).await?);
    let evaluator = AutonomyConditionEvaluator::new(
        Arc::new(config.autonomy.clone()),
        supervisor,
        ledger,
        log,
        presence,
    )?;
    let state = evaluator.evaluate().await;
    debug!(mode = %state.mode, reason = %state.reason, "autonomy evaluated");
    print_json(&json!({ "autonomy": state }))
}

async fn read_log_stream(path: &Path) -> anyhow::Result<Vec<LogChainEntry>> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading log stream {}", path.display()))?;
    raw.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(n, line)| {
            serde_json::from_str::<LogChainEntry>(line).map_err(|e| {
                anyhow::Error::from(CliError::InvalidInput(format!(
                    "{}:{}: {e}",
                    path.display(),
                    n + 1
                )))
            })
        })
        .collect()
}

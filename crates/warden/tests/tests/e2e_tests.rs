#[path = "e2e/autonomy_scenarios.rs"]
mod autonomy_scenarios;

#[path = "e2e/ledger_persistence.rs"]
mod ledger_persistence;

#[path = "e2e/integrity_scoring.rs"]
mod integrity_scoring;

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use warden_types::now_ms;

use crate::error::ProbeError;
use crate::probe::{IntegrityProbe, ProbeReading, Signal};

const CLEAN_SCORE: f64 = 100.0;
const GAP_SCORE: f64 = 50.0;
const BREAK_SCORE: f64 = 0.0;

/// Position in a log chain: last sequence number and its running hash.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogAnchor {
    pub seq: u64,
    pub running_hash: u32,
}

impl LogAnchor {
    /// Before the first entry. The first entry carries `seq = 1`.
    pub const GENESIS: LogAnchor = LogAnchor {
        seq: 0,
        running_hash: 0,
    };
}

/// One line of a tamper-evident log stream.
///
/// `running_hash = CRC32(running_hash_prev ‖ payload_hash ‖ seq)`. CRC-32 is
/// order sensitive and cheap; it detects loss and accidental or naive edits,
/// not a capable adversary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogChainEntry {
    pub seq: u64,
    pub payload_hash: u32,
    pub running_hash: u32,
}

impl LogChainEntry {
    pub fn payload_hash(payload: &[u8]) -> u32 {
        crc32fast::hash(payload)
    }

    pub fn link(prev_running: u32, payload_hash: u32, seq: u64) -> u32 {
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&prev_running.to_le_bytes());
        hasher.update(&payload_hash.to_le_bytes());
        hasher.update(&seq.to_le_bytes());
        hasher.finalize()
    }

    /// The entry that follows `prev` for `payload`.
    pub fn next(prev: LogAnchor, payload: &[u8]) -> Self {
        let seq = prev.seq + 1;
        let payload_hash = Self::payload_hash(payload);
        Self {
            seq,
            payload_hash,
            running_hash: Self::link(prev.running_hash, payload_hash, seq),
        }
    }

    pub fn anchor(&self) -> LogAnchor {
        LogAnchor {
            seq: self.seq,
            running_hash: self.running_hash,
        }
    }
}

/// Failure class of a log stream. Gaps point at lost writes, breaks at tampering.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LogIssueKind {
    /// Sequence numbers `from..=to` never arrived.
    Gap { from: u64, to: u64 },
    /// Hash mismatch, or a sequence number at or behind the tip.
    Break,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogIssue {
    pub seq: u64,
    pub kind: LogIssueKind,
    pub detected_at_ms: u64,
    pub resolved: bool,
}

/// Result of checking a log stream.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogVerification {
    pub valid: bool,
    /// Missing sequence numbers, truncated to the configured listing limit.
    pub gaps: Vec<u64>,
    pub missing_count: u64,
    pub first_break: Option<u64>,
    pub entries_checked: u64,
    pub tip_seq: u64,
}

impl LogVerification {
    pub fn has_gap(&self) -> bool {
        self.missing_count > 0
    }

    pub fn has_break(&self) -> bool {
        self.first_break.is_some()
    }

    /// 100 when clean, 50 with gaps only, 0 with any break.
    pub fn score(&self) -> f64 {
        if self.has_break() {
            BREAK_SCORE
        } else if self.has_gap() {
            GAP_SCORE
        } else {
            CLEAN_SCORE
        }
    }
}

/// Log monitor configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogMonitorConfig {
    /// Recent entries kept for payload checks.
    pub window_len: usize,
    pub max_listed_gaps: usize,
    /// Resolved issues kept for audit. Older ones (lowest seq) are dropped.
    pub max_resolved_issues: usize,
}

impl Default for LogMonitorConfig {
    fn default() -> Self {
        Self {
            window_len: 4096,
            max_listed_gaps: 1024,
            max_resolved_issues: 256,
        }
    }
}

impl LogMonitorConfig {
    pub fn validate(&self) -> Result<(), ProbeError> {
        if self.window_len == 0 {
            return Err(ProbeError::InvalidConfig("window_len must be positive".into()));
        }
        Ok(())
    }
}

enum Step {
    Linked,
    Gap { from: u64, to: u64 },
    Break { reanchor: bool },
}

fn step(tip: &LogAnchor, entry: &LogChainEntry) -> Step {
    if entry.seq <= tip.seq {
        return Step::Break { reanchor: false };
    }
    if entry.seq > tip.seq + 1 {
        return Step::Gap {
            from: tip.seq + 1,
            to: entry.seq - 1,
        };
    }
    if LogChainEntry::link(tip.running_hash, entry.payload_hash, entry.seq) != entry.running_hash {
        return Step::Break { reanchor: true };
    }
    Step::Linked
}

fn list_gaps(ranges: impl Iterator<Item = (u64, u64)>, limit: usize) -> (Vec<u64>, u64) {
    let mut listed = Vec::new();
    let mut missing = 0u64;
    for (from, to) in ranges {
        missing += to - from + 1;
        let room = limit.saturating_sub(listed.len()) as u64;
        listed.extend((from..=to).take(room as usize));
    }
    (listed, missing)
}

struct MonitorState {
    tip: LogAnchor,
    window: VecDeque<LogChainEntry>,
    /// Keyed by `(seq, is_break)`: a gap and a break may share a seq.
    issues: BTreeMap<(u64, bool), LogIssue>,
    entries_checked: u64,
}

/// Rolling hash chain over an append-only log stream.
///
/// Each entry is checked against the running tip as it arrives. After a gap
/// or a hash break the monitor re-anchors on the received entry, so later
/// valid entries are not flagged again. Issues stay open until an operator
/// resolves them; only the most recent resolved ones are retained.
pub struct LogIntegrityMonitor {
    config: LogMonitorConfig,
    state: Mutex<MonitorState>,
}

impl LogIntegrityMonitor {
    pub fn new(config: LogMonitorConfig) -> Result<Self, ProbeError> {
        Self::with_anchor(config, LogAnchor::GENESIS)
    }

    /// Continue a stream whose verified tip is `anchor`.
    pub fn with_anchor(config: LogMonitorConfig, anchor: LogAnchor) -> Result<Self, ProbeError> {
        config.validate()?;
        Ok(Self {
            config,
            state: Mutex::new(MonitorState {
                tip: anchor,
                window: VecDeque::new(),
                issues: BTreeMap::new(),
                entries_checked: 0,
            }),
        })
    }

    fn state(&self) -> MutexGuard<'_, MonitorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Chain `payload` onto the tip. Returns its sequence number.
    pub fn append(&self, payload: &[u8]) -> u64 {
        let mut state = self.state();
        let entry = LogChainEntry::next(state.tip, payload);
        self.accept(&mut state, entry);
        entry.seq
    }

    /// Check an entry produced elsewhere. Returns the issue it raised, if any.
    pub fn ingest(&self, entry: LogChainEntry) -> Option<LogIssueKind> {
        let mut state = self.state();
        state.entries_checked += 1;
        match step(&state.tip, &entry) {
            Step::Linked => {
                self.accept(&mut state, entry);
                None
            }
            Step::Gap { from, to } => {
                warn!(from, to, "log sequence gap detected");
                let kind = LogIssueKind::Gap { from, to };
                record(&mut state, from, kind);
                self.accept(&mut state, entry);
                Some(kind)
            }
            Step::Break { reanchor } => {
                warn!(
                    seq = entry.seq,
                    tip = state.tip.seq,
                    "log hash chain break detected"
                );
                record(&mut state, entry.seq, LogIssueKind::Break);
                if reanchor {
                    self.accept(&mut state, entry);
                }
                Some(LogIssueKind::Break)
            }
        }
    }

    /// [`ingest`](Self::ingest) for a raw payload with its claimed chain position.
    pub fn ingest_record(&self, seq: u64, payload: &[u8], running_hash: u32) -> Option<LogIssueKind> {
        self.ingest(LogChainEntry {
            seq,
            payload_hash: LogChainEntry::payload_hash(payload),
            running_hash,
        })
    }

    fn accept(&self, state: &mut MonitorState, entry: LogChainEntry) {
        state.tip = entry.anchor();
        state.window.push_back(entry);
        while state.window.len() > self.config.window_len {
            state.window.pop_front();
        }
    }

    /// Whether `payload` matches the hash recorded for `seq`. `None` when
    /// `seq` is outside the recent window.
    pub fn check_payload(&self, seq: u64, payload: &[u8]) -> Option<bool> {
        let state = self.state();
        state
            .window
            .iter()
            .find(|e| e.seq == seq)
            .map(|e| e.payload_hash == LogChainEntry::payload_hash(payload))
    }

    /// Mark the issues recorded at `seq` as remediated.
    pub fn resolve(&self, seq: u64) -> bool {
        let mut state = self.state();
        let mut resolved = false;
        for issue in state
            .issues
            .range_mut((seq, false)..=(seq, true))
            .map(|(_, issue)| issue)
            .filter(|issue| !issue.resolved)
        {
            issue.resolved = true;
            resolved = true;
            info!(seq, kind = ?issue.kind, "log integrity issue resolved");
        }
        if resolved {
            prune_resolved(&mut state, self.config.max_resolved_issues);
        }
        resolved
    }

    /// Unresolved gaps and breaks.
    pub fn verify(&self) -> LogVerification {
        let state = self.state();
        let open = || state.issues.values().filter(|i| !i.resolved);
        let (gaps, missing_count) = list_gaps(
            open().filter_map(|i| match i.kind {
                LogIssueKind::Gap { from, to } => Some((from, to)),
                LogIssueKind::Break => None,
            }),
            self.config.max_listed_gaps,
        );
        let first_break = open()
            .filter(|i| i.kind == LogIssueKind::Break)
            .map(|i| i.seq)
            .min();
        LogVerification {
            valid: missing_count == 0 && first_break.is_none(),
            gaps,
            missing_count,
            first_break,
            entries_checked: state.entries_checked,
            tip_seq: state.tip.seq,
        }
    }

    /// Verify a persisted stream offline, starting from `anchor`.
    pub fn verify_stream(anchor: LogAnchor, entries: &[LogChainEntry]) -> LogVerification {
        let mut tip = anchor;
        let mut ranges = Vec::new();
        let mut first_break = None;
        for entry in entries {
            match step(&tip, entry) {
                Step::Linked => tip = entry.anchor(),
                Step::Gap { from, to } => {
                    ranges.push((from, to));
                    tip = entry.anchor();
                }
                Step::Break { reanchor } => {
                    first_break.get_or_insert(entry.seq);
                    if reanchor {
                        tip = entry.anchor();
                    }
                }
            }
        }
        let (gaps, missing_count) =
            list_gaps(ranges.into_iter(), LogMonitorConfig::default().max_listed_gaps);
        LogVerification {
            valid: missing_count == 0 && first_break.is_none(),
            gaps,
            missing_count,
            first_break,
            entries_checked: entries.len() as u64,
            tip_seq: tip.seq,
        }
    }

    pub fn issues(&self) -> Vec<LogIssue> {
        self.state().issues.values().cloned().collect()
    }

    pub fn tip(&self) -> LogAnchor {
        self.state().tip
    }
}

fn record(state: &mut MonitorState, seq: u64, kind: LogIssueKind) {
    let is_break = kind == LogIssueKind::Break;
    state.issues.entry((seq, is_break)).or_insert(LogIssue {
        seq,
        kind,
        detected_at_ms: now_ms(),
        resolved: false,
    });
}

fn prune_resolved(state: &mut MonitorState, keep: usize) {
    let resolved: Vec<(u64, bool)> = state
        .issues
        .iter()
        .filter(|(_, issue)| issue.resolved)
        .map(|(key, _)| *key)
        .collect();
    let excess = resolved.len().saturating_sub(keep);
    for key in &resolved[..excess] {
        state.issues.remove(key);
    }
    if excess > 0 {
        debug!(dropped = excess, "pruned resolved log issues");
    }
}

#[async_trait]
impl IntegrityProbe for LogIntegrityMonitor {
    fn signal(&self) -> Signal {
        Signal::LogIntegrity
    }

    async fn sample(&self) -> Result<ProbeReading, ProbeError> {
        let report = self.verify();
        debug!(
            valid = report.valid,
            missing = report.missing_count,
            first_break = ?report.first_break,
            "log integrity sampled"
        );
        let mut reading = ProbeReading::new(report.score())
            .with_metric("missing_seqs", report.missing_count as f64)
            .with_metric("tip_seq", report.tip_seq as f64);
        if let Some(seq) = report.first_break {
            reading = reading
                .with_metric("first_break", seq as f64)
                .with_detail(format!("hash chain break at seq {seq}"));
        } else if report.has_gap() {
            reading = reading.with_detail(format!("{} missing seq(s)", report.missing_count));
        }
        Ok(reading)
    }
}

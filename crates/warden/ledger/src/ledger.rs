use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use warden_keys::KeyManager;
use warden_types::{now_ms, Hash, HybridLogicalClock, TokenId};

use crate::config::LedgerConfig;
use crate::error::LedgerError;
use crate::storage::{FileLedgerStorage, LedgerStorage, MemoryLedgerStorage, StoredRecord};
use crate::token::{ApprovalToken, TokenKind, ACKNOWLEDGE_PREFIX, REVOKE_PREFIX};
use crate::verify::{verify_records, ChainBreak, VerificationResult};

/// Whether the ledger accepts writes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LedgerStatus {
    Ready,
    /// Corruption was detected. Appends fail until an operator acknowledges.
    Halted {
        first_invalid_index: usize,
        reason: ChainBreak,
    },
}

impl LedgerStatus {
    pub fn is_halted(&self) -> bool {
        matches!(self, LedgerStatus::Halted { .. })
    }
}

/// Consistent copy of the committed chain.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub entries: Vec<ApprovalToken>,
    pub tip: Hash,
    pub status: LedgerStatus,
}

/// Statistics about the ledger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerStatistics {
    pub total_entries: usize,
    pub approvals: usize,
    pub revocations: usize,
    pub acknowledgements: usize,
    /// Approvals that are neither expired nor revoked.
    pub active_approvals: usize,
    pub expired: usize,
    pub revoked: usize,
    pub by_action: BTreeMap<String, usize>,
    pub tip: Hash,
    pub status: LedgerStatus,
}

struct ChainState {
    entries: Vec<ApprovalToken>,
    tip: Hash,
    token_ids: HashSet<TokenId>,
    revoked: HashSet<TokenId>,
    status: LedgerStatus,
}

impl ChainState {
    fn new(entries: Vec<ApprovalToken>, status: LedgerStatus) -> Self {
        let mut state = Self {
            entries: Vec::with_capacity(entries.len()),
            tip: Hash::GENESIS,
            token_ids: HashSet::with_capacity(entries.len()),
            revoked: HashSet::new(),
            status,
        };
        for token in entries {
            state.commit(token);
        }
        state
    }

    fn commit(&mut self, token: ApprovalToken) {
        self.tip = token.entry_hash;
        self.token_ids.insert(token.token_id);
        if let TokenKind::Revocation(target) = token.kind() {
            self.revoked.insert(target);
        }
        self.entries.push(token);
    }

    fn hash_before(&self, index: usize) -> Hash {
        index
            .checked_sub(1)
            .and_then(|i| self.entries.get(i))
            .map(|t| t.entry_hash)
            .unwrap_or(Hash::GENESIS)
    }
}

/// Append-only, hash-chained, signed ledger of human approvals.
///
/// Appends serialize on one write lock covering hash → sign → persist →
/// advance tip. Readers work on snapshots taken under a brief read lock.
pub struct ApprovalLedger {
    config: LedgerConfig,
    storage: Arc<dyn LedgerStorage>,
    keys: Arc<dyn KeyManager>,
    clock: HybridLogicalClock,
    state: RwLock<ChainState>,
}

impl ApprovalLedger {
    /// Empty ledger over in-memory storage.
    pub fn in_memory(keys: Arc<dyn KeyManager>) -> Self {
        Self::from_parts(
            LedgerConfig::default(),
            Arc::new(MemoryLedgerStorage::new()),
            keys,
            ChainState::new(Vec::new(), LedgerStatus::Ready),
        )
    }

    /// Load persisted records and verify them. Any break fails with
    /// [`LedgerError::ChainCorruption`].
    pub async fn load(
        config: LedgerConfig,
        storage: Arc<dyn LedgerStorage>,
        keys: Arc<dyn KeyManager>,
    ) -> Result<Self, LedgerError> {
        config.validate()?;
        let (tokens, result) = verify_stored(storage.load_all()?, keys.as_ref());
        if let Some((index, reason)) = result.break_point() {
            warn!(index, %reason, "approval chain corrupt, refusing to load");
            return Err(LedgerError::ChainCorruption { index, reason });
        }
        let ledger = Self::from_parts(
            config,
            storage,
            keys,
            ChainState::new(tokens, LedgerStatus::Ready),
        );
        ledger.sync_clock().await;
        Ok(ledger)
    }

    /// Load persisted records for a long-running process. On corruption the
    /// verified prefix is kept and the ledger starts [`LedgerStatus::Halted`].
    pub async fn open(
        config: LedgerConfig,
        storage: Arc<dyn LedgerStorage>,
        keys: Arc<dyn KeyManager>,
    ) -> Result<Self, LedgerError> {
        config.validate()?;
        let (mut tokens, result) = verify_stored(storage.load_all()?, keys.as_ref());
        let status = match result.break_point() {
            Some((first_invalid_index, reason)) => {
                warn!(
                    index = first_invalid_index,
                    %reason,
                    "approval chain corrupt, ledger halted"
                );
                tokens.truncate(first_invalid_index);
                LedgerStatus::Halted {
                    first_invalid_index,
                    reason,
                }
            }
            None => LedgerStatus::Ready,
        };
        let ledger = Self::from_parts(config, storage, keys, ChainState::new(tokens, status));
        ledger.sync_clock().await;
        Ok(ledger)
    }

    /// [`load`](Self::load) over file storage at `config.data_dir`.
    pub async fn load_dir(
        config: LedgerConfig,
        keys: Arc<dyn KeyManager>,
    ) -> Result<Self, LedgerError> {
        let storage = FileLedgerStorage::new(&config.data_dir)?.with_sync_writes(config.sync_writes);
        Self::load(config, Arc::new(storage), keys).await
    }

    /// [`open`](Self::open) over file storage at `config.data_dir`.
    pub async fn open_dir(
        config: LedgerConfig,
        keys: Arc<dyn KeyManager>,
    ) -> Result<Self, LedgerError> {
        let storage = FileLedgerStorage::new(&config.data_dir)?.with_sync_writes(config.sync_writes);
        Self::open(config, Arc::new(storage), keys).await
    }

    fn from_parts(
        config: LedgerConfig,
        storage: Arc<dyn LedgerStorage>,
        keys: Arc<dyn KeyManager>,
        state: ChainState,
    ) -> Self {
        info!(
            entries = state.entries.len(),
            tip = %state.tip,
            halted = state.status.is_halted(),
            "approval ledger opened"
        );
        Self {
            config,
            storage,
            keys,
            clock: HybridLogicalClock::new(),
            state: RwLock::new(state),
        }
    }

    async fn sync_clock(&self) {
        let state = self.state.read().await;
        if let Some(last) = state.entries.last() {
            let skew = self.clock.observe(last.issued_at);
            if skew > 0 {
                warn!(skew_ms = skew, "ledger tip is ahead of the wall clock");
            }
        }
    }

    // ---- Writes ----

    /// Issue, persist and commit a new approval.
    pub async fn append(
        &self,
        action: &str,
        actor_id: &str,
        expires_at: Option<u64>,
    ) -> Result<ApprovalToken, LedgerError> {
        self.check_field("action", action)?;
        self.check_field("actor_id", actor_id)?;
        if action.starts_with(REVOKE_PREFIX) || action.starts_with(ACKNOWLEDGE_PREFIX) {
            return Err(LedgerError::InvalidInput(format!(
                "action '{action}' uses a reserved prefix"
            )));
        }

        let mut state = self.state.write().await;
        ensure_ready(&state)?;
        self.append_locked(&mut state, action.to_string(), actor_id.to_string(), expires_at)
    }

    /// Revoke an approval by appending `revoke:<token_id>`.
    pub async fn revoke(
        &self,
        token_id: TokenId,
        actor_id: &str,
    ) -> Result<ApprovalToken, LedgerError> {
        self.check_field("actor_id", actor_id)?;

        let mut state = self.state.write().await;
        ensure_ready(&state)?;
        let target = state
            .entries
            .iter()
            .find(|t| t.token_id == token_id)
            .ok_or_else(|| LedgerError::UnknownToken(token_id.to_string()))?;
        if target.kind() != TokenKind::Approval {
            return Err(LedgerError::InvalidInput(format!(
                "token {token_id} is not an approval"
            )));
        }
        if state.revoked.contains(&token_id) {
            return Err(LedgerError::InvalidInput(format!(
                "token {token_id} is already revoked"
            )));
        }
        self.append_locked(
            &mut state,
            format!("{REVOKE_PREFIX}{token_id}"),
            actor_id.to_string(),
            None,
        )
    }

    /// Clear a halt: quarantine the corrupt tail, restore the tip to the last
    /// verified entry and append an audit token naming the break.
    pub async fn acknowledge_corruption(
        &self,
        operator_id: &str,
    ) -> Result<ApprovalToken, LedgerError> {
        self.check_field("operator_id", operator_id)?;

        let mut state = self.state.write().await;
        let LedgerStatus::Halted {
            first_invalid_index,
            reason,
        } = state.status
        else {
            return Err(LedgerError::NotHalted);
        };

        let moved = self.storage.quarantine(first_invalid_index as u64)?;
        let audit = self.append_locked(
            &mut state,
            format!("{ACKNOWLEDGE_PREFIX}{first_invalid_index}:{reason}"),
            operator_id.to_string(),
            None,
        )?;
        state.status = LedgerStatus::Ready;

        info!(
            operator = operator_id,
            index = first_invalid_index,
            %reason,
            quarantined = moved,
            "ledger corruption acknowledged"
        );
        Ok(audit)
    }

    fn append_locked(
        &self,
        state: &mut ChainState,
        action: String,
        actor_id: String,
        expires_at: Option<u64>,
    ) -> Result<ApprovalToken, LedgerError> {
        let index = state.entries.len() as u64;
        let mut token_id = TokenId::new();
        while state.token_ids.contains(&token_id) {
            token_id = TokenId::new();
        }

        let token = ApprovalToken::seal(
            token_id,
            action,
            actor_id,
            self.clock.now(),
            expires_at,
            state.tip,
            self.keys.as_ref(),
        )?;
        let bytes = serde_json::to_vec(&token)?;
        if let Err(e) = self.storage.persist(index, &bytes) {
            if !self.settle_failed_persist(state, index, &bytes, &e)? {
                return Err(e);
            }
        }
        state.commit(token.clone());

        info!(
            index,
            token_id = %token.token_id,
            action = %token.action,
            actor = %token.actor_id,
            "approval appended"
        );
        Ok(token)
    }

    /// After a failed persist, find out what actually reached storage at
    /// `index`. Returns `true` when it is exactly our record and `false` when
    /// the slot is empty. Anything else, or an unreadable slot, halts.
    fn settle_failed_persist(
        &self,
        state: &mut ChainState,
        index: u64,
        bytes: &[u8],
        cause: &LedgerError,
    ) -> Result<bool, LedgerError> {
        match self.storage.read(index) {
            Ok(None) => Ok(false),
            Ok(Some(found)) if found == bytes => {
                warn!(index, error = %cause, "persist reported failure but the record landed");
                Ok(true)
            }
            Ok(Some(_)) => {
                warn!(index, error = %cause, "foreign record at the append slot, ledger halted");
                Err(halt_at(state, index))
            }
            Err(e) => {
                warn!(index, error = %e, "cannot read back a failed write, ledger halted");
                Err(halt_at(state, index))
            }
        }
    }

    fn check_field(&self, name: &str, value: &str) -> Result<(), LedgerError> {
        if value.trim().is_empty() {
            return Err(LedgerError::InvalidInput(format!("{name} is empty")));
        }
        if value.len() > self.config.max_field_len {
            return Err(LedgerError::InvalidInput(format!(
                "{name} exceeds {} bytes",
                self.config.max_field_len
            )));
        }
        Ok(())
    }

    // ---- Reads ----

    /// Re-read persisted records and verify them from genesis, including that
    /// they match the committed in-memory chain. Does not change state.
    pub async fn verify_chain(&self) -> Result<VerificationResult, LedgerError> {
        let state = self.state.read().await;
        self.check_storage(&state)
    }

    /// Like [`verify_chain`](Self::verify_chain), but a failure halts the ledger.
    pub async fn audit_storage(&self) -> Result<VerificationResult, LedgerError> {
        let mut state = self.state.write().await;
        let result = self.check_storage(&state)?;
        if let Some((index, reason)) = result.break_point() {
            if !state.status.is_halted() {
                warn!(index, %reason, "storage audit failed, ledger halted");
            }
            let mut entries = std::mem::take(&mut state.entries);
            entries.truncate(index);
            *state = ChainState::new(
                entries,
                LedgerStatus::Halted {
                    first_invalid_index: index,
                    reason,
                },
            );
        } else {
            debug!(entries = result.verified, "storage audit passed");
        }
        Ok(result)
    }

    fn check_storage(&self, state: &ChainState) -> Result<VerificationResult, LedgerError> {
        let (tokens, disk) = verify_stored(self.storage.load_all()?, self.keys.as_ref());
        match reconcile(&state.entries, &tokens, &disk) {
            Some((index, reason)) => Ok(VerificationResult::broken(
                index,
                reason,
                state.hash_before(index),
            )),
            None => Ok(VerificationResult::ok(state.entries.len(), state.tip)),
        }
    }

    /// Approvals that verify, are not expired or revoked, and match the filters.
    /// `since_ms` is compared against the physical part of `issued_at`.
    pub async fn valid_approvals(
        &self,
        action: Option<&str>,
        since_ms: Option<u64>,
    ) -> Vec<ApprovalToken> {
        let entries = self.state.read().await.entries.clone();
        let verified = verify_records(&entries, self.keys.as_ref()).verified;
        let prefix = &entries[..verified];

        let revoked: HashSet<TokenId> = prefix
            .iter()
            .filter_map(|t| match t.kind() {
                TokenKind::Revocation(target) => Some(target),
                _ => None,
            })
            .collect();
        let now = now_ms();

        prefix
            .iter()
            .filter(|t| t.kind() == TokenKind::Approval)
            .filter(|t| !t.is_expired_at(now))
            .filter(|t| !revoked.contains(&t.token_id))
            .filter(|t| action.map_or(true, |a| t.action == a))
            .filter(|t| since_ms.map_or(true, |s| t.issued_at.physical_ms >= s))
            .cloned()
            .collect()
    }

    pub async fn count_valid_approvals(&self, action: Option<&str>, since_ms: Option<u64>) -> usize {
        self.valid_approvals(action, since_ms).await.len()
    }

    pub async fn snapshot(&self) -> LedgerSnapshot {
        let state = self.state.read().await;
        LedgerSnapshot {
            entries: state.entries.clone(),
            tip: state.tip,
            status: state.status,
        }
    }

    pub async fn statistics(&self) -> LedgerStatistics {
        let state = self.state.read().await;
        let now = now_ms();
        let mut stats = LedgerStatistics {
            total_entries: state.entries.len(),
            approvals: 0,
            revocations: 0,
            acknowledgements: 0,
            active_approvals: 0,
            expired: 0,
            revoked: 0,
            by_action: BTreeMap::new(),
            tip: state.tip,
            status: state.status,
        };

        for token in &state.entries {
            match token.kind() {
                TokenKind::Approval => {
                    stats.approvals += 1;
                    *stats.by_action.entry(token.action.clone()).or_insert(0) += 1;
                    let expired = token.is_expired_at(now);
                    let revoked = state.revoked.contains(&token.token_id);
                    if expired {
                        stats.expired += 1;
                    }
                    if revoked {
                        stats.revoked += 1;
                    }
                    if !expired && !revoked {
                        stats.active_approvals += 1;
                    }
                }
                TokenKind::Revocation(_) => stats.revocations += 1,
                TokenKind::CorruptionAcknowledged => stats.acknowledgements += 1,
            }
        }
        stats
    }

    pub async fn status(&self) -> LedgerStatus {
        self.state.read().await.status
    }

    pub async fn is_halted(&self) -> bool {
        self.status().await.is_halted()
    }

    pub async fn tip(&self) -> Hash {
        self.state.read().await.tip
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn get(&self, token_id: &TokenId) -> Option<ApprovalToken> {
        self.state
            .read()
            .await
            .entries
            .iter()
            .find(|t| &t.token_id == token_id)
            .cloned()
    }
}

fn ensure_ready(state: &ChainState) -> Result<(), LedgerError> {
    match state.status {
        LedgerStatus::Ready => Ok(()),
        LedgerStatus::Halted {
            first_invalid_index,
            reason,
        } => Err(LedgerError::Halted {
            index: first_invalid_index,
            reason,
        }),
    }
}

fn halt_at(state: &mut ChainState, index: u64) -> LedgerError {
    let index = index as usize;
    let reason = ChainBreak::HashMismatch;
    state.status = LedgerStatus::Halted {
        first_invalid_index: index,
        reason,
    };
    LedgerError::Halted { index, reason }
}

/// Decode records in index order, stopping at the first one that is missing
/// from the sequence or cannot be decoded.
fn decode_records(records: Vec<StoredRecord>) -> (Vec<ApprovalToken>, Option<usize>) {
    let mut tokens = Vec::with_capacity(records.len());
    for (position, record) in records.into_iter().enumerate() {
        if record.index != position as u64 {
            warn!(expected = position, found = record.index, "approval record missing");
            return (tokens, Some(position));
        }
        match serde_json::from_slice::<ApprovalToken>(&record.bytes) {
            Ok(token) => tokens.push(token),
            Err(e) => {
                warn!(index = position, error = %e, "approval record undecodable");
                return (tokens, Some(position));
            }
        }
    }
    (tokens, None)
}

fn verify_stored(
    records: Vec<StoredRecord>,
    keys: &dyn KeyManager,
) -> (Vec<ApprovalToken>, VerificationResult) {
    let (tokens, undecodable_at) = decode_records(records);
    let result = verify_records(&tokens, keys);
    match undecodable_at {
        // the stored bytes no longer reproduce any entry hash
        Some(index) if result.valid => {
            let tip = result.tip;
            (
                tokens,
                VerificationResult::broken(index, ChainBreak::HashMismatch, tip),
            )
        }
        _ => (tokens, result),
    }
}

/// First point where the persisted chain stops backing the committed one.
fn reconcile(
    committed: &[ApprovalToken],
    persisted: &[ApprovalToken],
    disk: &VerificationResult,
) -> Option<(usize, ChainBreak)> {
    let persisted = &persisted[..disk.verified.min(persisted.len())];
    let mut candidates = Vec::with_capacity(3);
    if let Some(point) = disk.break_point() {
        candidates.push(point);
    }
    if let Some(i) = committed.iter().zip(persisted).position(|(a, b)| a != b) {
        candidates.push((i, ChainBreak::HashMismatch));
    }
    if committed.len() < persisted.len() || (committed.len() > persisted.len() && disk.valid) {
        candidates.push((
            committed.len().min(persisted.len()),
            ChainBreak::HashMismatch,
        ));
    }
    candidates.into_iter().min_by_key(|(index, _)| *index)
}

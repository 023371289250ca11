use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use warden_keys::KeyManager;
use warden_types::Hash;

use crate::token::ApprovalToken;

/// Why a chain stopped verifying.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainBreak {
    /// Recomputed `entry_hash` differs, `prev_hash` does not link to the
    /// previous entry, or the stored record no longer decodes to a token.
    HashMismatch,
    BadSignature,
    DuplicateTokenId,
    OutOfOrderTimestamp,
}

impl ChainBreak {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChainBreak::HashMismatch => "hash_mismatch",
            ChainBreak::BadSignature => "bad_signature",
            ChainBreak::DuplicateTokenId => "duplicate_token_id",
            ChainBreak::OutOfOrderTimestamp => "out_of_order_timestamp",
        }
    }
}

impl fmt::Display for ChainBreak {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of walking a chain from genesis.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub valid: bool,
    pub first_invalid_index: Option<usize>,
    pub reason: Option<ChainBreak>,
    /// Number of leading entries that verified.
    pub verified: usize,
    /// `entry_hash` of the last verified entry, or genesis.
    pub tip: Hash,
}

impl VerificationResult {
    pub(crate) fn ok(verified: usize, tip: Hash) -> Self {
        Self {
            valid: true,
            first_invalid_index: None,
            reason: None,
            verified,
            tip,
        }
    }

    pub(crate) fn broken(index: usize, reason: ChainBreak, tip: Hash) -> Self {
        Self {
            valid: false,
            first_invalid_index: Some(index),
            reason: Some(reason),
            verified: index,
            tip,
        }
    }

    /// `(index, reason)` of the first break, if any.
    pub fn break_point(&self) -> Option<(usize, ChainBreak)> {
        self.first_invalid_index.zip(self.reason)
    }
}

/// Walk `records` from genesis and stop at the first break.
///
/// Per record the checks run in a fixed order: link, hash, signature,
/// token-id uniqueness, strictly increasing `issued_at`.
pub fn verify_records(records: &[ApprovalToken], keys: &dyn KeyManager) -> VerificationResult {
    let mut expected_prev = Hash::GENESIS;
    let mut seen = HashSet::with_capacity(records.len());
    let mut last_issued = None;

    for (index, token) in records.iter().enumerate() {
        let reason = if token.prev_hash != expected_prev || !token.has_valid_hash() {
            Some(ChainBreak::HashMismatch)
        } else if !token.has_valid_signature(keys) {
            Some(ChainBreak::BadSignature)
        } else if seen.contains(&token.token_id) {
            Some(ChainBreak::DuplicateTokenId)
        } else if last_issued.is_some_and(|prev| token.issued_at <= prev) {
            Some(ChainBreak::OutOfOrderTimestamp)
        } else {
            None
        };

        if let Some(reason) = reason {
            return VerificationResult::broken(index, reason, expected_prev);
        }

        seen.insert(token.token_id);
        last_issued = Some(token.issued_at);
        expected_prev = token.entry_hash;
    }

    VerificationResult::ok(records.len(), expected_prev)
}

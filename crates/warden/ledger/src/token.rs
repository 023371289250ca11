use serde::{Deserialize, Serialize};
use warden_keys::{KeyError, KeyId, KeyManager, Signature};
use warden_types::{Hash, HlcTimestamp, TokenId};

/// Domain tag prepended to every canonical encoding.
pub const CANONICAL_VERSION: &[u8] = b"warden-approval-v1";

/// Action prefix of revocation tokens: `revoke:<token_id>`.
pub const REVOKE_PREFIX: &str = "revoke:";

/// Action prefix of the audit token appended when an operator acknowledges
/// corruption: `ledger.corruption_acknowledged:<index>:<reason>`.
pub const ACKNOWLEDGE_PREFIX: &str = "ledger.corruption_acknowledged:";

/// Signature over `entry_hash` plus the id of the key that produced it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSignature {
    pub key_id: KeyId,
    pub value: Signature,
}

/// One authorized human action, linked into the approval chain.
///
/// Field order here is the persisted JSON field order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalToken {
    pub token_id: TokenId,
    pub action: String,
    pub actor_id: String,
    pub issued_at: HlcTimestamp,
    /// Epoch milliseconds. Expired tokens stay in the chain but are inert.
    pub expires_at: Option<u64>,
    pub prev_hash: Hash,
    pub entry_hash: Hash,
    pub signature: TokenSignature,
}

/// What an appended token means to the ledger.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenKind {
    Approval,
    Revocation(TokenId),
    CorruptionAcknowledged,
}

/// Deterministic, field-order-fixed encoding of the signed token fields.
///
/// Layout: version tag, token id (16 bytes), action and actor id as u32-LE
/// length-prefixed UTF-8, issued_at physical (u64 LE) and logical (u32 LE),
/// then an expiry flag byte followed by the u64-LE expiry when present.
pub fn canonical_encoding(
    token_id: &TokenId,
    action: &str,
    actor_id: &str,
    issued_at: HlcTimestamp,
    expires_at: Option<u64>,
) -> Vec<u8> {
    let mut buf = Vec::with_capacity(
        CANONICAL_VERSION.len() + 16 + 8 + action.len() + actor_id.len() + 12 + 9,
    );
    buf.extend_from_slice(CANONICAL_VERSION);
    buf.extend_from_slice(token_id.as_bytes());
    put_str(&mut buf, action);
    put_str(&mut buf, actor_id);
    buf.extend_from_slice(&issued_at.physical_ms.to_le_bytes());
    buf.extend_from_slice(&issued_at.logical.to_le_bytes());
    match expires_at {
        Some(ms) => {
            buf.push(1);
            buf.extend_from_slice(&ms.to_le_bytes());
        }
        None => buf.push(0),
    }
    buf
}

fn put_str(buf: &mut Vec<u8>, s: &str) {
    buf.extend_from_slice(&(s.len() as u32).to_le_bytes());
    buf.extend_from_slice(s.as_bytes());
}

/// `BLAKE3(prev_hash ‖ canonical)`.
pub fn chain_hash(prev_hash: &Hash, canonical: &[u8]) -> Hash {
    let mut hasher = blake3::Hasher::new();
    hasher.update(prev_hash.as_bytes());
    hasher.update(canonical);
    hasher.finalize().into()
}

impl ApprovalToken {
    /// Build, hash and sign a token linked to `prev_hash`.
    pub fn seal(
        token_id: TokenId,
        action: impl Into<String>,
        actor_id: impl Into<String>,
        issued_at: HlcTimestamp,
        expires_at: Option<u64>,
        prev_hash: Hash,
        keys: &dyn KeyManager,
    ) -> Result<Self, KeyError> {
        let action = action.into();
        let actor_id = actor_id.into();
        let canonical = canonical_encoding(&token_id, &action, &actor_id, issued_at, expires_at);
        let entry_hash = chain_hash(&prev_hash, &canonical);
        let signature = TokenSignature {
            key_id: keys.active_key_id()?,
            value: keys.sign(entry_hash.as_bytes())?,
        };
        Ok(Self {
            token_id,
            action,
            actor_id,
            issued_at,
            expires_at,
            prev_hash,
            entry_hash,
            signature,
        })
    }

    pub fn canonical_encoding(&self) -> Vec<u8> {
        canonical_encoding(
            &self.token_id,
            &self.action,
            &self.actor_id,
            self.issued_at,
            self.expires_at,
        )
    }

    /// Recompute the entry hash from `prev_hash` and the token fields.
    pub fn compute_entry_hash(&self) -> Hash {
        chain_hash(&self.prev_hash, &self.canonical_encoding())
    }

    pub fn has_valid_hash(&self) -> bool {
        self.compute_entry_hash() == self.entry_hash
    }

    pub fn has_valid_signature(&self, keys: &dyn KeyManager) -> bool {
        keys.verify(
            self.entry_hash.as_bytes(),
            &self.signature.value,
            &self.signature.key_id,
        )
    }

    pub fn is_expired_at(&self, now_ms: u64) -> bool {
        self.expires_at.is_some_and(|exp| now_ms >= exp)
    }

    pub fn kind(&self) -> TokenKind {
        if let Some(target) = self.action.strip_prefix(REVOKE_PREFIX) {
            if let Ok(id) = target.parse() {
                return TokenKind::Revocation(id);
            }
        }
        if self.action.starts_with(ACKNOWLEDGE_PREFIX) {
            return TokenKind::CorruptionAcknowledged;
        }
        TokenKind::Approval
    }
}

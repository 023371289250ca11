#![deny(unsafe_code)]
//! # warden-ledger
//!
//! Append-only cryptographic ledger of human approvals.
//!
//! Every [`ApprovalToken`] is linked to its predecessor through
//! `entry_hash = BLAKE3(prev_hash ‖ canonical_encoding)` and signed by the
//! active key of a [`KeyManager`](warden_keys::KeyManager). Records are never
//! edited or deleted: revocation and operator acknowledgement of corruption
//! are themselves appended tokens.
//!
//! ## Write path
//!
//! `append` runs under a single write lock: hash from tip, sign, persist the
//! record (temp file, fsync, rename), and only then advance the in-memory tip.
//! A crash between persist and commit is healed on reload, which rebuilds the
//! tip from the verified persisted records.
//!
//! ## Corruption
//!
//! [`ApprovalLedger::load`] fails fast with [`LedgerError::ChainCorruption`].
//! [`ApprovalLedger::open`] instead returns a ledger in
//! [`LedgerStatus::Halted`] that refuses appends until an operator calls
//! [`ApprovalLedger::acknowledge_corruption`].

pub mod config;
pub mod error;
pub mod ledger;
pub mod storage;
pub mod token;
pub mod verify;

pub use config::LedgerConfig;
pub use error::LedgerError;
pub use ledger::{ApprovalLedger, LedgerSnapshot, LedgerStatistics, LedgerStatus};
pub use storage::{FileLedgerStorage, LedgerStorage, MemoryLedgerStorage, StoredRecord};
pub use token::{canonical_encoding, ApprovalToken, TokenKind, TokenSignature};
pub use verify::{verify_records, ChainBreak, VerificationResult};

#![deny(unsafe_code)]
//! # warden-keys
//!
//! Key management for approval tokens.
//!
//! Key material is loaded once at startup from a [`KeyStore`] and then held
//! only in memory. Signing without key material fails with
//! [`KeyError::KeyUnavailable`]; there is no unsigned fallback.
//!
//! - [`KeyManager`]: sign / verify contract consumed by the ledger
//! - [`Ed25519KeyManager`]: one active signing key plus trusted verifying keys
//! - [`FileKeyStore`]: hex seed file + optional trusted public key list

pub mod error;
pub mod manager;
pub mod store;

pub use error::KeyError;
pub use manager::{Ed25519KeyManager, KeyId, KeyManager, Signature};
pub use store::{FileKeyStore, KeyMaterial, KeyStore};

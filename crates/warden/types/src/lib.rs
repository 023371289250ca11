#![deny(unsafe_code)]
//! # warden-types
//!
//! Primitives shared by every warden crate.
//!
//! - [`Hash`]: 32-byte BLAKE3 digest, serialized as lowercase hex
//! - [`HybridLogicalClock`] / [`HlcTimestamp`]: wall-clock close, strictly
//!   monotonic timestamps for approval tokens
//! - [`TokenId`]: unique approval token identifier

pub mod hash;
pub mod hlc;
pub mod ids;

pub use hash::{Hash, HashParseError};
pub use hlc::{now_ms, HlcTimestamp, HybridLogicalClock};
pub use ids::TokenId;

use std::collections::BTreeMap;
use std::fmt;

use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::KeyError;
use crate::store::{KeyMaterial, KeyStore};

/// Short identifier of a verifying key: first 8 bytes of BLAKE3(public key), hex.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyId(String);

impl KeyId {
    pub fn for_key(key: &VerifyingKey) -> Self {
        let digest = blake3::hash(key.as_bytes());
        Self(hex::encode(&digest.as_bytes()[..8]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Hex-encoded 64-byte Ed25519 signature.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Signature(String);

impl Signature {
    pub fn from_bytes(bytes: &[u8; 64]) -> Self {
        Self(hex::encode(bytes))
    }

    /// Raw signature bytes, or `None` if the stored value is not 64 bytes of hex.
    pub fn to_bytes(&self) -> Option<[u8; 64]> {
        hex::decode(&self.0).ok()?.as_slice().try_into().ok()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Sign / verify contract used for approval tokens.
pub trait KeyManager: Send + Sync {
    /// Identifier of the key [`sign`](Self::sign) currently uses.
    fn active_key_id(&self) -> Result<KeyId, KeyError>;

    /// Sign `payload` with the active key.
    fn sign(&self, payload: &[u8]) -> Result<Signature, KeyError>;

    /// Check `signature` over `payload` against the trusted key `key_id`.
    /// Unknown keys and malformed signatures verify as `false`.
    fn verify(&self, payload: &[u8], signature: &Signature, key_id: &KeyId) -> bool;
}

/// Ed25519 key manager: at most one active signing key plus a set of trusted
/// verifying keys, so tokens signed before a key rotation keep verifying.
pub struct Ed25519KeyManager {
    signing: Option<(KeyId, SigningKey)>,
    trusted: BTreeMap<KeyId, VerifyingKey>,
}

impl Ed25519KeyManager {
    /// Manager that signs with `key` and trusts its verifying key.
    pub fn from_signing_key(key: SigningKey) -> Self {
        let verifying = key.verifying_key();
        let key_id = KeyId::for_key(&verifying);
        let mut trusted = BTreeMap::new();
        trusted.insert(key_id.clone(), verifying);
        Self {
            signing: Some((key_id, key)),
            trusted,
        }
    }

    /// Manager with a fresh random signing key (OS RNG).
    pub fn generate() -> Self {
        let mut seed = zeroize::Zeroizing::new([0u8; 32]);
        rand::RngCore::fill_bytes(&mut rand::rngs::OsRng, seed.as_mut());
        Self::from_signing_key(SigningKey::from_bytes(&seed))
    }

    /// Manager that can only verify. `sign` fails with `KeyUnavailable`.
    pub fn verify_only(keys: impl IntoIterator<Item = VerifyingKey>) -> Self {
        let trusted = keys
            .into_iter()
            .map(|k| (KeyId::for_key(&k), k))
            .collect();
        Self {
            signing: None,
            trusted,
        }
    }

    /// Build from loaded key material.
    pub fn from_material(material: &KeyMaterial) -> Result<Self, KeyError> {
        let mut manager = match material.signing_seed() {
            Some(seed) => Self::from_signing_key(SigningKey::from_bytes(seed)),
            None => Self::verify_only(std::iter::empty()),
        };
        for raw in material.trusted_public_keys() {
            let key = VerifyingKey::from_bytes(raw)
                .map_err(|e| KeyError::InvalidKeyMaterial(format!("trusted key: {e}")))?;
            manager.trust(key);
        }
        if manager.signing.is_none() && manager.trusted.is_empty() {
            return Err(KeyError::KeyUnavailable);
        }
        Ok(manager)
    }

    /// Load from a key store once at startup.
    pub fn load(store: &dyn KeyStore) -> Result<Self, KeyError> {
        let material = store.load()?;
        let manager = Self::from_material(&material)?;
        debug!(
            can_sign = manager.can_sign(),
            trusted_keys = manager.trusted.len(),
            "key material loaded"
        );
        Ok(manager)
    }

    /// Add a trusted verifying key (e.g. a retired signing key).
    pub fn trust(&mut self, key: VerifyingKey) -> KeyId {
        let key_id = KeyId::for_key(&key);
        self.trusted.insert(key_id.clone(), key);
        key_id
    }

    pub fn can_sign(&self) -> bool {
        self.signing.is_some()
    }

    pub fn verifying_key(&self) -> Option<VerifyingKey> {
        self.signing.as_ref().map(|(_, k)| k.verifying_key())
    }

    pub fn trusted_key_ids(&self) -> Vec<KeyId> {
        self.trusted.keys().cloned().collect()
    }
}

impl KeyManager for Ed25519KeyManager {
    fn active_key_id(&self) -> Result<KeyId, KeyError> {
        self.signing
            .as_ref()
            .map(|(id, _)| id.clone())
            .ok_or(KeyError::KeyUnavailable)
    }

    fn sign(&self, payload: &[u8]) -> Result<Signature, KeyError> {
        let (_, key) = self.signing.as_ref().ok_or(KeyError::KeyUnavailable)?;
        Ok(Signature::from_bytes(&key.sign(payload).to_bytes()))
    }

    fn verify(&self, payload: &[u8], signature: &Signature, key_id: &KeyId) -> bool {
        let Some(key) = self.trusted.get(key_id) else {
            return false;
        };
        let Some(bytes) = signature.to_bytes() else {
            return false;
        };
        key.verify(payload, &ed25519_dalek::Signature::from_bytes(&bytes))
            .is_ok()
    }
}

impl fmt::Debug for Ed25519KeyManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ed25519KeyManager")
            .field("active", &self.signing.as_ref().map(|(id, _)| id))
            .field("trusted", &self.trusted.keys().collect::<Vec<_>>())
            .finish()
    }
}

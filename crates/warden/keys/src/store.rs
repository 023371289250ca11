use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use rand::rngs::OsRng;
use rand::RngCore;
use tracing::{info, warn};
use zeroize::Zeroizing;

use crate::error::KeyError;

/// Raw key material as read from a store. The seed is wiped on drop.
#[derive(Default)]
pub struct KeyMaterial {
    signing_seed: Option<Zeroizing<[u8; 32]>>,
    trusted_public_keys: Vec<[u8; 32]>,
}

impl KeyMaterial {
    pub fn new(signing_seed: Option<[u8; 32]>, trusted_public_keys: Vec<[u8; 32]>) -> Self {
        Self {
            signing_seed: signing_seed.map(Zeroizing::new),
            trusted_public_keys,
        }
    }

    pub fn signing_seed(&self) -> Option<&[u8; 32]> {
        self.signing_seed.as_deref()
    }

    pub fn trusted_public_keys(&self) -> &[[u8; 32]] {
        &self.trusted_public_keys
    }
}

/// Source of key material. Read once at startup.
pub trait KeyStore: Send + Sync {
    fn load(&self) -> Result<KeyMaterial, KeyError>;
}

/// File-backed key store.
///
/// The seed file holds a 32-byte Ed25519 seed as hex. The optional trusted
/// file lists one hex public key per line; blank lines and `#` comments are
/// ignored.
#[derive(Debug, Clone)]
pub struct FileKeyStore {
    seed_path: PathBuf,
    trusted_path: Option<PathBuf>,
}

impl FileKeyStore {
    pub fn new(seed_path: impl Into<PathBuf>) -> Self {
        Self {
            seed_path: seed_path.into(),
            trusted_path: None,
        }
    }

    pub fn with_trusted_keys(mut self, path: impl Into<PathBuf>) -> Self {
        self.trusted_path = Some(path.into());
        self
    }

    pub fn seed_path(&self) -> &Path {
        &self.seed_path
    }

    /// Write a fresh random seed to `path` and return the matching public key.
    /// Refuses to overwrite an existing file.
    pub fn generate(path: impl AsRef<Path>) -> Result<[u8; 32], KeyError> {
        let path = path.as_ref();
        let mut seed = Zeroizing::new([0u8; 32]);
        OsRng.fill_bytes(seed.as_mut());

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut options = fs::OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(path)?;
        let encoded = Zeroizing::new(hex::encode(seed.as_ref()));
        file.write_all(encoded.as_bytes())?;
        file.write_all(b"\n")?;
        file.sync_all()?;

        let public = ed25519_dalek::SigningKey::from_bytes(&seed)
            .verifying_key()
            .to_bytes();
        info!(path = %path.display(), "generated signing key");
        Ok(public)
    }

    fn read_seed(&self) -> Result<Option<[u8; 32]>, KeyError> {
        let raw = match fs::read_to_string(&self.seed_path) {
            Ok(s) => Zeroizing::new(s),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %self.seed_path.display(), "signing key file not found");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };
        let bytes = Zeroizing::new(
            hex::decode(raw.trim())
                .map_err(|e| KeyError::InvalidKeyMaterial(format!("seed is not hex: {e}")))?,
        );
        let seed: [u8; 32] = bytes.as_slice().try_into().map_err(|_| {
            KeyError::InvalidKeyMaterial(format!("seed must be 32 bytes, got {}", bytes.len()))
        })?;
        Ok(Some(seed))
    }

    fn read_trusted(&self) -> Result<Vec<[u8; 32]>, KeyError> {
        let Some(path) = &self.trusted_path else {
            return Ok(Vec::new());
        };
        let text = fs::read_to_string(path)?;
        let mut keys = Vec::new();
        for (lineno, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let bytes = hex::decode(line).map_err(|e| {
                KeyError::InvalidKeyMaterial(format!("trusted key line {}: {e}", lineno + 1))
            })?;
            let key: [u8; 32] = bytes.as_slice().try_into().map_err(|_| {
                KeyError::InvalidKeyMaterial(format!(
                    "trusted key line {}: expected 32 bytes",
                    lineno + 1
                ))
            })?;
            keys.push(key);
        }
        Ok(keys)
    }
}

impl KeyStore for FileKeyStore {
    fn load(&self) -> Result<KeyMaterial, KeyError> {
        let seed = self.read_seed()?;
        let trusted = self.read_trusted()?;
        if seed.is_none() && trusted.is_empty() {
            return Err(KeyError::KeyUnavailable);
        }
        let mut material = KeyMaterial::new(seed, trusted);
        material.trusted_public_keys.dedup();
        Ok(material)
    }
}

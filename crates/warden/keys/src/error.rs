use thiserror::Error;

/// Errors from key loading and signing.
#[derive(Debug, Error)]
pub enum KeyError {
    /// No signing key is loaded. Fatal for token issuance.
    #[error("no signing key material available")]
    KeyUnavailable,

    #[error("invalid key material: {0}")]
    InvalidKeyMaterial(String),

    #[error("key store I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl KeyError {
    /// Stable identifier for structured output.
    pub fn code(&self) -> &'static str {
        match self {
            KeyError::KeyUnavailable => "key_unavailable",
            KeyError::InvalidKeyMaterial(_) => "invalid_key_material",
            KeyError::Io(_) => "key_store_io",
        }
    }
}

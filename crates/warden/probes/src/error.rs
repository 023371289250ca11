use thiserror::Error;

/// Errors from integrity probes. Both variants are recoverable: the
/// supervisor excludes the signal instead of defaulting it.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ProbeError {
    #[error("probe unavailable: {0}")]
    Unavailable(String),

    #[error("probe timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("invalid probe configuration: {0}")]
    InvalidConfig(String),
}

impl ProbeError {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        ProbeError::Unavailable(reason.into())
    }

    /// Stable identifier for structured output.
    pub fn code(&self) -> &'static str {
        match self {
            ProbeError::Unavailable(_) => "probe_unavailable",
            ProbeError::Timeout { .. } => "probe_timeout",
            ProbeError::InvalidConfig(_) => "invalid_config",
        }
    }
}

impl From<std::io::Error> for ProbeError {
    fn from(e: std::io::Error) -> Self {
        ProbeError::Unavailable(e.to_string())
    }
}

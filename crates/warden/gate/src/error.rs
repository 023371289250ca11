use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum GateError {
    #[error("invalid autonomy configuration: {0}")]
    InvalidConfig(String),
}

impl GateError {
    pub fn code(&self) -> &'static str {
        match self {
            GateError::InvalidConfig(_) => "invalid_config",
        }
    }
}

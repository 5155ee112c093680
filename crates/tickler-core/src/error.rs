use thiserror::Error;

/// A reminder input (or stored row) that does not satisfy its pattern's
/// requirements. The message is client-facing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ValidationError(pub String);

impl ValidationError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }

    /// `"<field> is not defined"`: a pattern's required field is absent.
    pub fn missing(field: &str) -> Self {
        Self(format!("{field} is not defined"))
    }

    pub fn pattern_undefined() -> Self {
        Self("pattern must be defined".to_string())
    }
}

#[derive(Debug, Error)]
pub enum TicklerError {
    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, TicklerError>;

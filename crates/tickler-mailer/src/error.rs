use thiserror::Error;

/// A transport fault: the mail was not handed off, or the relay's answer
/// could not be understood.
#[derive(Debug, Error)]
pub enum MailError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Mail relay error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Mail configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, MailError>;

use thiserror::Error;
use tickler_core::{ReminderId, ValidationError};
use tickler_mailer::MailError;

/// Errors that can occur within the scheduling engine.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Underlying SQLite / rusqlite error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Reminder fields do not satisfy the pattern's requirements.
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// No reminder with the given ID exists in the store.
    #[error("Reminder not found: {id}")]
    ReminderNotFound { id: ReminderId },

    /// A stored reminder is missing data the engine relies on
    /// (e.g. a one-off row without `send_at`).
    #[error("Precondition failed: {0}")]
    Precondition(String),

    /// The mail transport faulted.
    #[error("Mail transport error: {0}")]
    Transport(#[from] MailError),

    /// A cron expression the `cron` crate could not evaluate.
    #[error("Invalid schedule: {0}")]
    InvalidSchedule(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SchedulerError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, SchedulerError::ReminderNotFound { .. })
    }
}

pub type Result<T> = std::result::Result<T, SchedulerError>;

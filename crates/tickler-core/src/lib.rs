//! `tickler-core`: configuration, errors and the reminder model shared by
//! every other tickler crate.

pub mod config;
pub mod error;
pub mod reminder;
pub mod types;

pub use error::{Result, TicklerError, ValidationError};
pub use reminder::{NewReminder, Recurrence, Reminder, ReminderFields, ValidReminder};
pub use types::{OccurrenceKind, Pattern, ReminderId, ReminderStatus, WallTime};

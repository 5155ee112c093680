use std::time::Duration;

use serde::{Deserialize, Serialize};
use tickler_core::{OccurrenceKind, Reminder, ReminderId};

use crate::recurrence::CronExpression;

/// Registry name of a reminder's in-process timer.
pub fn timeout_job_name(id: ReminderId) -> String {
    format!("reminder-timeout-{id}")
}

/// Registry name of a reminder's cron registration.
pub fn cron_job_name(id: ReminderId) -> String {
    format!("reminder-cron-{id}")
}

/// Durable queue job name; doubles as the queue's dedup key.
pub fn queue_job_name(id: ReminderId) -> String {
    format!("reminder-queue-{id}")
}

/// Everything needed to deliver one occurrence.
///
/// Serialized into `queue_jobs.payload`; timers and cron registrations carry
/// the same value in memory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobPayload {
    pub reminder_id: ReminderId,
    pub email: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
    pub occurrence_kind: OccurrenceKind,
}

impl JobPayload {
    pub fn for_reminder(reminder: &Reminder) -> Self {
        Self {
            reminder_id: reminder.id,
            email: reminder.email.clone(),
            message: reminder.message.clone(),
            subject: reminder.subject.clone(),
            occurrence_kind: reminder.occurrence_kind(),
        }
    }
}

/// How the transport answered for one occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryResult {
    /// The recipient address was accepted.
    Delivered,
    /// The recipient address was rejected.
    Rejected,
    /// The transport answered with neither accepted nor rejected addresses.
    Malformed,
}

/// Result of one delivery attempt that reached the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeliveryOutcome {
    pub reminder_id: ReminderId,
    pub kind: OccurrenceKind,
    pub result: DeliveryResult,
    /// Transport message id, for log correlation.
    pub message_id: Option<String>,
}

impl DeliveryOutcome {
    pub fn is_success(&self) -> bool {
        self.result == DeliveryResult::Delivered
    }
}

/// What the dispatch selector did with a reminder.
#[derive(Debug, Clone, PartialEq)]
pub enum Armed {
    /// Past due: delivered on the spot. `None` when the attempt faulted.
    Immediate { outcome: Option<DeliveryOutcome> },
    /// In-process timer armed.
    Timer { name: String, delay: Duration },
    /// Durable delayed-queue entry created.
    Queued { name: String, delay: Duration },
    /// Recurring cron registration armed.
    Cron { name: String, expression: CronExpression },
    /// A mechanism with this name already exists; nothing new was armed.
    AlreadyArmed { name: String },
}

impl Armed {
    /// Name of the mechanism, if one is (or already was) registered.
    pub fn job_name(&self) -> Option<&str> {
        match self {
            Armed::Immediate { .. } => None,
            Armed::Timer { name, .. }
            | Armed::Queued { name, .. }
            | Armed::Cron { name, .. }
            | Armed::AlreadyArmed { name } => Some(name),
        }
    }
}

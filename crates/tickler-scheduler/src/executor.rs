use std::sync::Arc;

use tickler_core::reminder::DEFAULT_MESSAGE;
use tickler_core::{OccurrenceKind, ReminderStatus};
use tickler_mailer::{MailTransport, SendReport};
use tracing::{error, info, warn};

use crate::error::Result;
use crate::store::ReminderStore;
use crate::types::{DeliveryOutcome, DeliveryResult, JobPayload};

/// Subject used when a reminder carries none.
pub const DEFAULT_SUBJECT: &str = "Reminder";

/// Sends one occurrence and records the outcome.
///
/// Status writes only touch one-off reminders; a recurring reminder stays
/// `pending` whatever a single occurrence does.
pub struct DeliveryExecutor {
    store: Arc<dyn ReminderStore>,
    transport: Arc<dyn MailTransport>,
}

fn non_empty(s: &Option<String>) -> Option<&str> {
    s.as_deref().filter(|s| !s.trim().is_empty())
}

fn classify(report: &SendReport) -> DeliveryResult {
    if !report.rejected.is_empty() {
        DeliveryResult::Rejected
    } else if !report.accepted.is_empty() {
        DeliveryResult::Delivered
    } else {
        DeliveryResult::Malformed
    }
}

impl DeliveryExecutor {
    pub fn new(store: Arc<dyn ReminderStore>, transport: Arc<dyn MailTransport>) -> Self {
        Self { store, transport }
    }

    /// Deliver one occurrence.
    ///
    /// A rejected or malformed transport answer is an `Ok` outcome that is
    /// not a success. A transport fault is recorded and then returned, so the
    /// caller decides whether to retry.
    pub async fn deliver(&self, payload: &JobPayload) -> Result<DeliveryOutcome> {
        let id = payload.reminder_id;
        let body = non_empty(&payload.message).unwrap_or(DEFAULT_MESSAGE);
        let subject = non_empty(&payload.subject).unwrap_or(DEFAULT_SUBJECT);

        let report = match self.transport.send(&payload.email, subject, body).await {
            Ok(report) => report,
            Err(e) => {
                error!(reminder_id = id.get(), transport = self.transport.name(), "delivery faulted: {e}");
                self.record(payload, ReminderStatus::Failed).await;
                return Err(e.into());
            }
        };

        let result = classify(&report);
        match result {
            DeliveryResult::Delivered => {
                info!(
                    reminder_id = id.get(),
                    kind = %payload.occurrence_kind,
                    message_id = report.message_id.as_deref().unwrap_or("-"),
                    "reminder delivered"
                );
                self.record(payload, ReminderStatus::Completed).await;
            }
            DeliveryResult::Rejected => {
                warn!(reminder_id = id.get(), rejected = ?report.rejected, "recipient rejected");
                self.record(payload, ReminderStatus::Failed).await;
            }
            DeliveryResult::Malformed => {
                warn!(reminder_id = id.get(), "transport reported neither accepted nor rejected");
                self.record(payload, ReminderStatus::Failed).await;
            }
        }

        Ok(DeliveryOutcome {
            reminder_id: id,
            kind: payload.occurrence_kind,
            result,
            message_id: report.message_id,
        })
    }

    /// Persist the outcome of a one-off occurrence. The mail is already out,
    /// so a failed write is logged rather than returned.
    async fn record(&self, payload: &JobPayload, status: ReminderStatus) {
        if payload.occurrence_kind != OccurrenceKind::OneOff {
            return;
        }
        let id = payload.reminder_id;
        match self.store.update_status(id, status).await {
            Ok(true) => {}
            Ok(false) => {
                warn!(reminder_id = id.get(), %status, "reminder already completed, outcome not recorded");
            }
            Err(e) if e.is_not_found() => {
                warn!(reminder_id = id.get(), %status, "reminder vanished before status update");
            }
            Err(e) => error!(reminder_id = id.get(), %status, "status update failed: {e}"),
        }
    }
}

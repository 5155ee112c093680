use std::sync::Arc;

use tickler_core::ReminderStatus;
use tracing::{debug, info};

use crate::error::Result;
use crate::executor::DeliveryExecutor;
use crate::store::ReminderStore;
use crate::types::{DeliveryOutcome, JobPayload};

/// What [`QueueConsumer::on_message`] did with a delivery.
#[derive(Debug, Clone, PartialEq)]
pub enum Consumed {
    /// The reminder no longer exists; the message was dropped.
    Missing,
    /// Already completed by an earlier delivery; the message was dropped.
    AlreadyCompleted,
    /// The executor ran.
    Delivered(DeliveryOutcome),
}

/// Guard in front of the executor for every fire path.
///
/// Queue deliveries are at-least-once and timers can race a cancellation,
/// so each message re-reads the reminder before anything is sent.
pub struct QueueConsumer {
    store: Arc<dyn ReminderStore>,
    executor: Arc<DeliveryExecutor>,
}

impl QueueConsumer {
    pub fn new(store: Arc<dyn ReminderStore>, executor: Arc<DeliveryExecutor>) -> Self {
        Self { store, executor }
    }

    /// Errors (store or transport faults) are returned so the queue can
    /// retry within its attempt budget.
    pub async fn on_message(&self, payload: &JobPayload) -> Result<Consumed> {
        let id = payload.reminder_id;
        let Some(reminder) = self.store.find_by_id(id).await? else {
            info!(reminder_id = id.get(), "reminder not found, dropping occurrence");
            return Ok(Consumed::Missing);
        };

        if reminder.status == ReminderStatus::Completed {
            debug!(reminder_id = id.get(), "reminder already completed, dropping duplicate");
            return Ok(Consumed::AlreadyCompleted);
        }

        let outcome = self.executor.deliver(payload).await?;
        Ok(Consumed::Delivered(outcome))
    }
}

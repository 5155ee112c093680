use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tickler_core::{Recurrence, Reminder};
use tracing::{error, info, warn};

use crate::dispatch::DispatchSelector;
use crate::error::Result;
use crate::executor::DeliveryExecutor;
use crate::store::ReminderStore;
use crate::types::{Armed, JobPayload};

/// Tally of one recovery pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RecoveryReport {
    pub recurring_armed: usize,
    pub one_off_armed: usize,
    /// Past-due one-off reminders delivered on the spot.
    pub dispatched: usize,
    /// Reminders whose mechanism was already live.
    pub already_armed: usize,
    /// Pending rows that no longer decode into a reminder.
    pub skipped: usize,
    pub failed: usize,
}

impl RecoveryReport {
    pub fn total(&self) -> usize {
        self.recurring_armed
            + self.one_off_armed
            + self.dispatched
            + self.already_armed
            + self.skipped
            + self.failed
    }

    fn count(&mut self, armed: &Armed) {
        match armed {
            Armed::Cron { .. } => self.recurring_armed += 1,
            Armed::Timer { .. } | Armed::Queued { .. } => self.one_off_armed += 1,
            Armed::Immediate { .. } => self.dispatched += 1,
            Armed::AlreadyArmed { .. } => self.already_armed += 1,
        }
    }
}

/// Re-derives armed state from persisted reminders after a restart.
pub struct RecoveryManager {
    store: Arc<dyn ReminderStore>,
    dispatch: Arc<DispatchSelector>,
    executor: Arc<DeliveryExecutor>,
}

impl RecoveryManager {
    pub fn new(
        store: Arc<dyn ReminderStore>,
        dispatch: Arc<DispatchSelector>,
        executor: Arc<DeliveryExecutor>,
    ) -> Self {
        Self {
            store,
            dispatch,
            executor,
        }
    }

    /// Run once at startup, before traffic is accepted. Only the initial
    /// load can fail; every reminder after that is handled in isolation.
    pub async fn recover(&self) -> Result<RecoveryReport> {
        let pending = self.store.scan_pending().await?;
        let mut report = RecoveryReport::default();
        if pending.is_empty() {
            info!("no pending reminders to recover");
            return Ok(report);
        }

        info!(count = pending.len(), "recovering pending reminders");
        for decoded in &pending {
            let reminder = match decoded {
                Ok(reminder) => reminder,
                Err(e) => {
                    warn!("skipping pending reminder: {e}");
                    report.skipped += 1;
                    continue;
                }
            };
            match self.recover_one(reminder).await {
                Ok(armed) => report.count(&armed),
                Err(e) => {
                    error!(reminder_id = reminder.id.get(), "recovery failed: {e}");
                    report.failed += 1;
                }
            }
        }

        info!(
            recurring = report.recurring_armed,
            one_off = report.one_off_armed,
            dispatched = report.dispatched,
            already_armed = report.already_armed,
            skipped = report.skipped,
            failed = report.failed,
            "recovery complete"
        );
        Ok(report)
    }

    async fn recover_one(&self, reminder: &Reminder) -> Result<Armed> {
        match reminder.recurrence {
            Recurrence::Once { send_at } if send_at <= Utc::now() => {
                warn!(reminder_id = reminder.id.get(), %send_at, "one-off reminder missed while down, delivering now");
                let outcome = self.executor.deliver(&JobPayload::for_reminder(reminder)).await?;
                Ok(Armed::Immediate {
                    outcome: Some(outcome),
                })
            }
            Recurrence::Once { .. } => self.dispatch.schedule_one_off(reminder).await,
            _ => self.dispatch.schedule_recurring(reminder),
        }
    }
}

use std::sync::Arc;

use chrono::Utc;
use tickler_core::{NewReminder, Reminder, ReminderId};
use tickler_mailer::MailTransport;
use tracing::{error, info};

use crate::consumer::QueueConsumer;
use crate::dispatch::{DispatchSelector, DispatchSettings};
use crate::error::Result;
use crate::executor::DeliveryExecutor;
use crate::queue::DelayedQueue;
use crate::recovery::{RecoveryManager, RecoveryReport};
use crate::registry::JobRegistry;
use crate::store::ReminderStore;

/// Entry point for the API layer. Wires the engine components around the
/// collaborators it is given.
pub struct ReminderService {
    store: Arc<dyn ReminderStore>,
    registry: Arc<JobRegistry>,
    dispatch: Arc<DispatchSelector>,
    consumer: Arc<QueueConsumer>,
    recovery: RecoveryManager,
}

impl ReminderService {
    pub fn new(
        store: Arc<dyn ReminderStore>,
        queue: Arc<dyn DelayedQueue>,
        transport: Arc<dyn MailTransport>,
        registry: Arc<JobRegistry>,
        settings: DispatchSettings,
    ) -> Self {
        let executor = Arc::new(DeliveryExecutor::new(Arc::clone(&store), transport));
        let consumer = Arc::new(QueueConsumer::new(Arc::clone(&store), Arc::clone(&executor)));
        let dispatch = Arc::new(DispatchSelector::new(
            Arc::clone(&registry),
            queue,
            Arc::clone(&executor),
            Arc::clone(&consumer),
            settings,
        ));
        let recovery = RecoveryManager::new(Arc::clone(&store), Arc::clone(&dispatch), executor);
        Self {
            store,
            registry,
            dispatch,
            consumer,
            recovery,
        }
    }

    /// Validate, persist and arm a new reminder.
    ///
    /// Once the row exists the reminder is returned even if arming fails;
    /// the failure is logged and the next recovery pass re-arms it.
    pub async fn create_and_schedule(&self, input: NewReminder) -> Result<Reminder> {
        let valid = input.validate(Utc::now())?;
        let reminder = self.store.create(valid).await?;
        match self.dispatch.schedule(&reminder).await {
            Ok(armed) => info!(reminder_id = reminder.id.get(), ?armed, "reminder scheduled"),
            Err(e) => error!(reminder_id = reminder.id.get(), "arming failed: {e}"),
        }
        Ok(reminder)
    }

    /// Delete the reminder and disarm its live mechanism. Already enqueued
    /// queue jobs find nothing when they fire.
    pub async fn cancel(&self, id: ReminderId) -> Result<()> {
        self.store.delete(id).await?;
        let disarmed = self.dispatch.disarm(id);
        info!(reminder_id = id.get(), disarmed, "reminder cancelled");
        Ok(())
    }

    pub async fn list_upcoming(&self) -> Result<Vec<Reminder>> {
        self.store.find_upcoming(Utc::now()).await
    }

    pub async fn recover(&self) -> Result<RecoveryReport> {
        self.recovery.recover().await
    }

    /// Guarded entry point for queue workers.
    pub fn consumer(&self) -> Arc<QueueConsumer> {
        Arc::clone(&self.consumer)
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    pub fn dispatch(&self) -> &Arc<DispatchSelector> {
        &self.dispatch
    }
}

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local, Utc};
use tickler_core::config::{DispatchConfig, OneOffMechanism, QueueConfig};
use tickler_core::{Recurrence, Reminder, ReminderId};
use tokio::task::AbortHandle;
use tracing::{debug, error, info, warn};

use crate::consumer::{Consumed, QueueConsumer};
use crate::error::{Result, SchedulerError};
use crate::executor::DeliveryExecutor;
use crate::queue::{DelayedQueue, EnqueueOptions};
use crate::recurrence::compile_recurrence;
use crate::registry::{JobRegistry, JobToken};
use crate::types::{cron_job_name, queue_job_name, timeout_job_name, Armed, JobPayload};

/// Dispatch knobs, resolved from `[dispatch]` and `[queue]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchSettings {
    pub one_off: OneOffMechanism,
    /// Longest delay handed to an in-process timer; also the longest single
    /// sleep of a cron task.
    pub max_timeout: Duration,
    pub max_attempts: u32,
}

impl DispatchSettings {
    pub fn from_config(dispatch: &DispatchConfig, queue: &QueueConfig) -> Self {
        Self {
            one_off: dispatch.one_off,
            max_timeout: Duration::from_millis(dispatch.max_timeout_ms.max(1)),
            max_attempts: queue.max_attempts.max(1),
        }
    }
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self::from_config(&DispatchConfig::default(), &QueueConfig::default())
    }
}

/// Chooses and arms the mechanism that will fire a reminder.
pub struct DispatchSelector {
    registry: Arc<JobRegistry>,
    queue: Arc<dyn DelayedQueue>,
    executor: Arc<DeliveryExecutor>,
    consumer: Arc<QueueConsumer>,
    settings: DispatchSettings,
}

impl DispatchSelector {
    pub fn new(
        registry: Arc<JobRegistry>,
        queue: Arc<dyn DelayedQueue>,
        executor: Arc<DeliveryExecutor>,
        consumer: Arc<QueueConsumer>,
        settings: DispatchSettings,
    ) -> Self {
        Self {
            registry,
            queue,
            executor,
            consumer,
            settings,
        }
    }

    pub fn settings(&self) -> DispatchSettings {
        self.settings
    }

    /// Arm whatever fits the reminder's recurrence. Safe to call repeatedly:
    /// a second call for the same id reports [`Armed::AlreadyArmed`].
    pub async fn schedule(&self, reminder: &Reminder) -> Result<Armed> {
        if reminder.recurrence.is_recurring() {
            self.schedule_recurring(reminder)
        } else {
            self.schedule_one_off(reminder).await
        }
    }

    /// One-off path: immediate send when due, else a timer or queue entry.
    pub async fn schedule_one_off(&self, reminder: &Reminder) -> Result<Armed> {
        let Recurrence::Once { send_at } = reminder.recurrence else {
            return Err(SchedulerError::Precondition(format!(
                "reminder {} is {}, not a one-off",
                reminder.id,
                reminder.pattern()
            )));
        };
        let payload = JobPayload::for_reminder(reminder);

        let Some(delay) = delay_until(send_at) else {
            info!(reminder_id = reminder.id.get(), %send_at, "reminder past due, delivering now");
            let outcome = match self.executor.deliver(&payload).await {
                Ok(outcome) => Some(outcome),
                Err(e) => {
                    warn!(reminder_id = reminder.id.get(), "immediate delivery failed: {e}");
                    None
                }
            };
            return Ok(Armed::Immediate { outcome });
        };

        if self.settings.one_off == OneOffMechanism::Timer && delay <= self.settings.max_timeout {
            return Ok(self.arm_timer(payload, delay));
        }

        let name = queue_job_name(reminder.id);
        let options = EnqueueOptions {
            delay,
            max_attempts: self.settings.max_attempts,
        };
        if self.queue.enqueue(&name, &payload, options).await? {
            info!(reminder_id = reminder.id.get(), job = %name, delay_ms = delay.as_millis() as u64, "reminder queued");
            Ok(Armed::Queued { name, delay })
        } else {
            debug!(job = %name, "queue job already present");
            Ok(Armed::AlreadyArmed { name })
        }
    }

    /// Recurring path: a cron task that lives until cancelled.
    pub fn schedule_recurring(&self, reminder: &Reminder) -> Result<Armed> {
        if !reminder.recurrence.is_recurring() {
            return Err(SchedulerError::Precondition(format!(
                "reminder {} is a one-off, not recurring",
                reminder.id
            )));
        }
        let expression = compile_recurrence(&reminder.recurrence);
        let schedule = expression.schedule()?;
        let name = cron_job_name(reminder.id);

        if self.arm_cron(reminder, schedule) {
            info!(reminder_id = reminder.id.get(), job = %name, cron = %expression, "recurring reminder armed");
            Ok(Armed::Cron { name, expression })
        } else {
            debug!(job = %name, "cron job already armed");
            Ok(Armed::AlreadyArmed { name })
        }
    }

    /// Cancel any live timer or cron task for `id`. Queue jobs are left to
    /// hit the consumer's not-found branch.
    pub fn disarm(&self, id: ReminderId) -> bool {
        let timer = self.registry.cancel(&timeout_job_name(id));
        let cron = self.registry.cancel(&cron_job_name(id));
        timer || cron
    }

    /// Register a cron task for `reminder` firing on `schedule`. Returns
    /// `false` when one is already live.
    fn arm_cron(&self, reminder: &Reminder, schedule: cron::Schedule) -> bool {
        let name = cron_job_name(reminder.id);
        let payload = JobPayload::for_reminder(reminder);
        let registry = Arc::clone(&self.registry);
        let consumer = Arc::clone(&self.consumer);
        let max_sleep = self.settings.max_timeout;
        let task_name = name.clone();
        self.registry.arm(&name, move |token| {
            spawn_cron(registry, consumer, task_name, token, schedule, payload, max_sleep)
        })
    }

    fn arm_timer(&self, payload: JobPayload, delay: Duration) -> Armed {
        let id = payload.reminder_id;
        let name = timeout_job_name(id);
        let registry = Arc::clone(&self.registry);
        let consumer = Arc::clone(&self.consumer);
        let task_name = name.clone();

        let armed = self.registry.arm(&name, move |token| {
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                // Deregister first: a one-off timer is spent whatever happens next.
                registry.release(&task_name, token);
                match consumer.on_message(&payload).await {
                    Ok(consumed) => debug!(job = %task_name, ?consumed, "timer fired"),
                    Err(e) => error!(job = %task_name, "timer delivery failed: {e}"),
                }
            })
            .abort_handle()
        });

        if armed {
            info!(reminder_id = id.get(), job = %name, delay_ms = delay.as_millis() as u64, "timer armed");
            Armed::Timer { name, delay }
        } else {
            debug!(job = %name, "timer already armed");
            Armed::AlreadyArmed { name }
        }
    }
}

/// Time left until `at`, or `None` when it has already passed.
fn delay_until(at: DateTime<Utc>) -> Option<Duration> {
    (at - Utc::now()).to_std().ok().filter(|d| !d.is_zero())
}

fn spawn_cron(
    registry: Arc<JobRegistry>,
    consumer: Arc<QueueConsumer>,
    name: String,
    token: JobToken,
    schedule: cron::Schedule,
    payload: JobPayload,
    max_sleep: Duration,
) -> AbortHandle {
    tokio::spawn(async move {
        let mut cursor = Local::now();
        loop {
            let Some(next) = schedule.after(&cursor).next() else {
                warn!(job = %name, "schedule has no further occurrences");
                registry.release(&name, token);
                return;
            };
            sleep_until(next, max_sleep).await;
            if !registry.is_current(&name, token) {
                return;
            }
            // Skip occurrences missed while asleep instead of bursting them.
            cursor = next.max(Local::now());

            // Each occurrence gets its own task so a slow send never delays
            // the next tick.
            let registry = Arc::clone(&registry);
            let consumer = Arc::clone(&consumer);
            let payload = payload.clone();
            let name = name.clone();
            tokio::spawn(async move {
                match consumer.on_message(&payload).await {
                    Ok(Consumed::Missing) => {
                        info!(job = %name, "reminder gone, retiring cron job");
                        registry.retire(&name, token);
                    }
                    Ok(consumed) => debug!(job = %name, ?consumed, "cron occurrence handled"),
                    Err(e) => error!(job = %name, "cron occurrence failed: {e}"),
                }
            });
        }
    })
    .abort_handle()
}

/// Sleep until the local instant `target`, in chunks of at most `max_sleep`.
async fn sleep_until(target: DateTime<Local>, max_sleep: Duration) {
    loop {
        let remaining = match (target - Local::now()).to_std() {
            Ok(d) if !d.is_zero() => d,
            _ => return,
        };
        tokio::time::sleep(remaining.min(max_sleep)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use rusqlite::Connection;
    use tickler_core::{ReminderStatus, ValidReminder, WallTime};
    use tickler_mailer::{MailTransport, SendReport};

    use crate::queue::SqliteQueue;
    use crate::store::{ReminderStore, SqliteReminderStore};

    #[derive(Default)]
    struct CountingTransport(AtomicUsize);

    impl CountingTransport {
        fn calls(&self) -> usize {
            self.0.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl MailTransport for CountingTransport {
        fn name(&self) -> &str {
            "counting"
        }

        async fn send(&self, to: &str, _subject: &str, _body: &str) -> tickler_mailer::Result<SendReport> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(SendReport::accepted(to, "<tick@relay>"))
        }
    }

    /// Poll `done` for up to three seconds.
    async fn wait_for(mut done: impl FnMut() -> bool) -> bool {
        for _ in 0..60 {
            if done() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        done()
    }

    #[tokio::test]
    async fn cron_tick_delivers_then_retires_when_the_reminder_is_gone() {
        let store = Arc::new(SqliteReminderStore::new(Connection::open_in_memory().unwrap()).unwrap());
        let queue = Arc::new(SqliteQueue::new(Connection::open_in_memory().unwrap()).unwrap());
        let transport = Arc::new(CountingTransport::default());
        let registry = Arc::new(JobRegistry::new());
        let executor = Arc::new(DeliveryExecutor::new(store.clone(), transport.clone()));
        let consumer = Arc::new(QueueConsumer::new(store.clone(), executor.clone()));
        let selector = DispatchSelector::new(
            registry.clone(),
            queue,
            executor,
            consumer,
            DispatchSettings::default(),
        );

        let reminder = store
            .create(ValidReminder {
                email: "daily@example.com".into(),
                message: None,
                subject: None,
                recurrence: Recurrence::Daily {
                    time: WallTime::new(9, 0).unwrap(),
                },
            })
            .await
            .unwrap();
        let name = cron_job_name(reminder.id);
        let every_second = cron::Schedule::from_str("* * * * * *").unwrap();
        assert!(selector.arm_cron(&reminder, every_second));

        assert!(wait_for(|| transport.calls() >= 1).await);
        assert_eq!(transport.calls(), 1);
        let stored = store.find_by_id(reminder.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ReminderStatus::Pending);
        assert!(registry.exists(&name));

        store.delete(reminder.id).await.unwrap();
        assert!(wait_for(|| !registry.exists(&name)).await);
        let sent = transport.calls();
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(transport.calls(), sent);
    }

    #[test]
    fn settings_clamp_degenerate_values() {
        let dispatch = DispatchConfig {
            one_off: OneOffMechanism::Timer,
            max_timeout_ms: 0,
        };
        let queue = QueueConfig {
            max_attempts: 0,
            ..QueueConfig::default()
        };
        let settings = DispatchSettings::from_config(&dispatch, &queue);
        assert_eq!(settings.max_timeout, Duration::from_millis(1));
        assert_eq!(settings.max_attempts, 1);
        assert_eq!(settings.one_off, OneOffMechanism::Timer);
    }

    #[test]
    fn delay_until_is_none_for_past_instants() {
        assert!(delay_until(Utc::now() - chrono::Duration::seconds(1)).is_none());
        let ahead = delay_until(Utc::now() + chrono::Duration::seconds(30)).unwrap();
        assert!(ahead > Duration::from_secs(29));
    }

    #[tokio::test]
    async fn sleep_until_returns_immediately_for_the_past() {
        let started = std::time::Instant::now();
        sleep_until(Local::now() - chrono::Duration::seconds(5), Duration::from_secs(1)).await;
        assert!(started.elapsed() < Duration::from_millis(100));
    }
}

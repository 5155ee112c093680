use std::sync::Arc;
use std::time::Duration;

use tickler_core::config::QueueConfig;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::consumer::QueueConsumer;
use crate::error::Result;
use crate::queue::{now_ms, SqliteQueue};

/// Polls the durable queue and feeds due jobs to the consumer.
pub struct QueueWorker {
    queue: Arc<SqliteQueue>,
    consumer: Arc<QueueConsumer>,
    poll_interval: Duration,
    lease: Duration,
    retry_delay: Duration,
}

impl QueueWorker {
    pub fn new(queue: Arc<SqliteQueue>, consumer: Arc<QueueConsumer>, config: &QueueConfig) -> Self {
        Self {
            queue,
            consumer,
            poll_interval: Duration::from_millis(config.poll_interval_ms.max(1)),
            lease: Duration::from_millis(config.lease_ms),
            retry_delay: Duration::from_millis(config.retry_delay_ms),
        }
    }

    /// Poll until `shutdown` broadcasts `true`.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(poll_ms = self.poll_interval.as_millis() as u64, "queue worker started");
        let mut interval = tokio::time::interval(self.poll_interval);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.tick().await {
                        error!("queue tick error: {e}");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("queue worker shutting down");
                        break;
                    }
                }
            }
        }
    }

    pub async fn tick(&self) -> Result<usize> {
        self.process_due(now_ms()).await
    }

    /// Claim and handle every job available at `now_ms`. Returns how many
    /// jobs were claimed.
    pub async fn process_due(&self, now_ms: i64) -> Result<usize> {
        let jobs = self.queue.claim_due(now_ms, self.lease)?;
        let claimed = jobs.len();

        for job in jobs {
            match self.consumer.on_message(&job.payload).await {
                Ok(consumed) => {
                    debug!(job = %job.name, attempt = job.attempts, ?consumed, "queue job done");
                    self.queue.ack(&job.name)?;
                }
                Err(e) if job.is_last_attempt() => {
                    error!(
                        job = %job.name,
                        attempts = job.attempts,
                        "queue job exhausted its attempts, dropping: {e}"
                    );
                    self.queue.ack(&job.name)?;
                }
                Err(e) => {
                    warn!(
                        job = %job.name,
                        attempt = job.attempts,
                        max_attempts = job.max_attempts,
                        "queue job failed, will retry: {e}"
                    );
                    let retry_at = now_ms.saturating_add(self.retry_delay.as_millis() as i64);
                    self.queue.retry(&job.name, retry_at, &e.to_string())?;
                }
            }
        }
        Ok(claimed)
    }
}

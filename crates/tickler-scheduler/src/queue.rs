use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension};
use tracing::{debug, error};

use crate::db::init_db;
use crate::error::Result;
use crate::types::JobPayload;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnqueueOptions {
    /// Earliest delivery is `now + delay`.
    pub delay: Duration,
    /// Delivery attempts before the job is dropped.
    pub max_attempts: u32,
}

/// Durable delayed queue with at-least-once delivery.
#[async_trait]
pub trait DelayedQueue: Send + Sync {
    /// Enqueue under `name`. Returns `false` when a job with that name is
    /// already queued; the existing job is kept as is.
    async fn enqueue(&self, name: &str, payload: &JobPayload, options: EnqueueOptions)
        -> Result<bool>;
}

/// A job claimed by a worker. `attempts` already counts this claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedJob {
    pub name: String,
    pub payload: JobPayload,
    pub attempts: u32,
    pub max_attempts: u32,
}

impl QueuedJob {
    pub fn is_last_attempt(&self) -> bool {
        self.attempts >= self.max_attempts
    }
}

/// [`DelayedQueue`] backed by the `queue_jobs` table.
///
/// Claiming pushes `available_at` forward by a lease, so a job whose worker
/// died reappears once the lease runs out.
pub struct SqliteQueue {
    conn: Mutex<Connection>,
}

pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

fn millis(d: Duration) -> i64 {
    i64::try_from(d.as_millis()).unwrap_or(i64::MAX)
}

impl SqliteQueue {
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Claim every job available at `now_ms`.
    pub fn claim_due(&self, now_ms: i64, lease: Duration) -> Result<Vec<QueuedJob>> {
        let conn = self.conn.lock().unwrap();

        // Collect before updating so the statement is finished first.
        let due: Vec<(String, String, u32, u32)> = {
            let mut stmt = conn.prepare_cached(
                "SELECT name, payload, attempts, max_attempts FROM queue_jobs
                 WHERE available_at <= ?1 ORDER BY available_at, name",
            )?;
            let rows = stmt
                .query_map([now_ms], |row| {
                    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
                })?
                .filter_map(|r| r.ok())
                .collect();
            rows
        };

        let mut claimed = Vec::with_capacity(due.len());
        for (name, payload_json, attempts, max_attempts) in due {
            let payload: JobPayload = match serde_json::from_str(&payload_json) {
                Ok(p) => p,
                Err(e) => {
                    error!(job = %name, "dropping queue job with bad payload: {e}");
                    conn.execute("DELETE FROM queue_jobs WHERE name = ?1", [&name])?;
                    continue;
                }
            };
            // Guarded on available_at so a concurrent claimer wins at most once.
            let n = conn.execute(
                "UPDATE queue_jobs SET available_at = ?1, attempts = attempts + 1
                 WHERE name = ?2 AND available_at <= ?3",
                rusqlite::params![now_ms.saturating_add(millis(lease)), name, now_ms],
            )?;
            if n == 1 {
                claimed.push(QueuedJob {
                    name,
                    payload,
                    attempts: attempts + 1,
                    max_attempts,
                });
            }
        }
        Ok(claimed)
    }

    /// Remove a finished (or dead) job.
    pub fn ack(&self, name: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM queue_jobs WHERE name = ?1", [name])?;
        Ok(())
    }

    /// Make a claimed job available again at `available_at_ms`.
    pub fn retry(&self, name: &str, available_at_ms: i64, last_error: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE queue_jobs SET available_at = ?1, last_error = ?2 WHERE name = ?3",
            rusqlite::params![available_at_ms, last_error, name],
        )?;
        Ok(())
    }

    pub fn contains(&self, name: &str) -> Result<bool> {
        Ok(self.available_at(name)?.is_some())
    }

    /// When the named job next becomes claimable, in unix ms.
    pub fn available_at(&self, name: &str) -> Result<Option<i64>> {
        let conn = self.conn.lock().unwrap();
        Ok(conn
            .query_row(
                "SELECT available_at FROM queue_jobs WHERE name = ?1",
                [name],
                |row| row.get(0),
            )
            .optional()?)
    }

    pub fn pending_count(&self) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM queue_jobs", [], |row| row.get(0))?;
        Ok(n as usize)
    }
}

#[async_trait]
impl DelayedQueue for SqliteQueue {
    async fn enqueue(
        &self,
        name: &str,
        payload: &JobPayload,
        options: EnqueueOptions,
    ) -> Result<bool> {
        let payload_json = serde_json::to_string(payload)?;
        let available_at = now_ms().saturating_add(millis(options.delay));
        let conn = self.conn.lock().unwrap();
        let n = conn.execute(
            "INSERT OR IGNORE INTO queue_jobs
             (name, payload, available_at, attempts, max_attempts, last_error, created_at)
             VALUES (?1, ?2, ?3, 0, ?4, NULL, ?5)",
            rusqlite::params![
                name,
                payload_json,
                available_at,
                options.max_attempts,
                Utc::now().to_rfc3339()
            ],
        )?;
        debug!(job = %name, delay_ms = millis(options.delay), inserted = (n == 1), "enqueue");
        Ok(n == 1)
    }
}

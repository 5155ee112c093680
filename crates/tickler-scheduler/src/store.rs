use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, Row};
use tickler_core::{
    Pattern, Recurrence, Reminder, ReminderFields, ReminderId, ReminderStatus, ValidReminder,
};
use tracing::{debug, info, warn};

use crate::db::init_db;
use crate::error::{Result, SchedulerError};

/// Persistence seam used by the engine.
#[async_trait]
pub trait ReminderStore: Send + Sync {
    async fn create(&self, reminder: ValidReminder) -> Result<Reminder>;

    /// Every `pending` row, each decoded on its own so one bad row never
    /// hides the rest.
    async fn scan_pending(&self) -> Result<Vec<Result<Reminder>>>;

    /// Every reminder whose status is `pending`. Rows that no longer decode
    /// are logged and skipped.
    async fn find_pending(&self) -> Result<Vec<Reminder>> {
        Ok(self
            .scan_pending()
            .await?
            .into_iter()
            .filter_map(|decoded| match decoded {
                Ok(reminder) => Some(reminder),
                Err(e) => {
                    warn!("skipping undecodable reminder: {e}");
                    None
                }
            })
            .collect())
    }

    /// Pending reminders that can still fire after `now`: all recurring ones
    /// plus one-off reminders dated in the future.
    async fn find_upcoming(&self, now: DateTime<Utc>) -> Result<Vec<Reminder>>;

    async fn find_by_id(&self, id: ReminderId) -> Result<Option<Reminder>>;

    /// Returns `false` and leaves the row alone when the reminder is already
    /// `completed`. Fails with `ReminderNotFound` when no row matches.
    async fn update_status(&self, id: ReminderId, status: ReminderStatus) -> Result<bool>;

    /// Fails with `ReminderNotFound` when no row matches.
    async fn delete(&self, id: ReminderId) -> Result<()>;
}

/// [`ReminderStore`] over a single SQLite connection.
pub struct SqliteReminderStore {
    conn: Mutex<Connection>,
}

const COLUMNS: &str = "id, email, message, subject, pattern, send_at, time, interval_minutes,
                       days_of_week, day_of_month, month, status, created_at";

/// Raw column values, before the recurrence is checked.
struct ReminderRow {
    id: i64,
    email: String,
    message: Option<String>,
    subject: Option<String>,
    pattern: String,
    send_at: Option<String>,
    time: Option<String>,
    interval: Option<i64>,
    days_of_week: Option<String>,
    day_of_month: Option<i64>,
    month: Option<i64>,
    status: String,
    created_at: String,
}

impl ReminderRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            email: row.get(1)?,
            message: row.get(2)?,
            subject: row.get(3)?,
            pattern: row.get(4)?,
            send_at: row.get(5)?,
            time: row.get(6)?,
            interval: row.get(7)?,
            days_of_week: row.get(8)?,
            day_of_month: row.get(9)?,
            month: row.get(10)?,
            status: row.get(11)?,
            created_at: row.get(12)?,
        })
    }

    fn decode(self) -> Result<Reminder> {
        let id = ReminderId(self.id);
        let bad = |what: String| SchedulerError::Precondition(format!("reminder {id}: {what}"));

        let pattern: Pattern = self.pattern.parse().map_err(|e| bad(format!("{e}")))?;
        let send_at = self
            .send_at
            .as_deref()
            .map(parse_instant)
            .transpose()
            .map_err(|e| bad(format!("bad send_at: {e}")))?;
        let days_of_week = self
            .days_of_week
            .as_deref()
            .map(serde_json::from_str::<Vec<i64>>)
            .transpose()
            .map_err(|e| bad(format!("bad days_of_week: {e}")))?;
        let fields = ReminderFields {
            send_at,
            time: self.time,
            interval: self.interval,
            days_of_week,
            day_of_month: self.day_of_month,
            month: self.month,
        };
        let recurrence = Recurrence::from_fields(pattern, &fields).map_err(|e| bad(e.to_string()))?;
        let status: ReminderStatus = self.status.parse().map_err(bad)?;
        let created_at =
            parse_instant(&self.created_at).map_err(|e| bad(format!("bad created_at: {e}")))?;

        Ok(Reminder {
            id,
            email: self.email,
            message: self.message,
            subject: self.subject,
            recurrence,
            status,
            created_at,
        })
    }
}

fn parse_instant(s: &str) -> std::result::Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(s).map(|dt| dt.with_timezone(&Utc))
}

fn format_instant(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

impl SqliteReminderStore {
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Run a listing query, decoding each row separately.
    fn query_reminders(&self, where_clause: &str, params: &[&dyn rusqlite::ToSql]) -> Result<Vec<Result<Reminder>>> {
        let conn = self.conn.lock().unwrap();
        let sql = format!("SELECT {COLUMNS} FROM reminders {where_clause} ORDER BY id");
        let mut stmt = conn.prepare_cached(&sql)?;
        let rows: Vec<ReminderRow> = stmt
            .query_map(params, ReminderRow::from_row)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows.into_iter().map(ReminderRow::decode).collect())
    }
}

#[async_trait]
impl ReminderStore for SqliteReminderStore {
    async fn create(&self, reminder: ValidReminder) -> Result<Reminder> {
        let now = Utc::now();
        let now_str = format_instant(now);
        let fields = reminder.recurrence.to_fields();
        // Recurring rows record their creation instant in send_at.
        let send_at = format_instant(fields.send_at.unwrap_or(now));
        let days_of_week = fields
            .days_of_week
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let pattern = reminder.recurrence.pattern();

        let id = {
            let conn = self.conn.lock().unwrap();
            conn.execute(
                "INSERT INTO reminders
                 (email, message, subject, pattern, send_at, time, interval_minutes,
                  days_of_week, day_of_month, month, status, created_at, updated_at)
                 VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,'pending',?11,?11)",
                rusqlite::params![
                    reminder.email,
                    reminder.message,
                    reminder.subject,
                    pattern.as_str(),
                    send_at,
                    fields.time,
                    fields.interval,
                    days_of_week,
                    fields.day_of_month,
                    fields.month,
                    now_str,
                ],
            )?;
            conn.last_insert_rowid()
        };

        info!(reminder_id = id, %pattern, "reminder created");

        Ok(Reminder {
            id: ReminderId(id),
            email: reminder.email,
            message: reminder.message,
            subject: reminder.subject,
            recurrence: reminder.recurrence,
            status: ReminderStatus::Pending,
            created_at: parse_instant(&now_str).unwrap_or(now),
        })
    }

    async fn scan_pending(&self) -> Result<Vec<Result<Reminder>>> {
        self.query_reminders("WHERE status = 'pending'", &[])
    }

    async fn find_upcoming(&self, now: DateTime<Utc>) -> Result<Vec<Reminder>> {
        Ok(self
            .find_pending()
            .await?
            .into_iter()
            .filter(|r| match r.recurrence {
                Recurrence::Once { send_at } => send_at > now,
                _ => true,
            })
            .collect())
    }

    async fn find_by_id(&self, id: ReminderId) -> Result<Option<Reminder>> {
        let row = {
            let conn = self.conn.lock().unwrap();
            let sql = format!("SELECT {COLUMNS} FROM reminders WHERE id = ?1");
            conn.query_row(&sql, [id.get()], ReminderRow::from_row)
                .optional()?
        };
        row.map(ReminderRow::decode).transpose()
    }

    async fn update_status(&self, id: ReminderId, status: ReminderStatus) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let n = conn.execute(
            "UPDATE reminders SET status = ?1, updated_at = ?2
             WHERE id = ?3 AND status != 'completed'",
            rusqlite::params![status.as_str(), format_instant(Utc::now()), id.get()],
        )?;
        if n == 0 {
            let exists = conn
                .query_row("SELECT 1 FROM reminders WHERE id = ?1", [id.get()], |_| Ok(()))
                .optional()?
                .is_some();
            if !exists {
                return Err(SchedulerError::ReminderNotFound { id });
            }
            debug!(reminder_id = id.get(), %status, "reminder already completed, status kept");
            return Ok(false);
        }
        info!(reminder_id = id.get(), %status, "reminder status updated");
        Ok(true)
    }

    async fn delete(&self, id: ReminderId) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let n = conn.execute("DELETE FROM reminders WHERE id = ?1", [id.get()])?;
        if n == 0 {
            return Err(SchedulerError::ReminderNotFound { id });
        }
        info!(reminder_id = id.get(), "reminder deleted");
        Ok(())
    }
}

use rusqlite::Connection;

use crate::error::Result;

/// Initialise the scheduler schema in `conn`.
///
/// Creates the `reminders` table and the `queue_jobs` table backing the
/// durable delayed queue (both idempotent). Safe to call on every startup and
/// from every connection that touches either table.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS reminders (
            id                INTEGER PRIMARY KEY AUTOINCREMENT,
            email             TEXT    NOT NULL,
            message           TEXT,
            subject           TEXT,
            pattern           TEXT    NOT NULL,
            send_at           TEXT,               -- RFC 3339; creation instant for recurring
            time              TEXT,               -- HH:mm local wall clock
            interval_minutes  INTEGER,
            days_of_week      TEXT,               -- JSON array, Sunday = 0
            day_of_month      INTEGER,
            month             INTEGER,
            status            TEXT    NOT NULL DEFAULT 'pending',
            created_at        TEXT    NOT NULL,
            updated_at        TEXT    NOT NULL
        ) STRICT;

        CREATE INDEX IF NOT EXISTS idx_reminders_status ON reminders (status);

        CREATE TABLE IF NOT EXISTS queue_jobs (
            name          TEXT    NOT NULL PRIMARY KEY,   -- reminder-queue-{id}
            payload       TEXT    NOT NULL,               -- JSON JobPayload
            available_at  INTEGER NOT NULL,               -- unix ms; pushed forward while leased
            attempts      INTEGER NOT NULL DEFAULT 0,
            max_attempts  INTEGER NOT NULL,
            last_error    TEXT,
            created_at    TEXT    NOT NULL
        ) STRICT;

        -- Efficient polling: SELECT … WHERE available_at <= ? ORDER BY available_at
        CREATE INDEX IF NOT EXISTS idx_queue_jobs_available_at ON queue_jobs (available_at);
        ",
    )?;
    Ok(())
}

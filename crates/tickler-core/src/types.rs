use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ValidationError;

/// Primary key of a persisted reminder (SQLite rowid).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReminderId(pub i64);

impl ReminderId {
    pub fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for ReminderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for ReminderId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Lifecycle state of a reminder.
///
/// `Completed` and `Failed` are terminal for one-off reminders. Recurring
/// reminders stay `Pending` for as long as they exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReminderStatus {
    #[default]
    Pending,
    Completed,
    Failed,
}

impl ReminderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReminderStatus::Pending => "pending",
            ReminderStatus::Completed => "completed",
            ReminderStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for ReminderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ReminderStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ReminderStatus::Pending),
            "completed" => Ok(ReminderStatus::Completed),
            "failed" => Ok(ReminderStatus::Failed),
            other => Err(format!("unknown reminder status: {other}")),
        }
    }
}

/// Recurrence kind, as stored in the `pattern` column and accepted over HTTP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pattern {
    Once,
    Daily,
    Weekly,
    Monthly,
    Yearly,
    Hourly,
    EveryNMinutes,
}

impl Pattern {
    pub fn as_str(&self) -> &'static str {
        match self {
            Pattern::Once => "once",
            Pattern::Daily => "daily",
            Pattern::Weekly => "weekly",
            Pattern::Monthly => "monthly",
            Pattern::Yearly => "yearly",
            Pattern::Hourly => "hourly",
            Pattern::EveryNMinutes => "every_n_minutes",
        }
    }

    pub fn is_recurring(&self) -> bool {
        !matches!(self, Pattern::Once)
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Pattern {
    type Err = ValidationError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "once" => Ok(Pattern::Once),
            "daily" => Ok(Pattern::Daily),
            "weekly" => Ok(Pattern::Weekly),
            "monthly" => Ok(Pattern::Monthly),
            "yearly" => Ok(Pattern::Yearly),
            "hourly" => Ok(Pattern::Hourly),
            "every_n_minutes" => Ok(Pattern::EveryNMinutes),
            _ => Err(ValidationError::pattern_undefined()),
        }
    }
}

/// Which delivery path an occurrence belongs to.
///
/// Only `OneOff` occurrences move a reminder into a terminal status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OccurrenceKind {
    #[serde(rename = "oneoff")]
    OneOff,
    #[serde(rename = "recurring")]
    Recurring,
}

impl OccurrenceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OccurrenceKind::OneOff => "oneoff",
            OccurrenceKind::Recurring => "recurring",
        }
    }
}

impl fmt::Display for OccurrenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Local wall-clock time of day, written `HH:mm`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WallTime {
    hour: u8,
    minute: u8,
}

impl WallTime {
    pub const MIDNIGHT: WallTime = WallTime { hour: 0, minute: 0 };

    pub fn new(hour: u8, minute: u8) -> Option<Self> {
        (hour < 24 && minute < 60).then_some(Self { hour, minute })
    }

    pub fn hour(&self) -> u8 {
        self.hour
    }

    pub fn minute(&self) -> u8 {
        self.minute
    }
}

impl fmt::Display for WallTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

impl std::str::FromStr for WallTime {
    type Err = ValidationError;

    /// Strict `HH:mm`: two digits each, 00:00 through 23:59.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let bad = || ValidationError::new("time must be in HH:mm (00:00-23:59) format.");
        let (h, m) = s.split_once(':').ok_or_else(bad)?;
        if h.len() != 2 || m.len() != 2 {
            return Err(bad());
        }
        if !h.bytes().chain(m.bytes()).all(|b| b.is_ascii_digit()) {
            return Err(bad());
        }
        let hour: u8 = h.parse().map_err(|_| bad())?;
        let minute: u8 = m.parse().map_err(|_| bad())?;
        WallTime::new(hour, minute).ok_or_else(bad)
    }
}

impl TryFrom<String> for WallTime {
    type Error = ValidationError;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<WallTime> for String {
    fn from(t: WallTime) -> Self {
        t.to_string()
    }
}

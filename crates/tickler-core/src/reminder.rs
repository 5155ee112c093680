//! Reminder entity and its recurrence, shared by the scheduler engine, the
//! SQLite store and the HTTP layer.
//!
//! Reminders arrive (and are stored) as a flat record of optional fields,
//! [`ReminderFields`]. That record is converted exactly once into a
//! [`Recurrence`], which carries only the values its pattern needs. The
//! scheduling engine never sees the flat form.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::types::{OccurrenceKind, Pattern, ReminderId, ReminderStatus, WallTime};

/// Body used when a reminder carries no message text.
pub const DEFAULT_MESSAGE: &str = "You have a reminder";

/// Longest `every_n_minutes` interval a minute-field step can express.
pub const MAX_INTERVAL_MINUTES: u32 = 59;

/// Pattern-specific fields in their flat, optional form.
///
/// Numeric fields are wide signed integers so out-of-range input produces a
/// validation message instead of a deserialization failure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReminderFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub send_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub days_of_week: Option<Vec<i64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day_of_month: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub month: Option<i64>,
}

/// When a reminder fires. One variant per [`Pattern`], holding exactly the
/// fields that pattern requires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "pattern", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum Recurrence {
    Once { send_at: DateTime<Utc> },
    Daily { time: WallTime },
    Hourly { time: WallTime },
    /// `days_of_week` is sorted and deduplicated, Sunday = 0.
    Weekly { time: WallTime, days_of_week: Vec<u8> },
    EveryNMinutes { interval: u32 },
    Monthly { time: WallTime, day_of_month: u8 },
    Yearly { time: WallTime, day_of_month: u8, month: u8 },
}

impl Recurrence {
    /// Build the typed recurrence for `pattern` from the flat field record.
    ///
    /// A required field that is absent fails with `"<field> is not defined"`.
    /// Two fallbacks exist: `every_n_minutes` reads its interval from the
    /// first two characters of `time` when `interval` is absent, and `yearly`
    /// defaults to midnight on the 1st.
    pub fn from_fields(pattern: Pattern, f: &ReminderFields) -> Result<Self, ValidationError> {
        match pattern {
            Pattern::Once => {
                let send_at = f.send_at.ok_or_else(|| ValidationError::missing("sendAt"))?;
                Ok(Recurrence::Once { send_at })
            }
            Pattern::Daily => Ok(Recurrence::Daily {
                time: required_time(f)?,
            }),
            Pattern::Hourly => Ok(Recurrence::Hourly {
                time: required_time(f)?,
            }),
            Pattern::Weekly => {
                let time = required_time(f)?;
                let raw = f
                    .days_of_week
                    .as_ref()
                    .ok_or_else(|| ValidationError::missing("daysOfWeek"))?;
                if raw.is_empty() {
                    return Err(ValidationError::new(
                        "daysOfWeek cannot be empty for weekly reminders.",
                    ));
                }
                let mut days = raw
                    .iter()
                    .map(|&d| {
                        u8::try_from(d).ok().filter(|d| *d <= 6).ok_or_else(|| {
                            ValidationError::new(
                                "Each dayOfWeek must be 0 (Sunday) through 6 (Saturday).",
                            )
                        })
                    })
                    .collect::<Result<Vec<u8>, _>>()?;
                days.sort_unstable();
                days.dedup();
                Ok(Recurrence::Weekly {
                    time,
                    days_of_week: days,
                })
            }
            Pattern::EveryNMinutes => {
                let interval = match f.interval {
                    Some(n) => n,
                    // Legacy rows: interval encoded as the leading digits of `time`.
                    None => f
                        .time
                        .as_deref()
                        .and_then(|t| t.get(..2))
                        .and_then(|prefix| prefix.parse::<i64>().ok())
                        .ok_or_else(|| ValidationError::missing("interval"))?,
                };
                // `*/N` only steps within the hour, so N must stay below 60.
                let interval = u32::try_from(interval)
                    .ok()
                    .filter(|n| (1..=MAX_INTERVAL_MINUTES).contains(n))
                    .ok_or_else(|| {
                        ValidationError::new(format!(
                            "interval must be between 1 and {MAX_INTERVAL_MINUTES}."
                        ))
                    })?;
                Ok(Recurrence::EveryNMinutes { interval })
            }
            Pattern::Monthly => {
                let time = required_time(f)?;
                let day = f
                    .day_of_month
                    .ok_or_else(|| ValidationError::missing("dayOfMonth"))?;
                Ok(Recurrence::Monthly {
                    time,
                    day_of_month: day_of_month(day)?,
                })
            }
            Pattern::Yearly => {
                let time = match f.time.as_deref() {
                    Some(t) => t.parse()?,
                    None => WallTime::MIDNIGHT,
                };
                let day = day_of_month(f.day_of_month.unwrap_or(1))?;
                let month = f.month.ok_or_else(|| ValidationError::missing("month"))?;
                let month = u8::try_from(month)
                    .ok()
                    .filter(|m| (1..=12).contains(m))
                    .ok_or_else(|| ValidationError::new("month must be between 1 and 12."))?;
                Ok(Recurrence::Yearly {
                    time,
                    day_of_month: day,
                    month,
                })
            }
        }
    }

    pub fn pattern(&self) -> Pattern {
        match self {
            Recurrence::Once { .. } => Pattern::Once,
            Recurrence::Daily { .. } => Pattern::Daily,
            Recurrence::Hourly { .. } => Pattern::Hourly,
            Recurrence::Weekly { .. } => Pattern::Weekly,
            Recurrence::EveryNMinutes { .. } => Pattern::EveryNMinutes,
            Recurrence::Monthly { .. } => Pattern::Monthly,
            Recurrence::Yearly { .. } => Pattern::Yearly,
        }
    }

    pub fn is_recurring(&self) -> bool {
        self.pattern().is_recurring()
    }

    pub fn occurrence_kind(&self) -> OccurrenceKind {
        if self.is_recurring() {
            OccurrenceKind::Recurring
        } else {
            OccurrenceKind::OneOff
        }
    }

    /// Flatten back into the storage form. `send_at` is left to the caller
    /// for recurring patterns (it records the creation instant there).
    pub fn to_fields(&self) -> ReminderFields {
        let mut f = ReminderFields::default();
        match self {
            Recurrence::Once { send_at } => f.send_at = Some(*send_at),
            Recurrence::Daily { time } | Recurrence::Hourly { time } => {
                f.time = Some(time.to_string());
            }
            Recurrence::Weekly { time, days_of_week } => {
                f.time = Some(time.to_string());
                f.days_of_week = Some(days_of_week.iter().map(|&d| d as i64).collect());
            }
            Recurrence::EveryNMinutes { interval } => f.interval = Some(*interval as i64),
            Recurrence::Monthly { time, day_of_month } => {
                f.time = Some(time.to_string());
                f.day_of_month = Some(*day_of_month as i64);
            }
            Recurrence::Yearly {
                time,
                day_of_month,
                month,
            } => {
                f.time = Some(time.to_string());
                f.day_of_month = Some(*day_of_month as i64);
                f.month = Some(*month as i64);
            }
        }
        f
    }
}

fn required_time(f: &ReminderFields) -> Result<WallTime, ValidationError> {
    f.time
        .as_deref()
        .ok_or_else(|| ValidationError::missing("time"))?
        .parse()
}

fn day_of_month(day: i64) -> Result<u8, ValidationError> {
    u8::try_from(day)
        .ok()
        .filter(|d| (1..=31).contains(d))
        .ok_or_else(|| ValidationError::new("dayOfMonth must be between 1 and 31."))
}

/// A persisted reminder.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Reminder {
    pub id: ReminderId,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(flatten)]
    pub recurrence: Recurrence,
    pub status: ReminderStatus,
    pub created_at: DateTime<Utc>,
}

impl Reminder {
    pub fn pattern(&self) -> Pattern {
        self.recurrence.pattern()
    }

    pub fn occurrence_kind(&self) -> OccurrenceKind {
        self.recurrence.occurrence_kind()
    }
}

/// Creation request as accepted by the API layer.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewReminder {
    pub email: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
    /// Optional when `sendAt` is given; the reminder is then one-off.
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(flatten)]
    pub fields: ReminderFields,
}

/// A creation request that passed [`NewReminder::validate`].
#[derive(Debug, Clone, PartialEq)]
pub struct ValidReminder {
    pub email: String,
    pub message: Option<String>,
    pub subject: Option<String>,
    pub recurrence: Recurrence,
}

impl NewReminder {
    /// Check the request against its pattern's requirements.
    ///
    /// On top of [`Recurrence::from_fields`] this rejects malformed email
    /// addresses, malformed `time` strings, and one-off reminders dated
    /// before `now`.
    pub fn validate(&self, now: DateTime<Utc>) -> Result<ValidReminder, ValidationError> {
        if !looks_like_email(&self.email) {
            return Err(ValidationError::new("Must provide a valid email address."));
        }

        let pattern = match self.pattern.as_deref() {
            Some(p) => p.parse::<Pattern>()?,
            None if self.fields.send_at.is_some() => Pattern::Once,
            None => return Err(ValidationError::pattern_undefined()),
        };

        if let Some(ref t) = self.fields.time {
            t.parse::<WallTime>()?;
        }

        let recurrence = Recurrence::from_fields(pattern, &self.fields)?;
        if let Recurrence::Once { send_at } = recurrence {
            if send_at < now {
                return Err(ValidationError::new(
                    "Date for sendAt can not be less than current date.",
                ));
            }
        }

        Ok(ValidReminder {
            email: self.email.trim().to_string(),
            message: self.message.clone(),
            subject: self.subject.clone(),
            recurrence,
        })
    }
}

fn looks_like_email(s: &str) -> bool {
    let s = s.trim();
    match s.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && !s.contains(char::is_whitespace)
                && domain
                    .split_once('.')
                    .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty())
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn fields() -> ReminderFields {
        ReminderFields::default()
    }

    #[test]
    fn weekly_days_are_sorted_and_deduplicated() {
        let f = ReminderFields {
            time: Some("09:00".into()),
            days_of_week: Some(vec![5, 1, 3, 1]),
            ..fields()
        };
        let r = Recurrence::from_fields(Pattern::Weekly, &f).unwrap();
        assert_eq!(
            r,
            Recurrence::Weekly {
                time: WallTime::new(9, 0).unwrap(),
                days_of_week: vec![1, 3, 5],
            }
        );
    }

    #[test]
    fn missing_required_fields_are_named() {
        let cases = [
            (Pattern::Once, "sendAt is not defined"),
            (Pattern::Daily, "time is not defined"),
            (Pattern::Hourly, "time is not defined"),
            (Pattern::Weekly, "time is not defined"),
            (Pattern::EveryNMinutes, "interval is not defined"),
            (Pattern::Monthly, "time is not defined"),
            (Pattern::Yearly, "month is not defined"),
        ];
        for (pattern, msg) in cases {
            let err = Recurrence::from_fields(pattern, &fields()).unwrap_err();
            assert_eq!(err.to_string(), msg, "pattern {pattern}");
        }

        let timed = ReminderFields {
            time: Some("08:15".into()),
            ..fields()
        };
        assert_eq!(
            Recurrence::from_fields(Pattern::Weekly, &timed).unwrap_err().to_string(),
            "daysOfWeek is not defined"
        );
        assert_eq!(
            Recurrence::from_fields(Pattern::Monthly, &timed).unwrap_err().to_string(),
            "dayOfMonth is not defined"
        );
    }

    #[test]
    fn every_n_minutes_falls_back_to_time_prefix() {
        let f = ReminderFields {
            time: Some("15:00".into()),
            ..fields()
        };
        assert_eq!(
            Recurrence::from_fields(Pattern::EveryNMinutes, &f).unwrap(),
            Recurrence::EveryNMinutes { interval: 15 }
        );

        let explicit = ReminderFields {
            interval: Some(10),
            time: Some("15:00".into()),
            ..fields()
        };
        assert_eq!(
            Recurrence::from_fields(Pattern::EveryNMinutes, &explicit).unwrap(),
            Recurrence::EveryNMinutes { interval: 10 }
        );

        let zero = ReminderFields {
            interval: Some(0),
            ..fields()
        };
        assert!(Recurrence::from_fields(Pattern::EveryNMinutes, &zero).is_err());
    }

    #[test]
    fn every_n_minutes_stays_within_the_hour() {
        let at = |interval| ReminderFields {
            interval: Some(interval),
            ..fields()
        };
        assert_eq!(
            Recurrence::from_fields(Pattern::EveryNMinutes, &at(59)).unwrap(),
            Recurrence::EveryNMinutes { interval: 59 }
        );
        for too_long in [60, 90, 1440] {
            let err = Recurrence::from_fields(Pattern::EveryNMinutes, &at(too_long)).unwrap_err();
            assert_eq!(err.to_string(), "interval must be between 1 and 59.");
        }
    }

    #[test]
    fn yearly_defaults_to_midnight_on_the_first() {
        let f = ReminderFields {
            month: Some(7),
            ..fields()
        };
        assert_eq!(
            Recurrence::from_fields(Pattern::Yearly, &f).unwrap(),
            Recurrence::Yearly {
                time: WallTime::MIDNIGHT,
                day_of_month: 1,
                month: 7,
            }
        );
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        let bad_day = ReminderFields {
            time: Some("10:00".into()),
            day_of_month: Some(32),
            ..fields()
        };
        assert!(Recurrence::from_fields(Pattern::Monthly, &bad_day).is_err());

        let bad_weekday = ReminderFields {
            time: Some("10:00".into()),
            days_of_week: Some(vec![7]),
            ..fields()
        };
        assert!(Recurrence::from_fields(Pattern::Weekly, &bad_weekday).is_err());

        let bad_month = ReminderFields {
            month: Some(13),
            ..fields()
        };
        assert!(Recurrence::from_fields(Pattern::Yearly, &bad_month).is_err());
    }

    #[test]
    fn fields_round_trip_through_storage_form() {
        let r = Recurrence::Yearly {
            time: WallTime::new(6, 30).unwrap(),
            day_of_month: 14,
            month: 2,
        };
        assert_eq!(Recurrence::from_fields(r.pattern(), &r.to_fields()).unwrap(), r);
    }

    #[test]
    fn validate_defaults_pattern_to_once_when_send_at_given() {
        let now = Utc::now();
        let input = NewReminder {
            email: "x@example.com".into(),
            fields: ReminderFields {
                send_at: Some(now + Duration::minutes(5)),
                ..fields()
            },
            ..Default::default()
        };
        let valid = input.validate(now).unwrap();
        assert_eq!(valid.recurrence.pattern(), Pattern::Once);
    }

    #[test]
    fn validate_rejects_bad_input() {
        let now = Utc::now();

        let no_pattern = NewReminder {
            email: "x@example.com".into(),
            ..Default::default()
        };
        assert_eq!(
            no_pattern.validate(now).unwrap_err().to_string(),
            "pattern must be defined"
        );

        let past = NewReminder {
            email: "x@example.com".into(),
            pattern: Some("once".into()),
            fields: ReminderFields {
                send_at: Some(now - Duration::minutes(1)),
                ..fields()
            },
            ..Default::default()
        };
        assert!(past.validate(now).is_err());

        let bad_email = NewReminder {
            email: "not-an-address".into(),
            pattern: Some("daily".into()),
            fields: ReminderFields {
                time: Some("10:00".into()),
                ..fields()
            },
            ..Default::default()
        };
        assert_eq!(
            bad_email.validate(now).unwrap_err().to_string(),
            "Must provide a valid email address."
        );

        let bad_time = NewReminder {
            email: "x@example.com".into(),
            pattern: Some("daily".into()),
            fields: ReminderFields {
                time: Some("25:00".into()),
                ..fields()
            },
            ..Default::default()
        };
        assert!(bad_time.validate(now).is_err());
    }

    #[test]
    fn reminder_serializes_flat_with_camel_case_fields() {
        let reminder = Reminder {
            id: ReminderId(4),
            email: "x@example.com".into(),
            message: None,
            subject: Some("standup".into()),
            recurrence: Recurrence::Weekly {
                time: WallTime::new(9, 0).unwrap(),
                days_of_week: vec![1, 3, 5],
            },
            status: ReminderStatus::Pending,
            created_at: Utc::now(),
        };
        let json = serde_json::to_value(&reminder).unwrap();
        assert_eq!(json["pattern"], "weekly");
        assert_eq!(json["time"], "09:00");
        assert_eq!(json["daysOfWeek"], serde_json::json!([1, 3, 5]));
        assert_eq!(json["status"], "pending");
        assert!(json.get("message").is_none());
    }
}

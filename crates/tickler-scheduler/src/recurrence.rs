use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Local, TimeZone, Timelike};
use serde::Serialize;
use tickler_core::{Pattern, Recurrence, ReminderFields, ValidationError};

use crate::error::{Result, SchedulerError};

const WEEKDAY_NAMES: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];

/// A compiled schedule in classic cron notation.
///
/// Recurring patterns compile to five fields
/// (`minute hour day-of-month month day-of-week`, Sunday = 0). The one-off
/// fallback form has six, with seconds first.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct CronExpression(String);

impl CronExpression {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn field_count(&self) -> usize {
        self.0.split_whitespace().count()
    }

    /// Evaluable schedule for this expression.
    ///
    /// The `cron` crate wants seconds first and numbers weekdays from 1, so
    /// a zero seconds field is prepended and numeric weekdays are rewritten
    /// as names.
    pub fn schedule(&self) -> Result<cron::Schedule> {
        let mut fields: Vec<String> = self.0.split_whitespace().map(String::from).collect();
        if fields.len() == 5 {
            fields.insert(0, "0".to_string());
        }
        if fields.len() != 6 {
            return Err(SchedulerError::InvalidSchedule(format!(
                "expected 5 or 6 fields in '{}'",
                self.0
            )));
        }
        fields[5] = weekday_names(&fields[5]);
        let normalized = fields.join(" ");
        cron::Schedule::from_str(&normalized)
            .map_err(|e| SchedulerError::InvalidSchedule(format!("{normalized}: {e}")))
    }

    /// First fire instant strictly after `after`, in `after`'s timezone.
    pub fn next_after<Tz: TimeZone>(&self, after: &DateTime<Tz>) -> Result<Option<DateTime<Tz>>> {
        Ok(self.schedule()?.after(after).next())
    }
}

impl fmt::Display for CronExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn weekday_names(field: &str) -> String {
    if field == "*" {
        return field.to_string();
    }
    field
        .split(',')
        .map(|part| match part.parse::<usize>() {
            Ok(n) if n < WEEKDAY_NAMES.len() => WEEKDAY_NAMES[n].to_string(),
            _ => part.to_string(),
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// Compile a typed recurrence. Infallible: every variant already carries the
/// fields its expression needs.
pub fn compile_recurrence(recurrence: &Recurrence) -> CronExpression {
    let expr = match recurrence {
        Recurrence::Once { send_at } => {
            // Fallback form only; one-off reminders are normally dispatched
            // by delay, not by calendar.
            let local = send_at.with_timezone(&Local);
            format!(
                "{} {} {} {} {} *",
                local.second(),
                local.minute(),
                local.hour(),
                local.day(),
                local.month()
            )
        }
        Recurrence::Daily { time } => format!("{} {} * * *", time.minute(), time.hour()),
        Recurrence::Hourly { time } => format!("{} */1 * * *", time.minute()),
        Recurrence::Weekly { time, days_of_week } => {
            let days = days_of_week
                .iter()
                .map(|d| d.to_string())
                .collect::<Vec<_>>()
                .join(",");
            format!("{} {} * * {}", time.minute(), time.hour(), days)
        }
        Recurrence::EveryNMinutes { interval } => format!("*/{interval} * * * *"),
        Recurrence::Monthly { time, day_of_month } => {
            format!("{} {} {} * *", time.minute(), time.hour(), day_of_month)
        }
        Recurrence::Yearly {
            time,
            day_of_month,
            month,
        } => format!(
            "{} {} {} {} *",
            time.minute(),
            time.hour(),
            day_of_month,
            month
        ),
    };
    CronExpression(expr)
}

/// Compile a pattern name plus flat fields into a cron expression.
///
/// Unknown pattern names fail with `"pattern must be defined"`; a missing
/// required field fails with `"<field> is not defined"`. Pure and
/// deterministic, so recovery can call it as often as it likes.
pub fn compile(
    pattern: &str,
    fields: &ReminderFields,
) -> std::result::Result<CronExpression, ValidationError> {
    let pattern = Pattern::from_str(pattern)?;
    let recurrence = Recurrence::from_fields(pattern, fields)?;
    Ok(compile_recurrence(&recurrence))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Utc, Weekday};

    fn timed(time: &str) -> ReminderFields {
        ReminderFields {
            time: Some(time.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn weekly_compiles_to_comma_list() {
        let fields = ReminderFields {
            days_of_week: Some(vec![1, 3, 5]),
            ..timed("09:00")
        };
        assert_eq!(compile("weekly", &fields).unwrap().as_str(), "0 9 * * 1,3,5");
    }

    #[test]
    fn recurring_patterns_compile_to_five_fields() {
        let cases = [
            ("daily", timed("12:30"), "30 12 * * *"),
            ("hourly", timed("00:45"), "45 */1 * * *"),
            (
                "every_n_minutes",
                ReminderFields {
                    interval: Some(10),
                    ..Default::default()
                },
                "*/10 * * * *",
            ),
            (
                "monthly",
                ReminderFields {
                    day_of_month: Some(15),
                    ..timed("08:05")
                },
                "5 8 15 * *",
            ),
            (
                "yearly",
                ReminderFields {
                    day_of_month: Some(25),
                    month: Some(12),
                    ..timed("07:00")
                },
                "0 7 25 12 *",
            ),
        ];
        for (pattern, fields, expected) in cases {
            let expr = compile(pattern, &fields).unwrap();
            assert_eq!(expr.as_str(), expected, "pattern {pattern}");
            assert_eq!(expr.field_count(), 5);
            expr.schedule().unwrap();
        }
    }

    #[test]
    fn yearly_without_time_or_day_fires_at_midnight_on_the_first() {
        let fields = ReminderFields {
            month: Some(3),
            ..Default::default()
        };
        assert_eq!(compile("yearly", &fields).unwrap().as_str(), "0 0 1 3 *");
    }

    #[test]
    fn every_n_minutes_uses_time_prefix_when_interval_missing() {
        assert_eq!(
            compile("every_n_minutes", &timed("20:00")).unwrap().as_str(),
            "*/20 * * * *"
        );
    }

    #[test]
    fn missing_fields_and_unknown_patterns_fail() {
        let empty = ReminderFields::default();
        assert_eq!(
            compile("daily", &empty).unwrap_err().to_string(),
            "time is not defined"
        );
        assert_eq!(
            compile("weekly", &timed("09:00")).unwrap_err().to_string(),
            "daysOfWeek is not defined"
        );
        assert_eq!(
            compile("sometimes", &timed("09:00")).unwrap_err().to_string(),
            "pattern must be defined"
        );
    }

    #[test]
    fn once_fallback_uses_local_calendar_fields() {
        let local = Local.with_ymd_and_hms(2030, 6, 9, 14, 7, 3).single().unwrap();
        let fields = ReminderFields {
            send_at: Some(local.with_timezone(&Utc)),
            ..Default::default()
        };
        let expr = compile("once", &fields).unwrap();
        assert_eq!(expr.as_str(), "3 7 14 9 6 *");
        assert_eq!(expr.field_count(), 6);
        expr.schedule().unwrap();
    }

    #[test]
    fn weekday_numbers_keep_sunday_as_zero() {
        let fields = ReminderFields {
            days_of_week: Some(vec![0]),
            ..timed("10:00")
        };
        let expr = compile("weekly", &fields).unwrap();
        let from = Local.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).single().unwrap();
        let next = expr.next_after(&from).unwrap().unwrap();
        assert_eq!(next.weekday(), Weekday::Sun);
        assert_eq!((next.hour(), next.minute()), (10, 0));
    }

    #[test]
    fn every_n_minutes_next_fire_is_on_the_interval() {
        let expr = compile(
            "every_n_minutes",
            &ReminderFields {
                interval: Some(15),
                ..Default::default()
            },
        )
        .unwrap();
        let from = Local.with_ymd_and_hms(2030, 1, 1, 10, 1, 0).single().unwrap();
        let next = expr.next_after(&from).unwrap().unwrap();
        assert_eq!((next.hour(), next.minute(), next.second()), (10, 15, 0));
    }

    #[test]
    fn every_n_minutes_past_the_hour_is_refused() {
        let fields = ReminderFields {
            interval: Some(90),
            ..Default::default()
        };
        assert_eq!(
            compile("every_n_minutes", &fields).unwrap_err().to_string(),
            "interval must be between 1 and 59."
        );
    }

    #[test]
    fn garbage_expression_is_an_invalid_schedule() {
        let expr = CronExpression("not a cron".to_string());
        assert!(matches!(expr.schedule(), Err(SchedulerError::InvalidSchedule(_))));
    }
}

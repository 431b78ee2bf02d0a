//! Recurrence rules and due-date computation.
//!
//! The engine is wall-clock based and pure: given a rule, the previous due
//! date and the completion timestamp, it computes the next due date (or
//! `None` for one-shot chores). Calendar arithmetic runs in the household's
//! configured time zone, which is threaded in explicitly -- there is no
//! global default zone.

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Unit for fixed-offset recurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntervalUnit {
    Hours,
    Days,
}

/// How a chore re-arms after completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecurrenceRule {
    /// One-shot chore: never re-arms.
    None,
    /// Due again one day after the previous due date.
    Daily,
    /// Several time-of-day slots per day; the next unconsumed slot today,
    /// else the first slot tomorrow.
    DailyMulti { times: Vec<NaiveTime> },
    /// Due again one week after the previous due date.
    Weekly,
    /// Due again one calendar month later, clamped to the last valid day.
    Monthly,
    /// Due again one calendar year later, clamped (Feb 29 -> Feb 28).
    Yearly,
    /// Fixed offset from the previous due date.
    Custom { every: u32, unit: IntervalUnit },
    /// Fixed offset from the actual completion timestamp. Diverges from
    /// `Custom` whenever a chore is completed late.
    CustomFromComplete { every: u32, unit: IntervalUnit },
}

impl RecurrenceRule {
    /// Reject malformed rules at chore-definition time, never at evaluation.
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            RecurrenceRule::DailyMulti { times } if times.is_empty() => Err(
                ValidationError::EmptyCollection("daily_multi time slots".into()),
            ),
            RecurrenceRule::Custom { every, .. }
            | RecurrenceRule::CustomFromComplete { every, .. }
                if *every == 0 =>
            {
                Err(ValidationError::InvalidValue {
                    field: "every".into(),
                    message: "custom recurrence interval must be at least 1".into(),
                })
            }
            _ => Ok(()),
        }
    }

    /// Whether the chore ever re-arms after completion.
    pub fn is_recurring(&self) -> bool {
        !matches!(self, RecurrenceRule::None)
    }
}

/// Computes next due dates in the household's time zone.
#[derive(Debug, Clone, Copy)]
pub struct RecurrenceEngine {
    tz: FixedOffset,
}

impl RecurrenceEngine {
    pub fn new(tz: FixedOffset) -> Self {
        Self { tz }
    }

    pub fn tz(&self) -> FixedOffset {
        self.tz
    }

    /// Next due date after a completion.
    ///
    /// `due_at` is the due date of the instance just completed; `completed_at`
    /// is when it was actually completed. Returns `None` for one-shot chores.
    pub fn next_due(
        &self,
        rule: &RecurrenceRule,
        due_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        match rule {
            RecurrenceRule::None => None,
            RecurrenceRule::Daily => Some(due_at + Duration::days(1)),
            RecurrenceRule::Weekly => Some(due_at + Duration::weeks(1)),
            RecurrenceRule::Monthly => self.add_months(due_at, 1),
            RecurrenceRule::Yearly => self.add_months(due_at, 12),
            RecurrenceRule::DailyMulti { times } => self.next_slot(times, completed_at),
            RecurrenceRule::Custom { every, unit } => Some(due_at + offset(*every, *unit)),
            RecurrenceRule::CustomFromComplete { every, unit } => {
                Some(completed_at + offset(*every, *unit))
            }
        }
    }

    /// Add calendar months in the local zone, clamping the day-of-month to
    /// the last valid day of the target month. Jan 31 + 1 month is Feb 28
    /// (or 29), never a rollover into March.
    fn add_months(&self, at: DateTime<Utc>, months: u32) -> Option<DateTime<Utc>> {
        let local = at.with_timezone(&self.tz);
        let total = local.year() * 12 + local.month0() as i32 + months as i32;
        let (year, month0) = (total.div_euclid(12), total.rem_euclid(12) as u32);
        let day = local.day().min(days_in_month(year, month0 + 1));
        let date = NaiveDate::from_ymd_opt(year, month0 + 1, day)?;
        self.to_utc(date.and_time(local.time()))
    }

    /// Next unconsumed daily-multi slot: the first slot strictly after the
    /// completion's local time today, else the earliest slot tomorrow.
    fn next_slot(&self, times: &[NaiveTime], completed_at: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let mut slots: Vec<NaiveTime> = times.to_vec();
        slots.sort();
        let local = completed_at.with_timezone(&self.tz);
        match slots.iter().find(|t| **t > local.time()) {
            Some(t) => self.to_utc(local.date_naive().and_time(*t)),
            None => {
                let tomorrow = local.date_naive().succ_opt()?;
                self.to_utc(tomorrow.and_time(*slots.first()?))
            }
        }
    }

    fn to_utc(&self, naive: chrono::NaiveDateTime) -> Option<DateTime<Utc>> {
        // Fixed offsets have no gaps or folds, so this is always single.
        self.tz
            .from_local_datetime(&naive)
            .single()
            .map(|dt| dt.with_timezone(&Utc))
    }
}

fn offset(every: u32, unit: IntervalUnit) -> Duration {
    match unit {
        IntervalUnit::Hours => Duration::hours(every as i64),
        IntervalUnit::Days => Duration::days(every as i64),
    }
}

fn days_in_month(year: i32, month: u32) -> u32 {
    let first = NaiveDate::from_ymd_opt(year, month, 1);
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    };
    match (first, next) {
        (Some(a), Some(b)) => (b - a).num_days() as u32,
        _ => 30,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;

    fn utc_engine() -> RecurrenceEngine {
        RecurrenceEngine::new(FixedOffset::east_opt(0).unwrap())
    }

    fn at(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    #[test]
    fn one_shot_never_rearms() {
        let e = utc_engine();
        let due = at("2024-03-01T09:00:00Z");
        assert_eq!(e.next_due(&RecurrenceRule::None, due, due), None);
    }

    #[test]
    fn daily_advances_from_due_date_not_completion() {
        let e = utc_engine();
        let due = at("2024-03-01T09:00:00Z");
        // Completed two days late; the next instance still counts from due.
        let done = at("2024-03-03T20:00:00Z");
        assert_eq!(
            e.next_due(&RecurrenceRule::Daily, due, done),
            Some(at("2024-03-02T09:00:00Z"))
        );
    }

    #[test]
    fn month_end_clamps_to_february() {
        let e = utc_engine();
        let due = at("2024-01-31T08:00:00Z");
        let next = e.next_due(&RecurrenceRule::Monthly, due, due).unwrap();
        // 2024 is a leap year.
        assert_eq!(next, at("2024-02-29T08:00:00Z"));

        let due = at("2023-01-31T08:00:00Z");
        let next = e.next_due(&RecurrenceRule::Monthly, due, due).unwrap();
        assert_eq!(next, at("2023-02-28T08:00:00Z"));
    }

    #[test]
    fn month_add_crosses_year_boundary() {
        let e = utc_engine();
        let due = at("2024-12-15T08:00:00Z");
        let next = e.next_due(&RecurrenceRule::Monthly, due, due).unwrap();
        assert_eq!(next, at("2025-01-15T08:00:00Z"));
    }

    #[test]
    fn yearly_clamps_leap_day() {
        let e = utc_engine();
        let due = at("2024-02-29T08:00:00Z");
        let next = e.next_due(&RecurrenceRule::Yearly, due, due).unwrap();
        assert_eq!(next, at("2025-02-28T08:00:00Z"));
    }

    #[test]
    fn custom_counts_from_due_and_from_complete_diverge_when_late() {
        let e = utc_engine();
        let due = at("2024-03-01T09:00:00Z");
        let done = at("2024-03-02T09:00:00Z"); // one day late
        let from_due = RecurrenceRule::Custom {
            every: 48,
            unit: IntervalUnit::Hours,
        };
        let from_done = RecurrenceRule::CustomFromComplete {
            every: 48,
            unit: IntervalUnit::Hours,
        };
        let a = e.next_due(&from_due, due, done).unwrap();
        let b = e.next_due(&from_done, due, done).unwrap();
        assert_eq!(a, at("2024-03-03T09:00:00Z"));
        assert_eq!(b, at("2024-03-04T09:00:00Z"));
        assert_ne!(a, b);
    }

    #[test]
    fn daily_multi_picks_next_slot_today() {
        let e = utc_engine();
        let times = vec![
            NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(13, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(19, 0, 0).unwrap(),
        ];
        let rule = RecurrenceRule::DailyMulti { times };
        let done = at("2024-03-01T09:30:00Z");
        let next = e.next_due(&rule, done, done).unwrap();
        assert_eq!(next, at("2024-03-01T13:00:00Z"));
    }

    #[test]
    fn daily_multi_rolls_to_first_slot_tomorrow() {
        let e = utc_engine();
        let times = vec![
            NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(13, 0, 0).unwrap(),
        ];
        let rule = RecurrenceRule::DailyMulti { times };
        let done = at("2024-03-01T20:00:00Z");
        let next = e.next_due(&rule, done, done).unwrap();
        assert_eq!(next, at("2024-03-02T08:00:00Z"));
    }

    #[test]
    fn daily_multi_respects_time_zone() {
        // UTC+9: a 23:30 UTC completion is already 08:30 the next local day.
        let e = RecurrenceEngine::new(FixedOffset::east_opt(9 * 3600).unwrap());
        let times = vec![
            NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(20, 0, 0).unwrap(),
        ];
        let rule = RecurrenceRule::DailyMulti { times };
        let done = at("2024-03-01T23:30:00Z");
        let next = e.next_due(&rule, done, done).unwrap();
        // Next local slot is 20:00 on Mar 2 local = 11:00 UTC.
        assert_eq!(next, at("2024-03-02T11:00:00Z"));
    }

    #[test]
    fn empty_slot_list_is_a_definition_error() {
        let rule = RecurrenceRule::DailyMulti { times: vec![] };
        assert!(rule.validate().is_err());
    }

    #[test]
    fn zero_interval_is_a_definition_error() {
        let rule = RecurrenceRule::Custom {
            every: 0,
            unit: IntervalUnit::Days,
        };
        assert!(rule.validate().is_err());
    }
}

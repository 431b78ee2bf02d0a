//! Rolling period statistics derived from the points ledger.
//!
//! Buckets are always recomputed by folding the ledger. Spent entries carry
//! negative deltas, so `net == earned + spent` holds for every bucket by
//! construction and stays true under any append sequence.

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::points::{PointSource, PointsLedger};

/// A named rolling time window.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Period {
    Today,
    Week,
    Month,
    Year,
    AllTime,
}

impl Period {
    pub const ALL: [Period; 5] = [
        Period::Today,
        Period::Week,
        Period::Month,
        Period::Year,
        Period::AllTime,
    ];
}

/// Aggregated point figures for one user and one period bucket.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodStats {
    /// Sum of positive deltas.
    pub earned: i64,
    /// Sum of negative deltas (itself negative).
    pub spent: i64,
    /// `earned + spent`.
    pub net: i64,
    /// Net delta per source.
    pub by_source: BTreeMap<PointSource, i64>,
    /// Entry count per source.
    pub count_by_source: BTreeMap<PointSource, u64>,
}

impl PeriodStats {
    fn add(&mut self, delta: i64, source: PointSource) {
        if delta >= 0 {
            self.earned += delta;
        } else {
            self.spent += delta;
        }
        self.net += delta;
        *self.by_source.entry(source).or_default() += delta;
        *self.count_by_source.entry(source).or_default() += 1;
    }
}

/// Start of a period bucket in UTC, computed from the local calendar.
/// `AllTime` has no start.
pub fn period_start(
    period: Period,
    now: DateTime<Utc>,
    tz: FixedOffset,
) -> Option<DateTime<Utc>> {
    let local = now.with_timezone(&tz);
    let today = local.date_naive();
    let date = match period {
        Period::Today => today,
        Period::Week => {
            // ISO week, Monday start.
            today - Duration::days(today.weekday().num_days_from_monday() as i64)
        }
        Period::Month => NaiveDate::from_ymd_opt(today.year(), today.month(), 1)?,
        Period::Year => NaiveDate::from_ymd_opt(today.year(), 1, 1)?,
        Period::AllTime => return None,
    };
    tz.from_local_datetime(&date.and_hms_opt(0, 0, 0)?)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Fold one user's ledger entries into every period bucket.
pub fn stats_for(
    ledger: &PointsLedger,
    user_id: &str,
    now: DateTime<Utc>,
    tz: FixedOffset,
) -> BTreeMap<Period, PeriodStats> {
    let starts: Vec<(Period, Option<DateTime<Utc>>)> = Period::ALL
        .iter()
        .map(|p| (*p, period_start(*p, now, tz)))
        .collect();

    let mut buckets: BTreeMap<Period, PeriodStats> = Period::ALL
        .iter()
        .map(|p| (*p, PeriodStats::default()))
        .collect();

    for entry in ledger.for_user(user_id) {
        for (period, start) in &starts {
            let in_bucket = match start {
                Some(start) => entry.at >= *start && entry.at <= now,
                None => true, // all_time
            };
            if in_bucket {
                if let Some(bucket) = buckets.get_mut(period) {
                    bucket.add(entry.delta, entry.source);
                }
            }
        }
    }
    buckets
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    fn at(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    #[test]
    fn buckets_window_correctly() {
        let mut ledger = PointsLedger::new();
        let now = at("2024-03-15T12:00:00Z"); // a Friday
        ledger.append("u1", 10, PointSource::Chore, at("2024-03-15T08:00:00Z")); // today
        ledger.append("u1", 20, PointSource::Chore, at("2024-03-12T08:00:00Z")); // this week
        ledger.append("u1", 30, PointSource::Chore, at("2024-03-02T08:00:00Z")); // this month
        ledger.append("u1", 40, PointSource::Chore, at("2024-01-10T08:00:00Z")); // this year
        ledger.append("u1", 50, PointSource::Chore, at("2023-06-01T08:00:00Z")); // all time

        let stats = stats_for(&ledger, "u1", now, utc());
        assert_eq!(stats[&Period::Today].earned, 10);
        assert_eq!(stats[&Period::Week].earned, 30);
        assert_eq!(stats[&Period::Month].earned, 60);
        assert_eq!(stats[&Period::Year].earned, 100);
        assert_eq!(stats[&Period::AllTime].earned, 150);
    }

    #[test]
    fn net_equals_earned_plus_spent() {
        let mut ledger = PointsLedger::new();
        let now = Utc::now();
        ledger.append("u1", 300, PointSource::Chore, now);
        ledger.append("u1", -120, PointSource::RewardRedemption, now);
        ledger.append("u1", -5, PointSource::Penalty, now);
        ledger.append("u1", 7, PointSource::ManualAdjustment, now);

        let stats = stats_for(&ledger, "u1", now, utc());
        for (_, bucket) in stats {
            assert_eq!(bucket.net, bucket.earned + bucket.spent);
        }
    }

    #[test]
    fn by_source_and_counts_track_each_append() {
        let mut ledger = PointsLedger::new();
        let now = Utc::now();
        ledger.append("u1", 10, PointSource::Chore, now);
        ledger.append("u1", 15, PointSource::Chore, now);
        ledger.append("u1", -4, PointSource::Penalty, now);

        let stats = stats_for(&ledger, "u1", now, utc());
        let all = &stats[&Period::AllTime];
        assert_eq!(all.by_source[&PointSource::Chore], 25);
        assert_eq!(all.by_source[&PointSource::Penalty], -4);
        assert_eq!(all.count_by_source[&PointSource::Chore], 2);
        assert_eq!(all.count_by_source[&PointSource::Penalty], 1);
    }

    #[test]
    fn week_starts_monday_local() {
        // Friday 2024-03-15 at UTC+9; Monday local midnight is
        // 2024-03-10T15:00:00Z.
        let tz = FixedOffset::east_opt(9 * 3600).unwrap();
        let now = at("2024-03-15T12:00:00Z");
        let start = period_start(Period::Week, now, tz).unwrap();
        assert_eq!(start, at("2024-03-10T15:00:00Z"));
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn source_strategy() -> impl Strategy<Value = PointSource> {
            prop_oneof![
                Just(PointSource::Chore),
                Just(PointSource::Bonus),
                Just(PointSource::Penalty),
                Just(PointSource::RewardRedemption),
                Just(PointSource::ManualAdjustment),
            ]
        }

        proptest! {
            #[test]
            fn invariants_hold_for_any_append_sequence(
                deltas in proptest::collection::vec(
                    (-500i64..500, source_strategy(), 0i64..365),
                    0..64,
                )
            ) {
                let now = at("2024-06-30T12:00:00Z");
                let mut ledger = PointsLedger::new();
                for (delta, source, days_ago) in deltas {
                    ledger.append("u1", delta, source, now - Duration::days(days_ago));
                }
                let stats = stats_for(&ledger, "u1", now, utc());
                for (_, bucket) in &stats {
                    prop_assert_eq!(bucket.net, bucket.earned + bucket.spent);
                    prop_assert!(bucket.earned >= 0);
                    prop_assert!(bucket.spent <= 0);
                    let by_source_total: i64 = bucket.by_source.values().sum();
                    prop_assert_eq!(by_source_total, bucket.net);
                }
                // all_time is the full-ledger fold, never a cached counter.
                let full: i64 = ledger.entries().iter().map(|e| e.delta).sum();
                prop_assert_eq!(stats[&Period::AllTime].net, full);
            }
        }
    }
}

//! Activity aggregation
//!
//! Distinct active users per day, per week and per calendar month, keyed by
//! bucket start, plus monthly revenue. Only observed buckets are emitted.

use crate::types::{ActiveUsersRow, ActivitySummary, RevenueTrendRow, UserRecord};
use chrono::{Datelike, Days, NaiveDate, Weekday};
use std::collections::{BTreeMap, BTreeSet};

/// Start of the week containing `date`
pub fn week_start(date: NaiveDate, first_day: Weekday) -> NaiveDate {
    let offset = (7 + date.weekday().num_days_from_monday() - first_day.num_days_from_monday()) % 7;
    date - Days::new(u64::from(offset))
}

/// First day of the month containing `date`
pub fn month_start(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

/// Aggregator for active-user and revenue time series
pub struct ActivityAggregator {
    week_start: Weekday,
}

impl Default for ActivityAggregator {
    fn default() -> Self {
        Self::new(Weekday::Mon)
    }
}

impl ActivityAggregator {
    pub fn new(week_start: Weekday) -> Self {
        Self { week_start }
    }

    pub fn aggregate(&self, records: &[UserRecord]) -> ActivitySummary {
        let daily = distinct_users_by(records, |r| r.last_active_date());
        let weekly = distinct_users_by(records, |r| {
            week_start(r.last_active_date(), self.week_start)
        });
        let monthly = distinct_users_by(records, |r| month_start(r.last_active_date()));
        let revenue_trend = revenue_by_month(records);

        log::info!(
            "activity: {} days, {} weeks, {} months observed",
            daily.len(),
            weekly.len(),
            monthly.len()
        );

        ActivitySummary {
            daily,
            weekly,
            monthly,
            revenue_trend,
        }
    }
}

/// Count distinct user ids per bucket, buckets ascending
fn distinct_users_by<F>(records: &[UserRecord], bucket: F) -> Vec<ActiveUsersRow>
where
    F: Fn(&UserRecord) -> NaiveDate,
{
    let mut buckets: BTreeMap<NaiveDate, BTreeSet<&str>> = BTreeMap::new();
    for record in records {
        buckets
            .entry(bucket(record))
            .or_default()
            .insert(record.user_id.as_str());
    }

    buckets
        .into_iter()
        .map(|(bucket_start, users)| ActiveUsersRow {
            bucket_start,
            active_users: users.len(),
        })
        .collect()
}

/// Sum revenue-bearing records by their last-activity month
fn revenue_by_month(records: &[UserRecord]) -> Vec<RevenueTrendRow> {
    let mut months: BTreeMap<NaiveDate, (f64, usize)> = BTreeMap::new();
    for record in records {
        let Some(revenue) = record.revenue else {
            continue;
        };
        let entry = months
            .entry(month_start(record.last_active_date()))
            .or_insert((0.0, 0));
        entry.0 += revenue;
        entry.1 += 1;
    }

    months
        .into_iter()
        .map(|(month, (revenue, revenue_records))| RevenueTrendRow {
            month,
            revenue,
            revenue_records,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Attributes;
    use chrono::NaiveTime;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn make_record(user: &str, last: NaiveDate, revenue: Option<f64>) -> UserRecord {
        let signup = date(2023, 12, 1).and_time(NaiveTime::MIN);
        let last_active_at = last.and_time(NaiveTime::MIN);
        UserRecord {
            row_index: 0,
            user_id: user.to_string(),
            signup_at: signup,
            last_active_at,
            revenue,
            lifespan_days: (last_active_at - signup).num_days(),
            attributes: Attributes::default(),
        }
    }

    #[test]
    fn test_week_start_monday() {
        // 2024-01-10 is a Wednesday
        assert_eq!(week_start(date(2024, 1, 10), Weekday::Mon), date(2024, 1, 8));
        assert_eq!(week_start(date(2024, 1, 8), Weekday::Mon), date(2024, 1, 8));
        assert_eq!(week_start(date(2024, 1, 7), Weekday::Mon), date(2024, 1, 1));
    }

    #[test]
    fn test_week_start_sunday() {
        assert_eq!(week_start(date(2024, 1, 10), Weekday::Sun), date(2024, 1, 7));
        assert_eq!(week_start(date(2024, 1, 7), Weekday::Sun), date(2024, 1, 7));
        assert_eq!(week_start(date(2024, 1, 6), Weekday::Sun), date(2023, 12, 31));
    }

    #[test]
    fn test_month_start() {
        assert_eq!(month_start(date(2024, 2, 29)), date(2024, 2, 1));
    }

    #[test]
    fn test_dau_counts_distinct_users() {
        let records = vec![
            make_record("a", date(2024, 1, 1), Some(1.0)),
            make_record("a", date(2024, 1, 1), Some(1.0)),
            make_record("b", date(2024, 1, 1), None),
            make_record("a", date(2024, 1, 3), None),
        ];
        let summary = ActivityAggregator::default().aggregate(&records);

        assert_eq!(
            summary.daily,
            vec![
                ActiveUsersRow {
                    bucket_start: date(2024, 1, 1),
                    active_users: 2,
                },
                ActiveUsersRow {
                    bucket_start: date(2024, 1, 3),
                    active_users: 1,
                },
            ]
        );
    }

    #[test]
    fn test_wau_deduplicates_within_week() {
        let records = vec![
            make_record("a", date(2024, 1, 8), None),
            make_record("a", date(2024, 1, 10), None),
            make_record("b", date(2024, 1, 14), None),
            make_record("b", date(2024, 1, 15), None),
        ];
        let summary = ActivityAggregator::default().aggregate(&records);

        assert_eq!(summary.weekly.len(), 2);
        assert_eq!(summary.weekly[0].bucket_start, date(2024, 1, 8));
        assert_eq!(summary.weekly[0].active_users, 2);
        assert_eq!(summary.weekly[1].bucket_start, date(2024, 1, 15));
        assert_eq!(summary.weekly[1].active_users, 1);

        let week_days: Vec<usize> = summary
            .daily
            .iter()
            .filter(|row| row.bucket_start < date(2024, 1, 15))
            .map(|row| row.active_users)
            .collect();
        let max_dau = week_days.iter().copied().max().unwrap();
        let sum_dau: usize = week_days.iter().sum();
        assert!(summary.weekly[0].active_users >= max_dau);
        assert!(summary.weekly[0].active_users <= sum_dau);
    }

    #[test]
    fn test_gaps_not_materialized() {
        let records = vec![
            make_record("a", date(2024, 1, 5), None),
            make_record("b", date(2024, 4, 5), None),
        ];
        let summary = ActivityAggregator::default().aggregate(&records);
        let months: Vec<NaiveDate> = summary.monthly.iter().map(|r| r.bucket_start).collect();
        assert_eq!(months, vec![date(2024, 1, 1), date(2024, 4, 1)]);
    }

    #[test]
    fn test_revenue_trend_skips_missing_revenue() {
        let records = vec![
            make_record("a", date(2024, 1, 5), Some(10.0)),
            make_record("b", date(2024, 1, 20), Some(5.5)),
            make_record("c", date(2024, 1, 21), None),
            make_record("d", date(2024, 2, 2), None),
        ];
        let summary = ActivityAggregator::default().aggregate(&records);

        assert_eq!(
            summary.revenue_trend,
            vec![RevenueTrendRow {
                month: date(2024, 1, 1),
                revenue: 15.5,
                revenue_records: 2,
            }]
        );
        // February still counts toward MAU
        assert_eq!(summary.monthly.len(), 2);
        assert_eq!(summary.monthly[0].active_users, 3);
    }
}

//! Churn-risk and loyalty banding
//!
//! Two independent banding schemes over `lifespan_days`:
//! - Churn bands cover early lifecycle only: `(-1, b0]`, `(b0, b1]`, ...
//!   Lifespans beyond the last edge are outside the table's domain.
//! - Loyalty bands cover everyone: `[0, b0)`, `[b0, b1)`, ..., `[bn, max + 1)`.

use crate::cohort::GroupAccumulator;
use crate::types::{ChurnBandRow, LoyaltyBandRow, UserRecord};
use std::collections::BTreeSet;

/// Lower bound of the first churn band, so that lifespan 0 falls inside it
const CHURN_FLOOR: i64 = -1;

/// Round to two decimal places
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn churn_label(index: usize, upper: i64) -> String {
    if index == 0 && upper == 0 {
        "Same-Day".to_string()
    } else {
        format!("≤{upper} Days")
    }
}

fn loyalty_label(lower: i64, upper: i64, last: bool) -> String {
    if last {
        format!("{lower}+ days")
    } else if lower == 0 {
        format!("<{upper} days")
    } else {
        format!("{lower}–{upper} days")
    }
}

/// Classifier for churn-risk and loyalty bands
pub struct BandClassifier {
    churn_bins: Vec<i64>,
    loyalty_bins: Vec<i64>,
}

impl BandClassifier {
    /// Edges must already be validated as strictly increasing
    pub fn new(churn_bins: Vec<i64>, loyalty_bins: Vec<i64>) -> Self {
        Self {
            churn_bins,
            loyalty_bins,
        }
    }

    /// Churn table; shares are against all cleaned users and revenue
    pub fn churn(&self, records: &[UserRecord]) -> Vec<ChurnBandRow> {
        let total_users = records
            .iter()
            .map(|r| r.user_id.as_str())
            .collect::<BTreeSet<_>>()
            .len();
        let total_revenue: f64 = records.iter().filter_map(|r| r.revenue).sum();

        let mut groups: Vec<GroupAccumulator> =
            self.churn_bins.iter().map(|_| GroupAccumulator::default()).collect();
        let mut out_of_domain = 0usize;

        for record in records {
            match self.churn_band(record.lifespan_days) {
                Some(idx) => groups[idx].add(record),
                None => out_of_domain += 1,
            }
        }

        log::info!(
            "churn: {} records banded, {} beyond {} days",
            records.len() - out_of_domain,
            out_of_domain,
            self.churn_bins.last().copied().unwrap_or_default()
        );

        groups
            .iter()
            .enumerate()
            .map(|(idx, group)| {
                let summary = group.summary();
                let upper = self.churn_bins[idx];
                let lower = if idx == 0 { CHURN_FLOOR } else { self.churn_bins[idx - 1] };

                let user_pct = if total_users > 0 {
                    round2(summary.user_count as f64 / total_users as f64 * 100.0)
                } else {
                    0.0
                };
                let revenue_pct = (total_revenue > 0.0)
                    .then(|| round2(summary.total_revenue / total_revenue * 100.0));

                ChurnBandRow {
                    label: churn_label(idx, upper),
                    lower_exclusive: lower,
                    upper_inclusive: upper,
                    summary,
                    user_pct,
                    revenue_pct,
                }
            })
            .collect()
    }

    /// Loyalty table; every record lands in exactly one band
    pub fn loyalty(&self, records: &[UserRecord]) -> Vec<LoyaltyBandRow> {
        let max_lifespan = records.iter().map(|r| r.lifespan_days).max().unwrap_or(0);
        let edges = self.loyalty_edges(max_lifespan);

        let mut groups: Vec<GroupAccumulator> =
            (1..edges.len()).map(|_| GroupAccumulator::default()).collect();
        for record in records {
            groups[loyalty_band(&edges, record.lifespan_days)].add(record);
        }

        let last = groups.len() - 1;
        groups
            .iter()
            .enumerate()
            .map(|(idx, group)| LoyaltyBandRow {
                label: loyalty_label(edges[idx], edges[idx + 1], idx == last),
                lower_bound: edges[idx],
                upper_bound: edges[idx + 1],
                summary: group.summary(),
            })
            .collect()
    }

    /// Index of the churn band holding `lifespan`, if any
    pub fn churn_band(&self, lifespan: i64) -> Option<usize> {
        let idx = self.churn_bins.iter().position(|&upper| lifespan <= upper)?;
        let lower = if idx == 0 { CHURN_FLOOR } else { self.churn_bins[idx - 1] };
        (lifespan > lower).then_some(idx)
    }

    /// `[0, b0, ..., bn, upper]` with `upper` past both the data and `bn`
    fn loyalty_edges(&self, max_lifespan: i64) -> Vec<i64> {
        let last_edge = self.loyalty_bins.last().copied().unwrap_or(0);
        let upper = (max_lifespan + 1).max(last_edge + 1);

        let mut edges = Vec::with_capacity(self.loyalty_bins.len() + 2);
        edges.push(0);
        edges.extend_from_slice(&self.loyalty_bins);
        edges.push(upper);
        edges
    }
}

/// Index of the loyalty band holding `lifespan` (left-inclusive edges)
fn loyalty_band(edges: &[i64], lifespan: i64) -> usize {
    let bands = edges.len() - 1;
    edges[1..bands]
        .iter()
        .take_while(|&&edge| lifespan >= edge)
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DEFAULT_CHURN_BINS, DEFAULT_LOYALTY_BINS};
    use crate::types::Attributes;
    use chrono::{Days, NaiveDate, NaiveTime};

    fn classifier() -> BandClassifier {
        BandClassifier::new(DEFAULT_CHURN_BINS.to_vec(), DEFAULT_LOYALTY_BINS.to_vec())
    }

    fn make_record(user: &str, lifespan: i64, revenue: Option<f64>) -> UserRecord {
        let signup_at = NaiveDate::from_ymd_opt(2022, 1, 1)
            .unwrap()
            .and_time(NaiveTime::MIN);
        UserRecord {
            row_index: 0,
            user_id: user.to_string(),
            signup_at,
            last_active_at: signup_at + Days::new(lifespan as u64),
            revenue,
            lifespan_days: lifespan,
            attributes: Attributes::default(),
        }
    }

    #[test]
    fn test_churn_band_edges() {
        let c = classifier();
        assert_eq!(c.churn_band(0), Some(0));
        assert_eq!(c.churn_band(1), Some(1));
        assert_eq!(c.churn_band(7), Some(1));
        assert_eq!(c.churn_band(8), Some(2));
        assert_eq!(c.churn_band(30), Some(2));
        assert_eq!(c.churn_band(31), None);
    }

    #[test]
    fn test_churn_labels() {
        let rows = classifier().churn(&[]);
        let labels: Vec<&str> = rows.iter().map(|r| r.label.as_str()).collect();
        assert_eq!(labels, vec!["Same-Day", "≤7 Days", "≤30 Days"]);
        assert!(rows.iter().all(|r| r.user_pct == 0.0 && r.revenue_pct.is_none()));
    }

    #[test]
    fn test_churn_shares_use_global_totals() {
        let records = vec![
            make_record("A", 0, Some(10.0)),
            make_record("B", 9, Some(50.0)),
            make_record("Z", 400, Some(40.0)),
        ];
        let rows = classifier().churn(&records);

        assert_eq!(rows[0].summary.user_count, 1);
        assert_eq!(rows[0].user_pct, 33.33);
        assert_eq!(rows[0].revenue_pct, Some(10.0));
        assert_eq!(rows[1].summary.record_count, 0);
        assert_eq!(rows[1].summary.mean_revenue, None);
        assert_eq!(rows[2].revenue_pct, Some(50.0));

        let revenue_share: f64 = rows.iter().filter_map(|r| r.revenue_pct).sum();
        assert!(revenue_share < 100.0);
        for row in &rows {
            assert!((0.0..=100.0).contains(&row.user_pct));
        }
    }

    #[test]
    fn test_loyalty_partitions_population() {
        let records: Vec<UserRecord> = [0, 50, 99, 100, 299, 300, 499, 500, 900]
            .iter()
            .enumerate()
            .map(|(i, &days)| make_record(&format!("u{i}"), days, Some(1.0)))
            .collect();
        let rows = classifier().loyalty(&records);

        let labels: Vec<&str> = rows.iter().map(|r| r.label.as_str()).collect();
        assert_eq!(labels, vec!["<100 days", "100–300 days", "300–500 days", "500+ days"]);
        let counts: Vec<usize> = rows.iter().map(|r| r.summary.record_count).collect();
        assert_eq!(counts, vec![3, 2, 2, 2]);
        assert_eq!(counts.iter().sum::<usize>(), records.len());
        assert_eq!(rows[3].upper_bound, 901);
    }

    #[test]
    fn test_loyalty_upper_bound_when_data_is_short() {
        let records = vec![make_record("a", 12, Some(3.0))];
        let rows = classifier().loyalty(&records);

        assert_eq!(rows.len(), 4);
        assert_eq!(rows[3].lower_bound, 500);
        assert_eq!(rows[3].upper_bound, 501);
        assert_eq!(rows[0].summary.total_revenue, 3.0);
        assert_eq!(rows[3].summary.mean_revenue, None);
    }

    #[test]
    fn test_round2() {
        assert_eq!(round2(16.666_666), 16.67);
        assert_eq!(round2(100.0), 100.0);
    }
}

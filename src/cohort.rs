//! Cohort and segment aggregation
//!
//! Groups cleaned records by signup month and, independently, by each optional
//! categorical dimension present in the input.

use crate::activity::month_start;
use crate::types::{CohortRow, Dimension, GroupSummary, SegmentRow, SegmentTable, UserRecord};
use std::collections::{BTreeMap, BTreeSet};

/// Running totals for one group of records
#[derive(Debug, Default)]
pub(crate) struct GroupAccumulator<'a> {
    users: BTreeSet<&'a str>,
    record_count: usize,
    revenue_records: usize,
    total_revenue: f64,
}

impl<'a> GroupAccumulator<'a> {
    pub(crate) fn add(&mut self, record: &'a UserRecord) {
        self.users.insert(record.user_id.as_str());
        self.record_count += 1;
        if let Some(revenue) = record.revenue {
            self.revenue_records += 1;
            self.total_revenue += revenue;
        }
    }

    pub(crate) fn summary(&self) -> GroupSummary {
        let mean_revenue = if self.revenue_records > 0 {
            Some(self.total_revenue / self.revenue_records as f64)
        } else {
            None
        };
        GroupSummary {
            user_count: self.users.len(),
            record_count: self.record_count,
            revenue_records: self.revenue_records,
            total_revenue: self.total_revenue,
            mean_revenue,
        }
    }
}

/// Aggregator for signup cohorts and categorical segments
pub struct CohortAggregator;

impl CohortAggregator {
    /// One row per observed signup month, ascending
    pub fn cohorts(records: &[UserRecord]) -> Vec<CohortRow> {
        let mut groups: BTreeMap<_, GroupAccumulator> = BTreeMap::new();
        for record in records {
            groups
                .entry(month_start(record.signup_date()))
                .or_default()
                .add(record);
        }

        groups
            .into_iter()
            .map(|(signup_month, group)| CohortRow {
                signup_month,
                summary: group.summary(),
            })
            .collect()
    }

    /// Revenue breakdown over a single dimension
    pub fn segment(records: &[UserRecord], dimension: Dimension) -> SegmentTable {
        let mut groups: BTreeMap<&str, GroupAccumulator> = BTreeMap::new();
        let mut unlabeled_records = 0;

        for record in records {
            match record.attributes.get(dimension) {
                Some(value) => groups.entry(value).or_default().add(record),
                None => unlabeled_records += 1,
            }
        }

        SegmentTable {
            dimension,
            unlabeled_records,
            rows: groups
                .into_iter()
                .map(|(value, group)| SegmentRow {
                    value: value.to_string(),
                    summary: group.summary(),
                })
                .collect(),
        }
    }

    /// Segment tables for every dimension present in the input
    pub fn segments(records: &[UserRecord], dimensions: &[Dimension]) -> Vec<SegmentTable> {
        dimensions
            .iter()
            .map(|&dimension| {
                let table = Self::segment(records, dimension);
                log::info!(
                    "segments: {} has {} values ({} unlabeled)",
                    dimension.key(),
                    table.rows.len(),
                    table.unlabeled_records
                );
                table
            })
            .collect()
    }
}

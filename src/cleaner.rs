//! Record validation and cleaning
//!
//! Turns canonical rows into [`UserRecord`]s:
//! - Blank and undecodable rows are dropped
//! - Both timestamps must parse; rows missing either are dropped
//! - Rows whose last activity precedes signup are dropped
//! - Bad revenue only removes the record from revenue aggregates
//!
//! Nothing here returns an error. Every exclusion is counted in
//! [`CleaningDiagnostics`].

use crate::error::RecordIssue;
use crate::types::{
    Attributes, CanonicalRow, CanonicalTable, CleanedRecords, CleaningDiagnostics, IssueSample,
    UserRecord,
};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};

/// Number of issues kept verbatim in the diagnostics
pub const MAX_ISSUE_SAMPLES: usize = 20;

const DATETIME_FORMATS: [&str; 9] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%d-%b-%Y %H:%M:%S",
];

const DATE_FORMATS: [&str; 8] = [
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%d-%b-%Y",
    "%d %b %Y",
    "%d %B %Y",
    "%b %d, %Y",
    "%B %d, %Y",
];

/// Parse a timestamp in any of the supported layouts
///
/// Offsets are converted to UTC and dropped. Slash dates read month first.
pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.naive_utc());
    }
    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
            return Some(dt);
        }
    }
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(value, format) {
            return Some(date.and_time(NaiveTime::MIN));
        }
    }
    None
}

/// Parse a revenue cell into a non-negative amount
pub fn parse_revenue(value: &str) -> Result<f64, RecordIssue> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(RecordIssue::MissingRevenue);
    }

    let (negative, unsigned) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest.trim_start()),
        None => (false, trimmed),
    };
    let digits: String = unsigned
        .trim_start_matches('$')
        .chars()
        .filter(|c| *c != ',')
        .collect();

    let amount = match digits.parse::<f64>() {
        Ok(v) if v.is_finite() => {
            if negative {
                -v
            } else {
                v
            }
        }
        _ => {
            return Err(RecordIssue::UnparseableRevenue {
                value: trimmed.to_string(),
            })
        }
    };

    if amount < 0.0 {
        return Err(RecordIssue::NegativeRevenue { value: amount });
    }
    Ok(amount)
}

/// Cleaner for converting canonical rows into validated records
pub struct RecordCleaner;

impl RecordCleaner {
    /// Validate every row, keeping the ones that satisfy the record invariants
    pub fn clean(table: &CanonicalTable) -> CleanedRecords {
        let mut diagnostics = CleaningDiagnostics {
            input_rows: table.rows.len() + table.unreadable_rows.len(),
            ..Default::default()
        };
        let mut records = Vec::with_capacity(table.rows.len());

        for &row_index in &table.unreadable_rows {
            note_issue(&mut diagnostics, row_index, RecordIssue::InvalidEncoding);
        }

        for row in &table.rows {
            match clean_row(row) {
                Ok((record, revenue_issue)) => {
                    if let Some(issue) = revenue_issue {
                        note_issue(&mut diagnostics, row.row_index, issue);
                    }
                    records.push(record);
                }
                Err(issue) => note_issue(&mut diagnostics, row.row_index, issue),
            }
        }

        diagnostics.retained_records = records.len();
        log::info!(
            "cleaner: kept {} of {} rows ({} excluded, {} without usable revenue)",
            diagnostics.retained_records,
            diagnostics.input_rows,
            diagnostics.excluded_records(),
            diagnostics.revenue_excluded()
        );

        CleanedRecords {
            records,
            dimensions: table.dimensions.clone(),
            diagnostics,
        }
    }
}

/// Build one record; the second value reports a revenue-only exclusion
fn clean_row(row: &CanonicalRow) -> Result<(UserRecord, Option<RecordIssue>), RecordIssue> {
    if is_blank(row) {
        return Err(RecordIssue::BlankRow);
    }
    if row.user_id.is_empty() {
        return Err(RecordIssue::MissingUserId);
    }

    let signup_at = timestamp_field("Sign_Up", &row.sign_up)?;
    let last_active_at = timestamp_field("Last_Login", &row.last_login)?;

    if last_active_at < signup_at {
        return Err(RecordIssue::NegativeLifespan {
            signup: row.sign_up.clone(),
            last_active: row.last_login.clone(),
        });
    }
    let lifespan_days = (last_active_at - signup_at).num_days();

    let (revenue, revenue_issue) = match parse_revenue(&row.revenue) {
        Ok(amount) => (Some(amount), None),
        Err(issue) => (None, Some(issue)),
    };

    let record = UserRecord {
        row_index: row.row_index,
        user_id: row.user_id.clone(),
        signup_at,
        last_active_at,
        revenue,
        lifespan_days,
        attributes: row.attributes.clone(),
    };
    Ok((record, revenue_issue))
}

fn is_blank(row: &CanonicalRow) -> bool {
    [&row.user_id, &row.sign_up, &row.last_login, &row.revenue]
        .iter()
        .all(|value| value.is_empty())
        && row.attributes == Attributes::default()
}

fn timestamp_field(field: &str, value: &str) -> Result<NaiveDateTime, RecordIssue> {
    if value.trim().is_empty() {
        return Err(RecordIssue::MissingTimestamp {
            field: field.to_string(),
        });
    }
    parse_timestamp(value).ok_or_else(|| RecordIssue::UnparseableTimestamp {
        field: field.to_string(),
        value: value.to_string(),
    })
}

fn note_issue(diagnostics: &mut CleaningDiagnostics, row_index: usize, issue: RecordIssue) {
    match &issue {
        RecordIssue::BlankRow => diagnostics.blank_rows += 1,
        RecordIssue::InvalidEncoding => diagnostics.invalid_encoding += 1,
        RecordIssue::MissingUserId => diagnostics.missing_user_id += 1,
        RecordIssue::MissingTimestamp { .. } => diagnostics.missing_timestamp += 1,
        RecordIssue::UnparseableTimestamp { .. } => diagnostics.unparseable_timestamp += 1,
        RecordIssue::NegativeLifespan { .. } => diagnostics.negative_lifespan += 1,
        RecordIssue::MissingRevenue => diagnostics.missing_revenue += 1,
        RecordIssue::UnparseableRevenue { .. } => diagnostics.unparseable_revenue += 1,
        RecordIssue::NegativeRevenue { .. } => diagnostics.negative_revenue += 1,
    }

    let effect = if issue.excludes_record() {
        "dropped"
    } else {
        "revenue excluded"
    };
    log::debug!("row {row_index}: {issue} ({effect})");

    if diagnostics.samples.len() < MAX_ISSUE_SAMPLES {
        diagnostics.samples.push(IssueSample {
            row_index,
            message: issue.to_string(),
            issue,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    fn row(idx: usize, user: &str, signup: &str, last: &str, revenue: &str) -> CanonicalRow {
        CanonicalRow {
            row_index: idx,
            user_id: user.to_string(),
            last_login: last.to_string(),
            sign_up: signup.to_string(),
            revenue: revenue.to_string(),
            attributes: Attributes::default(),
        }
    }

    fn table(rows: Vec<CanonicalRow>) -> CanonicalTable {
        CanonicalTable {
            rows,
            dimensions: vec![],
            unreadable_rows: vec![],
        }
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let jan5 = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();
        for value in [
            "2024-01-05",
            "2024/01/05",
            "01/05/2024",
            "05-Jan-2024",
            "5 January 2024",
            "Jan 05, 2024",
            "2024-01-05 13:45:00",
            "2024-01-05T13:45:00.250",
            "2024-01-05T13:45:00Z",
        ] {
            let parsed = parse_timestamp(value).unwrap_or_else(|| panic!("failed on {value}"));
            assert_eq!(parsed.date(), jan5, "value {value}");
        }
    }

    #[test]
    fn test_parse_timestamp_offset_converted_to_utc() {
        let parsed = parse_timestamp("2024-01-05T23:30:00-02:00").unwrap();
        assert_eq!(parsed.date(), NaiveDate::from_ymd_opt(2024, 1, 6).unwrap());
        assert_eq!(parsed.hour(), 1);
    }

    #[test]
    fn test_parse_timestamp_rejects_garbage() {
        assert!(parse_timestamp("").is_none());
        assert!(parse_timestamp("yesterday").is_none());
        assert!(parse_timestamp("2024-13-45").is_none());
    }

    #[test]
    fn test_parse_revenue() {
        assert_eq!(parse_revenue("12.5"), Ok(12.5));
        assert_eq!(parse_revenue("$1,250.00"), Ok(1250.0));
        assert_eq!(parse_revenue("0"), Ok(0.0));
        assert_eq!(parse_revenue(""), Err(RecordIssue::MissingRevenue));
        assert_eq!(
            parse_revenue("-$3"),
            Err(RecordIssue::NegativeRevenue { value: -3.0 })
        );
        assert!(matches!(
            parse_revenue("free"),
            Err(RecordIssue::UnparseableRevenue { .. })
        ));
        assert!(matches!(
            parse_revenue("NaN"),
            Err(RecordIssue::UnparseableRevenue { .. })
        ));
    }

    #[test]
    fn test_negative_lifespan_dropped() {
        let cleaned = RecordCleaner::clean(&table(vec![
            row(0, "A", "2024-01-01", "2024-01-01", "10"),
            row(1, "C", "2024-01-05", "2024-01-04", "5"),
        ]));

        assert_eq!(cleaned.records.len(), 1);
        assert_eq!(cleaned.records[0].user_id, "A");
        assert_eq!(cleaned.records[0].lifespan_days, 0);
        assert_eq!(cleaned.diagnostics.negative_lifespan, 1);
        assert_eq!(cleaned.diagnostics.excluded_records(), 1);
    }

    #[test]
    fn test_same_day_later_hour_is_negative() {
        let cleaned = RecordCleaner::clean(&table(vec![row(
            0,
            "A",
            "2024-01-05 18:00",
            "2024-01-05 09:00",
            "1",
        )]));
        assert!(cleaned.records.is_empty());
        assert_eq!(cleaned.diagnostics.negative_lifespan, 1);
    }

    #[test]
    fn test_lifespan_whole_days() {
        let cleaned = RecordCleaner::clean(&table(vec![row(
            0,
            "B",
            "2024-01-01 20:00",
            "2024-01-10 08:00",
            "50",
        )]));
        assert_eq!(cleaned.records[0].lifespan_days, 8);
    }

    #[test]
    fn test_missing_and_bad_timestamps_dropped() {
        let cleaned = RecordCleaner::clean(&table(vec![
            row(0, "A", "", "2024-01-01", "1"),
            row(1, "B", "2024-01-01", "not a date", "1"),
            row(2, "", "2024-01-01", "2024-01-02", "1"),
        ]));
        assert!(cleaned.records.is_empty());
        assert_eq!(cleaned.diagnostics.missing_timestamp, 1);
        assert_eq!(cleaned.diagnostics.unparseable_timestamp, 1);
        assert_eq!(cleaned.diagnostics.missing_user_id, 1);
        assert_eq!(cleaned.diagnostics.samples.len(), 3);
    }

    #[test]
    fn test_bad_revenue_keeps_record() {
        let cleaned = RecordCleaner::clean(&table(vec![
            row(0, "A", "2024-01-01", "2024-01-03", ""),
            row(1, "B", "2024-01-01", "2024-01-03", "-4"),
            row(2, "C", "2024-01-01", "2024-01-03", "n/a"),
        ]));

        assert_eq!(cleaned.records.len(), 3);
        assert!(cleaned.records.iter().all(|r| r.revenue.is_none()));
        assert_eq!(cleaned.diagnostics.missing_revenue, 1);
        assert_eq!(cleaned.diagnostics.negative_revenue, 1);
        assert_eq!(cleaned.diagnostics.unparseable_revenue, 1);
        assert_eq!(cleaned.diagnostics.revenue_excluded(), 3);
        assert_eq!(cleaned.diagnostics.excluded_records(), 0);
    }

    #[test]
    fn test_sample_cap() {
        let rows = (0..MAX_ISSUE_SAMPLES + 5)
            .map(|i| row(i, "A", "bad", "bad", "1"))
            .collect();
        let cleaned = RecordCleaner::clean(&table(rows));
        assert_eq!(cleaned.diagnostics.samples.len(), MAX_ISSUE_SAMPLES);
        assert_eq!(cleaned.diagnostics.unparseable_timestamp, MAX_ISSUE_SAMPLES + 5);
    }

    #[test]
    fn test_blank_and_unreadable_rows_counted() {
        let mut canonical = table(vec![
            row(0, "A", "2024-01-01", "2024-01-02", "1"),
            row(1, "", "", "", ""),
            row(3, "D", "2024-01-01", "2024-01-02", "1"),
        ]);
        canonical.unreadable_rows = vec![2];
        let cleaned = RecordCleaner::clean(&canonical);

        assert_eq!(cleaned.records.len(), 2);
        assert_eq!(cleaned.diagnostics.input_rows, 4);
        assert_eq!(cleaned.diagnostics.blank_rows, 1);
        assert_eq!(cleaned.diagnostics.invalid_encoding, 1);
        assert_eq!(cleaned.diagnostics.missing_user_id, 0);
        assert_eq!(cleaned.diagnostics.excluded_records(), 2);
        assert_eq!(cleaned.diagnostics.samples[0].row_index, 2);
        assert_eq!(cleaned.diagnostics.samples[0].issue, RecordIssue::InvalidEncoding);
    }
}

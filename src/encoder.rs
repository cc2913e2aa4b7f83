//! Report encoding
//!
//! This module wraps reports in producer metadata for JSON consumers and
//! renders individual tables as CSV for spreadsheet-style consumers.

use crate::config::PipelineConfig;
use crate::error::{AnalyticsError, AnalyticsResult};
use crate::types::{
    ActiveUsersRow, AnalyticsReport, GroupSummary, ReportEnvelope, ReportProducer, StageOutcome,
};
use crate::{ENGINE_VERSION, PRODUCER_NAME};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Tables that can be exported on their own
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableKind {
    Daily,
    Weekly,
    Monthly,
    RevenueTrend,
    Cohorts,
    Segments,
    Churn,
    Loyalty,
    Clusters,
    ClusterProfiles,
}

/// Encoder producing report envelopes
pub struct ReportEncoder {
    instance_id: String,
}

impl Default for ReportEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportEncoder {
    /// Create a new encoder with a unique instance ID
    pub fn new() -> Self {
        Self {
            instance_id: Uuid::new_v4().to_string(),
        }
    }

    /// Create an encoder with a specific instance ID
    pub fn with_instance_id(instance_id: String) -> Self {
        Self { instance_id }
    }

    pub fn encode(&self, report: &AnalyticsReport, config: &PipelineConfig) -> ReportEnvelope {
        ReportEnvelope {
            producer: ReportProducer {
                name: PRODUCER_NAME.to_string(),
                version: ENGINE_VERSION.to_string(),
                instance_id: self.instance_id.clone(),
            },
            computed_at_utc: Utc::now().to_rfc3339(),
            config: config.clone(),
            report: report.clone(),
        }
    }

    /// Encode to a compact JSON string
    pub fn encode_to_json(
        &self,
        report: &AnalyticsReport,
        config: &PipelineConfig,
    ) -> AnalyticsResult<String> {
        serde_json::to_string(&self.encode(report, config)).map_err(AnalyticsError::Json)
    }

    /// Encode to an indented JSON string
    pub fn encode_to_json_pretty(
        &self,
        report: &AnalyticsReport,
        config: &PipelineConfig,
    ) -> AnalyticsResult<String> {
        serde_json::to_string_pretty(&self.encode(report, config)).map_err(AnalyticsError::Json)
    }
}

fn opt(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn summary_fields(s: &GroupSummary) -> [String; 5] {
    [
        s.user_count.to_string(),
        s.record_count.to_string(),
        s.revenue_records.to_string(),
        s.total_revenue.to_string(),
        opt(s.mean_revenue),
    ]
}

const SUMMARY_HEADERS: [&str; 5] = [
    "user_count",
    "record_count",
    "revenue_records",
    "total_revenue",
    "mean_revenue",
];

/// Render one table as CSV with a header row
pub fn encode_table_csv(report: &AnalyticsReport, table: TableKind) -> AnalyticsResult<String> {
    let mut wtr = csv::Writer::from_writer(Vec::new());

    let active_users =
        |wtr: &mut csv::Writer<Vec<u8>>, rows: &[ActiveUsersRow]| -> AnalyticsResult<()> {
            wtr.write_record(["bucket_start", "active_users"])?;
            for row in rows {
                wtr.write_record([row.bucket_start.to_string(), row.active_users.to_string()])?;
            }
            Ok(())
        };

    match table {
        TableKind::Daily => active_users(&mut wtr, &report.activity.daily)?,
        TableKind::Weekly => active_users(&mut wtr, &report.activity.weekly)?,
        TableKind::Monthly => active_users(&mut wtr, &report.activity.monthly)?,
        TableKind::RevenueTrend => {
            wtr.write_record(["month", "revenue", "revenue_records"])?;
            for row in &report.activity.revenue_trend {
                wtr.write_record([
                    row.month.to_string(),
                    row.revenue.to_string(),
                    row.revenue_records.to_string(),
                ])?;
            }
        }
        TableKind::Cohorts => {
            let mut header = vec!["signup_month"];
            header.extend(SUMMARY_HEADERS);
            wtr.write_record(&header)?;
            for row in &report.cohorts {
                let mut record = vec![row.signup_month.to_string()];
                record.extend(summary_fields(&row.summary));
                wtr.write_record(&record)?;
            }
        }
        TableKind::Segments => {
            let mut header = vec!["dimension", "value"];
            header.extend(SUMMARY_HEADERS);
            wtr.write_record(&header)?;
            for segment in &report.segments {
                for row in &segment.rows {
                    let mut record = vec![segment.dimension.key().to_string(), row.value.clone()];
                    record.extend(summary_fields(&row.summary));
                    wtr.write_record(&record)?;
                }
            }
        }
        TableKind::Churn => {
            let mut header = vec!["band", "lower_exclusive", "upper_inclusive"];
            header.extend(SUMMARY_HEADERS);
            header.extend(["user_pct", "revenue_pct"]);
            wtr.write_record(&header)?;
            for row in &report.churn {
                let mut record = vec![
                    row.label.clone(),
                    row.lower_exclusive.to_string(),
                    row.upper_inclusive.to_string(),
                ];
                record.extend(summary_fields(&row.summary));
                record.push(row.user_pct.to_string());
                record.push(opt(row.revenue_pct));
                wtr.write_record(&record)?;
            }
        }
        TableKind::Loyalty => {
            let mut header = vec!["band", "lower_bound", "upper_bound"];
            header.extend(SUMMARY_HEADERS);
            wtr.write_record(&header)?;
            for row in &report.loyalty {
                let mut record = vec![
                    row.label.clone(),
                    row.lower_bound.to_string(),
                    row.upper_bound.to_string(),
                ];
                record.extend(summary_fields(&row.summary));
                wtr.write_record(&record)?;
            }
        }
        TableKind::Clusters | TableKind::ClusterProfiles => {
            let result = match &report.clustering {
                StageOutcome::Completed(result) => result,
                StageOutcome::Failed { reason } => {
                    return Err(AnalyticsError::EncodingError(format!(
                        "clustering did not complete: {reason}"
                    )))
                }
            };
            if table == TableKind::Clusters {
                wtr.write_record(["row_index", "user_id", "lifespan_days", "revenue", "cluster"])?;
                for a in &result.assignments {
                    wtr.write_record([
                        a.row_index.to_string(),
                        a.user_id.clone(),
                        a.lifespan_days.to_string(),
                        a.revenue.to_string(),
                        a.cluster.to_string(),
                    ])?;
                }
            } else {
                wtr.write_record([
                    "cluster",
                    "size",
                    "centroid_lifespan_days",
                    "centroid_revenue",
                ])?;
                for p in &result.profiles {
                    wtr.write_record([
                        p.cluster.to_string(),
                        p.size.to_string(),
                        p.centroid_lifespan_days.to_string(),
                        p.centroid_revenue.to_string(),
                    ])?;
                }
            }
        }
    }

    let bytes = wtr
        .into_inner()
        .map_err(|e| AnalyticsError::EncodingError(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| AnalyticsError::EncodingError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::analyze_csv;

    fn sample_report() -> AnalyticsReport {
        let csv = "User ID,Signup,Last Login,Revenue,Tier\n\
                   A,2024-01-01,2024-01-01,10,Gold\n\
                   B,2024-01-01,2024-01-10,50,Free\n\
                   C,2024-01-02,2024-03-10,,Free\n";
        analyze_csv(csv, &PipelineConfig::default()).unwrap()
    }

    #[test]
    fn test_envelope_metadata() {
        let report = sample_report();
        let encoder = ReportEncoder::with_instance_id("test-instance".to_string());
        let json = encoder
            .encode_to_json(&report, &PipelineConfig::default())
            .unwrap();

        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["producer"]["name"], "pulse-metrics");
        assert_eq!(value["producer"]["instance_id"], "test-instance");
        assert_eq!(value["report"]["diagnostics"]["retained_records"], 3);
        assert_eq!(value["report"]["clustering"]["status"], "failed");
        assert!(value["computed_at_utc"].as_str().is_some());
    }

    #[test]
    fn test_missing_mean_serializes_as_null() {
        let report = sample_report();
        let json = serde_json::to_value(&report).unwrap();
        let loyalty_last = &json["loyalty"][3];
        assert!(loyalty_last["mean_revenue"].is_null());
        assert_eq!(loyalty_last["record_count"], 0);
    }

    #[test]
    fn test_churn_csv() {
        let csv = encode_table_csv(&sample_report(), TableKind::Churn).unwrap();
        let mut lines = csv.lines();
        assert_eq!(
            lines.next().unwrap(),
            "band,lower_exclusive,upper_inclusive,user_count,record_count,revenue_records,total_revenue,mean_revenue,user_pct,revenue_pct"
        );
        assert_eq!(lines.next().unwrap(), "Same-Day,-1,0,1,1,1,10,10,33.33,16.67");
    }

    #[test]
    fn test_segments_csv() {
        let csv = encode_table_csv(&sample_report(), TableKind::Segments).unwrap();
        let rows: Vec<&str> = csv.lines().collect();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[1], "tier,Free,2,2,1,50,50");
    }

    #[test]
    fn test_cluster_csv_requires_completed_stage() {
        let err = encode_table_csv(&sample_report(), TableKind::Clusters).unwrap_err();
        assert!(err.to_string().contains("clustering did not complete"));
    }

    #[test]
    fn test_daily_csv() {
        let csv = encode_table_csv(&sample_report(), TableKind::Daily).unwrap();
        assert_eq!(csv, "bucket_start,active_users\n2024-01-01,1\n2024-01-10,1\n2024-03-10,1\n");
    }
}

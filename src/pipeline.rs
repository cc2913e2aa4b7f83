//! Pipeline orchestration
//!
//! This module provides the public API for Pulse Metrics.
//! It runs the full pipeline from a raw table to the aggregate report.

use crate::activity::ActivityAggregator;
use crate::banding::BandClassifier;
use crate::cleaner::RecordCleaner;
use crate::cluster::BehaviorClusterer;
use crate::cohort::CohortAggregator;
use crate::config::PipelineConfig;
use crate::encoder::ReportEncoder;
use crate::error::{AnalyticsError, AnalyticsResult};
use crate::ingest;
use crate::schema::{AliasTable, SchemaNormalizer};
use crate::types::{AnalyticsReport, CleanedRecords, RawTable, ReportDiagnostics, StageOutcome};
use std::collections::BTreeSet;

/// Analyze CSV text with the given configuration.
///
/// # Arguments
/// * `csv` - CSV export with a header row
/// * `config` - Bin edges, cluster parameters and week alignment
///
/// # Returns
/// The full report; clustering may be `Failed` while every other table is present
///
/// # Example
/// ```ignore
/// let report = analyze_csv(&csv_text, &PipelineConfig::default())?;
/// ```
pub fn analyze_csv(csv: &str, config: &PipelineConfig) -> AnalyticsResult<AnalyticsReport> {
    let table = ingest::parse_csv(csv)?;
    AnalyticsPipeline::new(config.clone())?.run(&table)
}

/// Analyze CSV text and encode the report envelope as JSON.
///
/// `config_json` may be `None` or any subset of [`PipelineConfig`] fields.
pub fn analyze_csv_to_json(csv: String, config_json: Option<String>) -> AnalyticsResult<String> {
    let config = match config_json.as_deref().map(str::trim) {
        Some(json) if !json.is_empty() => PipelineConfig::from_json(json)?,
        _ => PipelineConfig::default(),
    };
    let report = analyze_csv(&csv, &config)?;
    ReportEncoder::new().encode_to_json(&report, &config)
}

/// Configured pipeline; each `run` is independent and shares no state
pub struct AnalyticsPipeline {
    config: PipelineConfig,
    normalizer: SchemaNormalizer,
}

impl AnalyticsPipeline {
    /// Create a pipeline with the default alias table
    pub fn new(config: PipelineConfig) -> AnalyticsResult<Self> {
        Self::with_aliases(config, AliasTable::default())
    }

    /// Create a pipeline with a custom alias table
    pub fn with_aliases(config: PipelineConfig, aliases: AliasTable) -> AnalyticsResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            normalizer: SchemaNormalizer::new(aliases),
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Normalize and clean only; used for input validation
    pub fn prepare(&self, table: &RawTable) -> AnalyticsResult<CleanedRecords> {
        // Stage 1: Map headers to canonical columns
        let canonical = self.normalizer.normalize(table)?;

        // Stage 2: Parse, validate and derive per-record fields
        Ok(RecordCleaner::clean(&canonical))
    }

    /// Run every stage over one table
    ///
    /// Fails with [`AnalyticsError::InsufficientData`] when cleaning leaves no
    /// records, since every aggregate would be empty.
    pub fn run(&self, table: &RawTable) -> AnalyticsResult<AnalyticsReport> {
        let cleaned = self.prepare(table)?;
        let records = &cleaned.records;
        if records.is_empty() {
            return Err(AnalyticsError::InsufficientData {
                stage: "cleaning".to_string(),
                required: 1,
                available: 0,
            });
        }

        // Stage 3: Active users and revenue trend
        let activity = ActivityAggregator::new(self.config.week_start).aggregate(records);

        // Stage 4: Cohorts and optional segments
        let cohorts = CohortAggregator::cohorts(records);
        let segments = CohortAggregator::segments(records, &cleaned.dimensions);

        // Stage 5: Churn and loyalty bands
        let classifier = BandClassifier::new(
            self.config.churn_bins.clone(),
            self.config.loyalty_bins.clone(),
        );
        let churn = classifier.churn(records);
        let loyalty = classifier.loyalty(records);

        // Stage 6: Clustering; a failure here leaves the other tables intact
        let clustering = match BehaviorClusterer::from_config(&self.config).cluster(records) {
            Ok(result) => StageOutcome::Completed(result),
            Err(e) => {
                log::warn!("clustering stage did not complete: {e}");
                StageOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        };

        let diagnostics = summarize_diagnostics(&cleaned);

        Ok(AnalyticsReport {
            diagnostics,
            activity,
            cohorts,
            segments,
            churn,
            loyalty,
            clustering,
        })
    }
}

fn summarize_diagnostics(cleaned: &CleanedRecords) -> ReportDiagnostics {
    let d = &cleaned.diagnostics;
    let distinct_users = cleaned
        .records
        .iter()
        .map(|r| r.user_id.as_str())
        .collect::<BTreeSet<_>>()
        .len();

    ReportDiagnostics {
        input_rows: d.input_rows,
        retained_records: d.retained_records,
        excluded_records: d.excluded_records(),
        distinct_users,
        blank_rows: d.blank_rows,
        invalid_encoding: d.invalid_encoding,
        missing_user_id: d.missing_user_id,
        missing_timestamp: d.missing_timestamp,
        unparseable_timestamp: d.unparseable_timestamp,
        negative_lifespan: d.negative_lifespan,
        revenue_excluded: d.revenue_excluded(),
    }
}

//! Core types for the Pulse Metrics pipeline
//!
//! This module defines the data structures that flow through each stage of the
//! pipeline: raw tables, canonical rows, cleaned user records, and the derived
//! aggregate tables handed to presentation layers.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Required canonical columns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CanonicalField {
    UserId,
    LastLogin,
    SignUp,
    Revenue,
}

impl CanonicalField {
    pub const ALL: [CanonicalField; 4] = [
        CanonicalField::UserId,
        CanonicalField::LastLogin,
        CanonicalField::SignUp,
        CanonicalField::Revenue,
    ];

    /// Normalized header key this field is matched against
    pub fn key(&self) -> &'static str {
        match self {
            CanonicalField::UserId => "user_id",
            CanonicalField::LastLogin => "last_login",
            CanonicalField::SignUp => "sign_up",
            CanonicalField::Revenue => "revenue",
        }
    }

    /// Name shown to users in error messages
    pub fn display_name(&self) -> &'static str {
        match self {
            CanonicalField::UserId => "User_ID",
            CanonicalField::LastLogin => "Last_Login",
            CanonicalField::SignUp => "Sign_Up",
            CanonicalField::Revenue => "Revenue",
        }
    }
}

/// Optional categorical columns that produce segment tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Tier,
    DeviceType,
    GameMode,
    UserSegment,
}

impl Dimension {
    pub const ALL: [Dimension; 4] = [
        Dimension::Tier,
        Dimension::DeviceType,
        Dimension::GameMode,
        Dimension::UserSegment,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            Dimension::Tier => "tier",
            Dimension::DeviceType => "device_type",
            Dimension::GameMode => "game_mode",
            Dimension::UserSegment => "user_segment",
        }
    }
}

/// Header row plus string cells, exactly as received from ingestion
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    pub headers: Vec<String>,
    /// One entry per data record; unreadable records hold no cells
    pub rows: Vec<Vec<String>>,
    /// Positions in `rows` whose bytes were not valid UTF-8
    pub unreadable_rows: Vec<usize>,
}

impl RawTable {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self {
            headers,
            rows,
            unreadable_rows: Vec::new(),
        }
    }

    pub fn is_unreadable(&self, row: usize) -> bool {
        self.unreadable_rows.binary_search(&row).is_ok()
    }

    /// Cell text, or empty for ragged rows
    pub fn cell(&self, row: usize, column: usize) -> &str {
        self.rows
            .get(row)
            .and_then(|r| r.get(column))
            .map(String::as_str)
            .unwrap_or("")
    }
}

/// Categorical attributes carried through uninterpreted
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attributes {
    pub tier: Option<String>,
    pub device_type: Option<String>,
    pub game_mode: Option<String>,
    pub user_segment: Option<String>,
}

impl Attributes {
    pub fn get(&self, dimension: Dimension) -> Option<&str> {
        match dimension {
            Dimension::Tier => self.tier.as_deref(),
            Dimension::DeviceType => self.device_type.as_deref(),
            Dimension::GameMode => self.game_mode.as_deref(),
            Dimension::UserSegment => self.user_segment.as_deref(),
        }
    }

    pub fn set(&mut self, dimension: Dimension, value: Option<String>) {
        match dimension {
            Dimension::Tier => self.tier = value,
            Dimension::DeviceType => self.device_type = value,
            Dimension::GameMode => self.game_mode = value,
            Dimension::UserSegment => self.user_segment = value,
        }
    }
}

/// A row after header normalization; values are still unparsed text
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalRow {
    /// Zero-based data row position in the input
    pub row_index: usize,
    pub user_id: String,
    pub last_login: String,
    pub sign_up: String,
    pub revenue: String,
    pub attributes: Attributes,
}

/// Output of the schema normalizer
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalTable {
    pub rows: Vec<CanonicalRow>,
    /// Optional dimensions whose column was present in the input
    pub dimensions: Vec<Dimension>,
    /// Input positions that could not be decoded and have no canonical row
    pub unreadable_rows: Vec<usize>,
}

/// A validated record; `last_active_at >= signup_at` always holds
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserRecord {
    pub row_index: usize,
    pub user_id: String,
    pub signup_at: NaiveDateTime,
    pub last_active_at: NaiveDateTime,
    /// Present only when the input value was a non-negative number
    pub revenue: Option<f64>,
    pub lifespan_days: i64,
    pub attributes: Attributes,
}

impl UserRecord {
    pub fn last_active_date(&self) -> NaiveDate {
        self.last_active_at.date()
    }

    pub fn signup_date(&self) -> NaiveDate {
        self.signup_at.date()
    }
}

/// A single recorded data-quality issue
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IssueSample {
    pub row_index: usize,
    pub issue: crate::error::RecordIssue,
    pub message: String,
}

/// Counts of what the cleaner dropped or partially excluded
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CleaningDiagnostics {
    pub input_rows: usize,
    pub retained_records: usize,
    pub blank_rows: usize,
    pub invalid_encoding: usize,
    pub missing_user_id: usize,
    pub missing_timestamp: usize,
    pub unparseable_timestamp: usize,
    pub negative_lifespan: usize,
    /// Retained records excluded from revenue aggregates
    pub missing_revenue: usize,
    pub unparseable_revenue: usize,
    pub negative_revenue: usize,
    /// First few issues, for display
    pub samples: Vec<IssueSample>,
}

impl CleaningDiagnostics {
    pub fn excluded_records(&self) -> usize {
        self.input_rows - self.retained_records
    }

    pub fn revenue_excluded(&self) -> usize {
        self.missing_revenue + self.unparseable_revenue + self.negative_revenue
    }
}

/// Output of the cleaner
#[derive(Debug, Clone, PartialEq)]
pub struct CleanedRecords {
    pub records: Vec<UserRecord>,
    pub dimensions: Vec<Dimension>,
    pub diagnostics: CleaningDiagnostics,
}

/// Distinct active users in one time bucket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveUsersRow {
    pub bucket_start: NaiveDate,
    pub active_users: usize,
}

/// Summed revenue for one calendar month
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevenueTrendRow {
    pub month: NaiveDate,
    pub revenue: f64,
    pub revenue_records: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActivitySummary {
    pub daily: Vec<ActiveUsersRow>,
    pub weekly: Vec<ActiveUsersRow>,
    pub monthly: Vec<ActiveUsersRow>,
    pub revenue_trend: Vec<RevenueTrendRow>,
}

/// Counts and revenue statistics for one group of records
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupSummary {
    pub user_count: usize,
    pub record_count: usize,
    /// Records that contributed to the revenue fields
    pub revenue_records: usize,
    pub total_revenue: f64,
    /// `None` when no record in the group carries revenue
    pub mean_revenue: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CohortRow {
    pub signup_month: NaiveDate,
    #[serde(flatten)]
    pub summary: GroupSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentRow {
    pub value: String,
    #[serde(flatten)]
    pub summary: GroupSummary,
}

/// Revenue breakdown over one categorical dimension
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentTable {
    pub dimension: Dimension,
    /// Records with a blank value for this dimension
    pub unlabeled_records: usize,
    pub rows: Vec<SegmentRow>,
}

/// One early-churn band, lifespan in `(lower_exclusive, upper_inclusive]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChurnBandRow {
    pub label: String,
    pub lower_exclusive: i64,
    pub upper_inclusive: i64,
    #[serde(flatten)]
    pub summary: GroupSummary,
    /// Share of all cleaned users, two decimals
    pub user_pct: f64,
    /// Share of all cleaned revenue, two decimals; `None` when that total is zero
    pub revenue_pct: Option<f64>,
}

/// One loyalty band, lifespan in `[lower_bound, upper_bound)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoyaltyBandRow {
    pub label: String,
    pub lower_bound: i64,
    pub upper_bound: i64,
    #[serde(flatten)]
    pub summary: GroupSummary,
}

/// Cluster label for one (lifespan, revenue) point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterAssignment {
    pub row_index: usize,
    pub user_id: String,
    pub lifespan_days: i64,
    pub revenue: f64,
    pub cluster: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterProfile {
    pub cluster: usize,
    pub size: usize,
    pub centroid_lifespan_days: f64,
    pub centroid_revenue: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterResult {
    pub k: usize,
    pub seed: u64,
    pub iterations: usize,
    pub converged: bool,
    /// Sum of squared distances to the assigned centroid
    pub inertia: f64,
    pub assignments: Vec<ClusterAssignment>,
    pub profiles: Vec<ClusterProfile>,
}

/// Result of a stage that may fail without failing the run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "data", rename_all = "snake_case")]
pub enum StageOutcome<T> {
    Completed(T),
    Failed { reason: String },
}

impl<T> StageOutcome<T> {
    pub fn completed(&self) -> Option<&T> {
        match self {
            StageOutcome::Completed(value) => Some(value),
            StageOutcome::Failed { .. } => None,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, StageOutcome::Completed(_))
    }
}

/// Every table produced by one pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsReport {
    pub diagnostics: ReportDiagnostics,
    pub activity: ActivitySummary,
    pub cohorts: Vec<CohortRow>,
    /// Only dimensions present in the input
    pub segments: Vec<SegmentTable>,
    pub churn: Vec<ChurnBandRow>,
    pub loyalty: Vec<LoyaltyBandRow>,
    pub clustering: StageOutcome<ClusterResult>,
}

impl AnalyticsReport {
    pub fn segment(&self, dimension: Dimension) -> Option<&SegmentTable> {
        self.segments.iter().find(|t| t.dimension == dimension)
    }
}

/// Serializable summary of [`CleaningDiagnostics`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportDiagnostics {
    pub input_rows: usize,
    pub retained_records: usize,
    pub excluded_records: usize,
    pub distinct_users: usize,
    pub blank_rows: usize,
    pub invalid_encoding: usize,
    pub missing_user_id: usize,
    pub missing_timestamp: usize,
    pub unparseable_timestamp: usize,
    pub negative_lifespan: usize,
    pub revenue_excluded: usize,
}

/// Producer metadata attached to encoded reports
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportProducer {
    pub name: String,
    pub version: String,
    pub instance_id: String,
}

/// Report plus the metadata describing how it was produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportEnvelope {
    pub producer: ReportProducer,
    pub computed_at_utc: String,
    pub config: crate::config::PipelineConfig,
    pub report: AnalyticsReport,
}

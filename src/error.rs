//! Error types for Pulse Metrics
//!
//! Two families: [`AnalyticsError`] halts a run (or a single stage), while
//! [`RecordIssue`] describes a row that was dropped or partially excluded and
//! is only ever counted, never raised.

use thiserror::Error;

/// Errors that stop a pipeline run or one of its stages
#[derive(Debug, Error)]
pub enum AnalyticsError {
    #[error("Missing required column(s): {}", .missing.join(", "))]
    Schema { missing: Vec<String> },

    #[error("Insufficient data for {stage}: need at least {required}, found {available}")]
    InsufficientData {
        stage: String,
        required: usize,
        available: usize,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Input contains no header row")]
    EmptyInput,

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Encoding error: {0}")]
    EncodingError(String),
}

/// Data-quality problems found while cleaning a single row
#[derive(Debug, Clone, PartialEq, Error, serde::Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecordIssue {
    #[error("row is blank")]
    BlankRow,

    #[error("row is not valid UTF-8")]
    InvalidEncoding,

    #[error("user identifier is empty")]
    MissingUserId,

    #[error("{field} is empty")]
    MissingTimestamp { field: String },

    #[error("{field} value '{value}' is not a recognised date")]
    UnparseableTimestamp { field: String, value: String },

    #[error("last activity {last_active} precedes signup {signup}")]
    NegativeLifespan { signup: String, last_active: String },

    #[error("revenue is empty")]
    MissingRevenue,

    #[error("revenue value '{value}' is not a number")]
    UnparseableRevenue { value: String },

    #[error("revenue value {value} is negative")]
    NegativeRevenue { value: f64 },
}

impl RecordIssue {
    /// Whether the issue removes the whole row rather than just its revenue
    pub fn excludes_record(&self) -> bool {
        matches!(
            self,
            RecordIssue::BlankRow
                | RecordIssue::InvalidEncoding
                | RecordIssue::MissingUserId
                | RecordIssue::MissingTimestamp { .. }
                | RecordIssue::UnparseableTimestamp { .. }
                | RecordIssue::NegativeLifespan { .. }
        )
    }
}

pub type AnalyticsResult<T> = Result<T, AnalyticsError>;

//! Pulse Metrics - User-behavior and revenue analytics engine
//!
//! Pulse transforms a loosely-structured export of per-user activity records
//! into a fixed set of metrics through a deterministic pipeline: schema
//! normalization → record cleaning → activity aggregation → cohort and segment
//! aggregation → churn and loyalty banding → behavioral clustering.
//!
//! Every run is stateless. Identical input and configuration produce identical
//! tables and cluster labels.

pub mod activity;
pub mod banding;
pub mod cleaner;
pub mod cluster;
pub mod cohort;
pub mod config;
pub mod encoder;
pub mod error;
pub mod ingest;
pub mod pipeline;
pub mod schema;
pub mod types;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

pub use config::PipelineConfig;
pub use encoder::{encode_table_csv, ReportEncoder, TableKind};
pub use error::{AnalyticsError, RecordIssue};
pub use pipeline::{analyze_csv, analyze_csv_to_json, AnalyticsPipeline};
pub use schema::{AliasTable, SchemaNormalizer};
pub use types::{AnalyticsReport, RawTable, StageOutcome};

/// Engine version embedded in encoded reports
pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name for encoded reports
pub const PRODUCER_NAME: &str = "pulse-metrics";

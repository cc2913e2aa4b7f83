//! Pipeline configuration
//!
//! Bin edges, cluster parameters and week alignment. Changing these moves
//! aggregate boundaries; the algorithms stay the same.

use crate::error::{AnalyticsError, AnalyticsResult};
use chrono::Weekday;
use serde::{Deserialize, Serialize};

/// Default churn-band upper edges (days)
pub const DEFAULT_CHURN_BINS: [i64; 3] = [0, 7, 30];

/// Default loyalty-band lower edges after the implicit 0 (days)
pub const DEFAULT_LOYALTY_BINS: [i64; 3] = [100, 300, 500];

pub const DEFAULT_CLUSTER_COUNT: usize = 4;

pub const DEFAULT_CLUSTER_SEED: u64 = 42;

/// Lloyd iteration cap for the clusterer
pub const DEFAULT_MAX_ITERATIONS: usize = 300;

/// Centroid shift below which clustering is considered converged
pub const DEFAULT_TOLERANCE: f64 = 1e-4;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Inclusive upper edges of the churn bands; lifespans above the last edge are not banded
    pub churn_bins: Vec<i64>,
    /// Interior loyalty edges; bands are `[0, b0)`, `[b0, b1)`, ..., `[bn, max + 1)`
    pub loyalty_bins: Vec<i64>,
    pub cluster_count: usize,
    pub cluster_seed: u64,
    pub week_start: Weekday,
    pub max_iterations: usize,
    pub tolerance: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            churn_bins: DEFAULT_CHURN_BINS.to_vec(),
            loyalty_bins: DEFAULT_LOYALTY_BINS.to_vec(),
            cluster_count: DEFAULT_CLUSTER_COUNT,
            cluster_seed: DEFAULT_CLUSTER_SEED,
            week_start: Weekday::Mon,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            tolerance: DEFAULT_TOLERANCE,
        }
    }
}

impl PipelineConfig {
    /// Load a config from JSON; absent fields take their defaults
    pub fn from_json(json: &str) -> AnalyticsResult<Self> {
        let config: PipelineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> AnalyticsResult<()> {
        if self.churn_bins.is_empty() {
            return Err(AnalyticsError::InvalidConfig(
                "churn_bins must not be empty".to_string(),
            ));
        }
        if self.churn_bins[0] < 0 {
            return Err(AnalyticsError::InvalidConfig(format!(
                "churn_bins must start at 0 or above, got {}",
                self.churn_bins[0]
            )));
        }
        ensure_increasing("churn_bins", &self.churn_bins)?;

        if self.loyalty_bins.is_empty() {
            return Err(AnalyticsError::InvalidConfig(
                "loyalty_bins must not be empty".to_string(),
            ));
        }
        if self.loyalty_bins[0] <= 0 {
            return Err(AnalyticsError::InvalidConfig(format!(
                "loyalty_bins must start above 0, got {}",
                self.loyalty_bins[0]
            )));
        }
        ensure_increasing("loyalty_bins", &self.loyalty_bins)?;

        if self.cluster_count == 0 {
            return Err(AnalyticsError::InvalidConfig(
                "cluster_count must be at least 1".to_string(),
            ));
        }
        if self.max_iterations == 0 {
            return Err(AnalyticsError::InvalidConfig(
                "max_iterations must be at least 1".to_string(),
            ));
        }
        if !self.tolerance.is_finite() || self.tolerance < 0.0 {
            return Err(AnalyticsError::InvalidConfig(format!(
                "tolerance must be a non-negative number, got {}",
                self.tolerance
            )));
        }
        Ok(())
    }
}

fn ensure_increasing(name: &str, edges: &[i64]) -> AnalyticsResult<()> {
    if let Some(pair) = edges.windows(2).find(|w| w[0] >= w[1]) {
        return Err(AnalyticsError::InvalidConfig(format!(
            "{name} must be strictly increasing ({} then {})",
            pair[0], pair[1]
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.churn_bins, vec![0, 7, 30]);
        assert_eq!(config.loyalty_bins, vec![100, 300, 500]);
        assert_eq!(config.cluster_count, 4);
        assert_eq!(config.week_start, Weekday::Mon);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = PipelineConfig::from_json(r#"{"cluster_count": 3}"#).unwrap();
        assert_eq!(config.cluster_count, 3);
        assert_eq!(config.cluster_seed, DEFAULT_CLUSTER_SEED);
        assert_eq!(config.churn_bins, vec![0, 7, 30]);
    }

    #[test]
    fn test_week_start_from_json() {
        let config = PipelineConfig::from_json(r#"{"week_start": "Sun"}"#).unwrap();
        assert_eq!(config.week_start, Weekday::Sun);
    }

    #[test]
    fn test_rejects_unsorted_bins() {
        let config = PipelineConfig {
            loyalty_bins: vec![100, 50],
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("loyalty_bins"));
    }

    #[test]
    fn test_rejects_zero_clusters() {
        let config = PipelineConfig {
            cluster_count: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(AnalyticsError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_rejects_negative_churn_edge() {
        let config = PipelineConfig {
            churn_bins: vec![-3, 7],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}

use thiserror::Error;

use crate::cycle::CycleKind;

/// Errors surfaced by series registration, cycle control, and context copy.
///
/// Tracking a value never fails: a value that cannot be absorbed (inactive
/// cycle, filtered-out series) is silently dropped.
#[derive(Error, Debug)]
pub enum MetricError {
    #[error("metric id must not be empty")]
    EmptyMetricId,

    #[error("dimension name at position {position} of metric {metric_id:?} is empty")]
    EmptyDimensionName { metric_id: String, position: usize },

    #[error("dimension value at position {position} of metric {metric_id:?} is empty")]
    EmptyDimensionValue { metric_id: String, position: usize },

    #[error("metric {metric_id:?} declares {declared} dimensions, got {supplied}")]
    DimensionArityMismatch {
        metric_id: String,
        declared: usize,
        supplied: usize,
    },

    #[error("metric {metric_id:?} is already registered with a different configuration")]
    ConfigurationMismatch { metric_id: String },

    #[error("invalid metric configuration: {reason}")]
    InvalidConfiguration { reason: String },

    #[error("series limit {limit} reached for metric {metric_id:?}")]
    SeriesCapacityExceeded { metric_id: String, limit: usize },

    #[error(
        "dimension {position} of metric {metric_id:?} reached its limit of {limit} distinct values"
    )]
    DimensionCapacityExceeded {
        metric_id: String,
        position: usize,
        limit: usize,
    },

    #[error("the {0:?} cycle is always active and cannot be stopped")]
    CycleAlwaysActive(CycleKind),

    #[error("context bridge failed: {reason}")]
    ContextBridge { reason: String },
}

impl MetricError {
    /// Whether this error is a capacity refusal (series or dimension cap).
    pub fn is_capacity(&self) -> bool {
        matches!(
            self,
            MetricError::SeriesCapacityExceeded { .. }
                | MetricError::DimensionCapacityExceeded { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_classification() {
        let err = MetricError::SeriesCapacityExceeded {
            metric_id: "m".into(),
            limit: 2,
        };
        assert!(err.is_capacity());

        let err = MetricError::DimensionCapacityExceeded {
            metric_id: "m".into(),
            position: 0,
            limit: 100,
        };
        assert!(err.is_capacity());

        let err = MetricError::EmptyMetricId;
        assert!(!err.is_capacity());
    }

    #[test]
    fn test_display_contains_identity() {
        let err = MetricError::DimensionArityMismatch {
            metric_id: "requests".into(),
            declared: 2,
            supplied: 3,
        };
        let text = err.to_string();
        assert!(text.contains("requests"));
        assert!(text.contains('2'));
        assert!(text.contains('3'));
    }
}

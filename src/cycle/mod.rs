//! Aggregation cycles: named windows that can be started, cycled, and
//! stopped independently of one another.
//!
//! The manager runs up to three cycles concurrently. The default cycle is
//! always active and is driven on a fixed period; the custom and quick-pulse
//! cycles are caller-driven with virtual timestamps, which makes windowing
//! deterministic under test.

use std::sync::Arc;

use chrono::{DateTime, FixedOffset};

use crate::kernel::Aggregate;
use crate::series::Series;

/// The three named cycles a manager runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CycleKind {
    /// Always active; flushed to the sink on the manager's period.
    Default,
    /// Caller-driven auxiliary cycle with virtual timestamps.
    Custom,
    /// Reserved for the live-metrics consumer; semantics match `Custom`.
    QuickPulse,
}

/// All cycle kinds, in slot order.
pub const CYCLE_KINDS: [CycleKind; 3] = [CycleKind::Default, CycleKind::Custom, CycleKind::QuickPulse];

impl CycleKind {
    /// Kernel-slot index on a series.
    pub(crate) fn index(self) -> usize {
        match self {
            CycleKind::Default => 0,
            CycleKind::Custom => 1,
            CycleKind::QuickPulse => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CycleKind::Default => "default",
            CycleKind::Custom => "custom",
            CycleKind::QuickPulse => "quick_pulse",
        }
    }
}

/// Per-track filter attached to an admitted series; may drop values.
pub trait ValueFilter: Send + Sync {
    fn admit_value(&self, series: &Series, value: f64) -> bool;
}

/// Per-series filter, consulted once per series when a cycle starts or
/// cycles. An admitted series may carry a [`ValueFilter`] for the window.
pub trait CycleFilter: Send + Sync {
    fn admit(&self, series: &Series) -> Admission;
}

/// Outcome of consulting a [`CycleFilter`] for one series.
pub struct Admission {
    pub admitted: bool,
    pub value_filter: Option<Arc<dyn ValueFilter>>,
}

impl Admission {
    /// Admit with no per-value filtering.
    pub fn allow() -> Self {
        Self {
            admitted: true,
            value_filter: None,
        }
    }

    /// Admit, screening each tracked value through `filter`.
    pub fn allow_filtered(filter: Arc<dyn ValueFilter>) -> Self {
        Self {
            admitted: true,
            value_filter: Some(filter),
        }
    }

    /// Exclude the series from the cycle.
    pub fn deny() -> Self {
        Self {
            admitted: false,
            value_filter: None,
        }
    }
}

/// Cycle lifecycle state, guarded by the per-cycle mutex in the manager.
pub(crate) enum CycleState {
    Inactive,
    Active {
        started: DateTime<FixedOffset>,
        filter: Option<Arc<dyn CycleFilter>>,
    },
}

/// Aggregates produced by one cycle boundary.
///
/// Window-summary aggregates appear only for series that absorbed at least
/// one value in the period; running accumulators are reported whenever they
/// hold state, even across silent periods.
#[derive(Debug, Default)]
pub struct AggregationSummary {
    pub non_persistent_aggregates: Vec<Aggregate>,
    pub persistent_aggregates: Vec<Aggregate>,
}

impl AggregationSummary {
    pub fn len(&self) -> usize {
        self.non_persistent_aggregates.len() + self.persistent_aggregates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Moves every aggregate out, non-persistent first.
    pub fn into_aggregates(self) -> Vec<Aggregate> {
        let mut all = self.non_persistent_aggregates;
        all.extend(self.persistent_aggregates);
        all
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_kind_indices_are_distinct() {
        let mut seen = [false; 3];
        for kind in CYCLE_KINDS {
            assert!(!seen[kind.index()], "duplicate slot for {kind:?}");
            seen[kind.index()] = true;
        }
    }

    #[test]
    fn test_admission_constructors() {
        assert!(Admission::allow().admitted);
        assert!(Admission::allow().value_filter.is_none());
        assert!(!Admission::deny().admitted);
    }

    #[test]
    fn test_empty_summary() {
        let summary = AggregationSummary::default();
        assert!(summary.is_empty());
        assert_eq!(summary.len(), 0);
        assert!(summary.into_aggregates().is_empty());
    }
}

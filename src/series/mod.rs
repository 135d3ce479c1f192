//! A series is one data stream: a metric id plus one ordered set of
//! dimension values, with up to three live kernels (one per cycle).
//!
//! Each kernel slot is an atomic pointer. Tracking loads the slot lock-free
//! and records into whatever kernel is installed; a window boundary swaps a
//! fresh kernel in first and snapshots the displaced one after, so no track
//! that starts after the swap can land in the closed window.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use chrono::{DateTime, FixedOffset};

use crate::config::MetricConfiguration;
use crate::cycle::{Admission, CycleKind, ValueFilter, CYCLE_KINDS};
use crate::kernel::{Aggregate, AggregateData, Kernel, KernelKind};

/// Kernel plus the value filter decided for it at cycle time. Replaced as a
/// unit so a track observes a consistent pair.
pub(crate) struct SlotState {
    kernel: Arc<Kernel>,
    value_filter: Option<Arc<dyn ValueFilter>>,
}

impl SlotState {
    fn fresh(kind: KernelKind, value_filter: Option<Arc<dyn ValueFilter>>) -> Self {
        Self {
            kernel: Arc::new(Kernel::new(kind)),
            value_filter,
        }
    }
}

struct CycleSlot {
    state: ArcSwapOption<SlotState>,
}

impl CycleSlot {
    fn empty() -> Self {
        Self {
            state: ArcSwapOption::const_empty(),
        }
    }
}

/// One canonical data stream owned by the directory.
pub struct Series {
    metric_id: Arc<str>,
    dimension_names: Arc<[String]>,
    dimension_values: Box<[String]>,
    config: Arc<MetricConfiguration>,
    slots: [CycleSlot; 3],
}

impl std::fmt::Debug for Series {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Series")
            .field("metric_id", &self.metric_id)
            .field("dimension_values", &self.dimension_values)
            .field("kind", &self.config.kind)
            .finish()
    }
}

impl Series {
    pub(crate) fn new(
        metric_id: Arc<str>,
        dimension_names: Arc<[String]>,
        dimension_values: Box<[String]>,
        config: Arc<MetricConfiguration>,
    ) -> Self {
        Self {
            metric_id,
            dimension_names,
            dimension_values,
            config,
            slots: [CycleSlot::empty(), CycleSlot::empty(), CycleSlot::empty()],
        }
    }

    pub fn metric_id(&self) -> &str {
        &self.metric_id
    }

    pub fn dimension_names(&self) -> &[String] {
        &self.dimension_names
    }

    pub fn dimension_values(&self) -> &[String] {
        &self.dimension_values
    }

    pub fn configuration(&self) -> &MetricConfiguration {
        &self.config
    }

    pub fn kind(&self) -> KernelKind {
        self.config.kind
    }

    /// Dimension name to value, in schema order.
    pub fn dimensions(&self) -> HashMap<String, String> {
        self.dimension_names
            .iter()
            .cloned()
            .zip(self.dimension_values.iter().cloned())
            .collect()
    }

    /// Routes a value into every cycle that currently has a kernel installed
    /// and whose value filter admits it. Never fails; with no active cycle
    /// the value is dropped.
    pub fn track(&self, value: f64) {
        for kind in CYCLE_KINDS {
            let slot = &self.slots[kind.index()];
            // Full load: the Arc reference keeps the state visibly in use so
            // a concurrent rotation drains this track before snapshotting.
            if let Some(state) = slot.state.load_full() {
                if let Some(filter) = &state.value_filter {
                    if !filter.admit_value(self, value) {
                        continue;
                    }
                }
                state.kernel.track(value);
            }
        }
    }

    /// Caller-driven reset of the default-cycle kernel. Meaningful for
    /// accumulators, whose totals otherwise survive every boundary.
    pub fn reset_aggregation(&self) {
        let slot = &self.slots[CycleKind::Default.index()];
        if let Some(state) = &*slot.state.load() {
            state.kernel.reset();
        }
    }

    /// Best-effort, lock-free view of the default-cycle kernel state.
    ///
    /// Returns `None` when no kernel is installed or it has just been
    /// snapped away. The result is statistical, not exact: concurrent tracks
    /// may be partially visible.
    pub fn peek_current(&self) -> Option<AggregateData> {
        let slot = &self.slots[CycleKind::Default.index()];
        let state = slot.state.load_full()?;
        Some(state.kernel.snapshot())
    }

    /// Installs a fresh kernel for `cycle` if the slot is empty.
    ///
    /// Used at cycle activation and when a series is created while a cycle
    /// is already active. Never replaces a live kernel. Slot writes for one
    /// cycle are serialized by the manager's cycle lock, so the check and
    /// the store need no stronger coordination.
    pub(crate) fn install_kernel(
        &self,
        cycle: CycleKind,
        value_filter: Option<Arc<dyn ValueFilter>>,
    ) {
        let slot = &self.slots[cycle.index()];
        if slot.state.load().is_some() {
            return;
        }
        let state = Arc::new(SlotState::fresh(self.kind(), value_filter));
        slot.state.store(Some(state));
    }

    /// Closes the window `[period_start, period_end)` for `cycle` on this
    /// series and re-arms the slot according to `admission`.
    ///
    /// Measurement slots get a fresh kernel; accumulator slots keep their
    /// kernel so totals carry forward. A denied admission leaves the slot
    /// empty (the stop path). Returns the displaced window's aggregate when
    /// there is something to report: a measurement with at least one tracked
    /// value, or an accumulator that has been touched.
    pub(crate) fn rotate_slot(
        &self,
        cycle: CycleKind,
        admission: &Admission,
        period_start: DateTime<FixedOffset>,
        period_end: DateTime<FixedOffset>,
    ) -> Option<Aggregate> {
        let slot = &self.slots[cycle.index()];

        let next = if admission.admitted {
            let previous = slot.state.load_full();
            let kernel = match (&previous, self.kind()) {
                (Some(state), KernelKind::Accumulator) => Arc::clone(&state.kernel),
                _ => Arc::new(Kernel::new(self.kind())),
            };
            Some(Arc::new(SlotState {
                kernel,
                value_filter: admission.value_filter.clone(),
            }))
        } else {
            None
        };

        // Swap first: once the old state is detached, no new track can reach
        // a displaced measurement kernel. Tracks already holding the state
        // finish within a few instructions; wait them out so the snapshot
        // covers every track that started before the boundary.
        let displaced = slot.state.swap(next)?;
        while Arc::strong_count(&displaced) > 1 {
            std::hint::spin_loop();
        }
        let data = displaced.kernel.snapshot();

        let report = match data {
            AggregateData::Measurement { count, .. } => count > 0,
            AggregateData::Accumulator { .. } => displaced.kernel.touched(),
        };
        report.then(|| self.make_aggregate(data, period_start, period_end))
    }

    fn make_aggregate(
        &self,
        data: AggregateData,
        period_start: DateTime<FixedOffset>,
        period_end: DateTime<FixedOffset>,
    ) -> Aggregate {
        let period = (period_end - period_start).to_std().unwrap_or(Duration::ZERO);
        Aggregate {
            metric_id: Arc::clone(&self.metric_id),
            dimensions: self.dimensions(),
            period_start,
            period,
            restrict_to_nonnegative_integers: self.config.restrict_to_nonnegative_integers,
            data,
        }
    }
}

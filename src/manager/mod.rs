//! The manager owns the series directory, the three aggregation cycles, and
//! the sink handle.
//!
//! Values enter through [`Manager::track`] (or a cached
//! [`Series`](crate::series::Series) handle) and fan into every active
//! cycle. A window boundary on the default cycle is forced by
//! [`Manager::flush`], which pushes each aggregate to the sink; auxiliary
//! cycles are driven by the caller with virtual timestamps and return their
//! aggregates in a summary instead.

use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Utc};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{ManagerConfig, MetricConfiguration};
use crate::cycle::{
    Admission, AggregationSummary, CycleFilter, CycleKind, CycleState, CYCLE_KINDS,
};
use crate::directory::SeriesDirectory;
use crate::error::MetricError;
use crate::kernel::{Aggregate, KernelKind};
use crate::series::Series;
use crate::sink::{MetricRecord, Sink};

struct CycleRuntime {
    state: Mutex<CycleState>,
}

impl CycleRuntime {
    fn inactive() -> Self {
        Self {
            state: Mutex::new(CycleState::Inactive),
        }
    }

    fn active(started: DateTime<FixedOffset>) -> Self {
        Self {
            state: Mutex::new(CycleState::Active {
                started,
                filter: None,
            }),
        }
    }
}

/// Client-side aggregation engine entry point.
///
/// Typically created once per host pipeline and shared behind an `Arc` for
/// the life of the process. Series are created lazily on first use and are
/// never evicted.
pub struct Manager {
    config: ManagerConfig,
    directory: SeriesDirectory,
    cycles: [CycleRuntime; 3],
    sink: Option<Arc<dyn Sink>>,
}

impl std::fmt::Debug for Manager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Manager")
            .field("series", &self.directory.total_series_count())
            .field("sink", &self.sink.as_ref().map(|s| s.name()))
            .finish()
    }
}

impl Manager {
    /// Creates a manager with no sink; aggregates are only reachable through
    /// cycle summaries.
    pub fn new(config: ManagerConfig) -> Self {
        Self::build(config, None, Utc::now().fixed_offset())
    }

    /// Creates a manager flushing default-cycle aggregates into `sink`.
    pub fn with_sink(config: ManagerConfig, sink: Arc<dyn Sink>) -> Self {
        Self::build(config, Some(sink), Utc::now().fixed_offset())
    }

    /// Creates a manager whose default cycle starts at `now`. Intended for
    /// embedders that supply their own time source.
    pub fn with_sink_at(
        config: ManagerConfig,
        sink: Arc<dyn Sink>,
        now: DateTime<FixedOffset>,
    ) -> Self {
        Self::build(config, Some(sink), now)
    }

    /// Creates a sinkless manager whose default cycle starts at `now`.
    pub fn new_at(config: ManagerConfig, now: DateTime<FixedOffset>) -> Self {
        Self::build(config, None, now)
    }

    fn build(
        config: ManagerConfig,
        sink: Option<Arc<dyn Sink>>,
        now: DateTime<FixedOffset>,
    ) -> Self {
        info!(
            window_interval = ?config.window_interval,
            sink = sink.as_ref().map(|s| s.name()),
            "metrics manager created",
        );
        Self {
            config,
            directory: SeriesDirectory::new(),
            // The default cycle is active for the manager's whole lifetime.
            cycles: [
                CycleRuntime::active(now),
                CycleRuntime::inactive(),
                CycleRuntime::inactive(),
            ],
            sink,
        }
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// The series registry, for introspection of counts and caps.
    pub fn directory(&self) -> &SeriesDirectory {
        &self.directory
    }

    /// Returns the canonical series for the fingerprint, creating it (and
    /// arming kernels for every active cycle that admits it) if the metric's
    /// caps allow.
    pub fn get_or_create_series(
        &self,
        metric_id: &str,
        dimensions: &[(&str, &str)],
        config: Option<&MetricConfiguration>,
    ) -> Result<Arc<Series>, MetricError> {
        let got = self.directory.get_or_create(metric_id, dimensions, config)?;

        if got.created {
            // A series born into an active cycle gets its kernel now; the
            // cycle's filter sees it at this, its activation time.
            for kind in CYCLE_KINDS {
                let state = self.cycles[kind.index()].state.lock();
                if let CycleState::Active { filter, .. } = &*state {
                    let admission = admit(filter, &got.series);
                    if admission.admitted {
                        got.series.install_kernel(kind, admission.value_filter);
                    }
                }
            }
        }

        Ok(got.series)
    }

    /// Looks up or lazily creates the series, then tracks `value` into it.
    pub fn track(
        &self,
        metric_id: &str,
        dimensions: &[(&str, &str)],
        value: f64,
    ) -> Result<(), MetricError> {
        let series = self.get_or_create_series(metric_id, dimensions, None)?;
        series.track(value);
        Ok(())
    }

    /// Like [`Manager::track`] but surfaces refusals as `false` instead of
    /// an error. No series is created when a cap refuses the fingerprint.
    pub fn try_track(&self, metric_id: &str, dimensions: &[(&str, &str)], value: f64) -> bool {
        match self.track(metric_id, dimensions, value) {
            Ok(()) => true,
            Err(e) => {
                if e.is_capacity() {
                    debug!(metric_id, error = %e, "value dropped by capacity cap");
                } else {
                    warn!(metric_id, error = %e, "value dropped");
                }
                false
            }
        }
    }

    /// Tracks a value against a zero-dimension metric.
    pub fn track_value(&self, metric_id: &str, value: f64) -> Result<(), MetricError> {
        self.track(metric_id, &[], value)
    }

    /// Starts `cycle` at `now`, or closes its current window and opens a new
    /// one.
    ///
    /// Starting an inactive cycle arms a kernel on every admitted series and
    /// returns an empty summary. Cycling an active one snapshots the window
    /// `[started, now)` on every series, re-arms kernels under the new
    /// filter, and returns the snapshots. Aggregates are returned to the
    /// caller and never pushed to the sink; use [`Manager::flush`] for that.
    pub fn start_or_cycle(
        &self,
        cycle: CycleKind,
        now: DateTime<FixedOffset>,
        filter: Option<Arc<dyn CycleFilter>>,
    ) -> AggregationSummary {
        let mut state = self.cycles[cycle.index()].state.lock();

        let summary = match &*state {
            CycleState::Inactive => {
                for series in self.directory.all_series() {
                    let admission = admit(&filter, &series);
                    if admission.admitted {
                        series.install_kernel(cycle, admission.value_filter);
                    }
                }
                info!(cycle = cycle.as_str(), "aggregation cycle started");
                AggregationSummary::default()
            }
            CycleState::Active { started, .. } => {
                let period_start = *started;
                let mut summary = AggregationSummary::default();
                for series in self.directory.all_series() {
                    let admission = admit(&filter, &series);
                    self.collect(&series, cycle, &admission, period_start, now, &mut summary);
                }
                debug!(
                    cycle = cycle.as_str(),
                    non_persistent = summary.non_persistent_aggregates.len(),
                    persistent = summary.persistent_aggregates.len(),
                    "aggregation cycle rotated",
                );
                summary
            }
        };

        *state = CycleState::Active {
            started: now,
            filter,
        };
        summary
    }

    /// Stops an auxiliary cycle at `now`, snapshotting the final window and
    /// removing its kernels from every series. Stopping an inactive cycle is
    /// a no-op with an empty summary. The default cycle cannot be stopped.
    pub fn stop_cycle(
        &self,
        cycle: CycleKind,
        now: DateTime<FixedOffset>,
    ) -> Result<AggregationSummary, MetricError> {
        if cycle == CycleKind::Default {
            return Err(MetricError::CycleAlwaysActive(cycle));
        }

        let mut state = self.cycles[cycle.index()].state.lock();
        let summary = match &*state {
            CycleState::Inactive => AggregationSummary::default(),
            CycleState::Active { started, .. } => {
                let period_start = *started;
                let mut summary = AggregationSummary::default();
                let deny = Admission::deny();
                for series in self.directory.all_series() {
                    self.collect(&series, cycle, &deny, period_start, now, &mut summary);
                }
                info!(
                    cycle = cycle.as_str(),
                    aggregates = summary.len(),
                    "aggregation cycle stopped",
                );
                summary
            }
        };

        *state = CycleState::Inactive;
        Ok(summary)
    }

    /// Forces a default-cycle boundary at `now` and hands every snapshot to
    /// the sink. Auxiliary cycles are unaffected.
    pub fn flush(&self, now: DateTime<FixedOffset>) {
        let summary = self.start_or_cycle(CycleKind::Default, now, None);
        let total = summary.len();

        if let Some(sink) = &self.sink {
            for aggregate in summary.into_aggregates() {
                self.export(sink, &aggregate);
            }
        }

        debug!(aggregates = total, "default cycle flushed");
    }

    fn export(&self, sink: &Arc<dyn Sink>, aggregate: &Aggregate) {
        let record = MetricRecord::from_aggregate(aggregate);
        if let Err(e) = sink.export(record) {
            warn!(
                sink = sink.name(),
                metric_id = %aggregate.metric_id,
                error = %e,
                "aggregate export failed, dropping",
            );
        }
    }

    fn collect(
        &self,
        series: &Arc<Series>,
        cycle: CycleKind,
        admission: &Admission,
        period_start: DateTime<FixedOffset>,
        period_end: DateTime<FixedOffset>,
        summary: &mut AggregationSummary,
    ) {
        if let Some(aggregate) = series.rotate_slot(cycle, admission, period_start, period_end) {
            match series.kind() {
                KernelKind::Measurement => summary.non_persistent_aggregates.push(aggregate),
                KernelKind::Accumulator => summary.persistent_aggregates.push(aggregate),
            }
        }
    }

    /// Spawns a task that flushes the default cycle on the configured
    /// interval until `cancel` fires, then performs a final flush.
    pub fn spawn_default_driver(
        self: &Arc<Self>,
        cancel: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        let manager = Arc::clone(self);
        let interval = self.config.window_interval;

        info!(interval = ?interval, "default cycle driver started");

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // Consume the immediate first tick.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        manager.flush(Utc::now().fixed_offset());
                        debug!("default cycle driver stopped");
                        return;
                    }
                    _ = ticker.tick() => {
                        manager.flush(Utc::now().fixed_offset());
                    }
                }
            }
        })
    }
}

fn admit(filter: &Option<Arc<dyn CycleFilter>>, series: &Arc<Series>) -> Admission {
    match filter {
        None => Admission::allow(),
        Some(f) => f.admit(series),
    }
}

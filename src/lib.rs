//! Client-side metric pre-aggregation over fixed time windows.
//!
//! Applications track numeric values against named, optionally
//! multi-dimensional metrics; the engine aggregates them in memory and, at
//! each window boundary (nominally one minute), emits one compact aggregate
//! per series to a downstream sink.
//!
//! Two aggregation kinds are built in: **measurements** summarize one window
//! (count, sum, min, max, stddev) and reset at every boundary; **running
//! accumulators** carry their totals across boundaries until explicitly
//! reset. Alongside the always-on default cycle, two auxiliary cycles can be
//! started, cycled, and stopped at caller-supplied virtual timestamps.
//!
//! ```
//! use std::sync::Arc;
//!
//! use chrono::Utc;
//! use minutely::{Manager, ManagerConfig, MemorySink};
//!
//! let sink = Arc::new(MemorySink::new());
//! let manager = Manager::with_sink(ManagerConfig::default(), sink.clone());
//!
//! assert!(manager.try_track("ducks_sold", &[("color", "purple")], 42.0));
//!
//! manager.flush(Utc::now().fixed_offset());
//! let records = sink.drain();
//! assert_eq!(records.len(), 1);
//! assert_eq!(records[0].sum, 42.0);
//! ```

pub mod config;
pub mod context;
pub mod cycle;
pub mod directory;
pub mod error;
pub mod kernel;
pub mod manager;
pub mod series;
pub mod sink;

pub use config::{
    default_config_for, set_default_accumulator_config, set_default_measurement_config,
    ManagerConfig, MetricConfiguration, DEFAULT_SERIES_COUNT_LIMIT,
    DEFAULT_VALUES_PER_DIMENSION_LIMIT,
};
pub use context::{
    copy_context, dimension_names, set_context_bridge, ContextBridge, DirectContextBridge,
    TelemetryContext,
};
pub use cycle::{Admission, AggregationSummary, CycleFilter, CycleKind, ValueFilter};
pub use directory::SeriesDirectory;
pub use error::MetricError;
pub use kernel::{Aggregate, AggregateData, KernelKind};
pub use manager::Manager;
pub use series::Series;
pub use sink::{MemorySink, MetricRecord, Sink, AGGREGATION_INTERVAL_PROPERTY};

//! Downstream sink interface and the wire shape of flushed aggregates.
//!
//! The default cycle hands each aggregate to the configured [`Sink`] as a
//! [`MetricRecord`]; auxiliary cycles return their aggregates to the caller
//! and never touch the sink.

use std::collections::HashMap;

use anyhow::Result;
use chrono::{DateTime, FixedOffset};
use parking_lot::Mutex;

use crate::context::dimension_names;
use crate::kernel::Aggregate;

/// Reserved property carrying the aggregation period in whole milliseconds.
pub const AGGREGATION_INTERVAL_PROPERTY: &str = "_MS.AggregationIntervalMs";

/// One serialized aggregate, shaped as metric telemetry.
///
/// Accumulator aggregates surface through the same fields as measurements:
/// count is the number of contributing track calls and stddev is 0 because
/// an accumulator carries no second moment.
#[derive(Debug, Clone)]
pub struct MetricRecord {
    pub name: String,
    pub count: u64,
    pub sum: f64,
    pub min: f64,
    pub max: f64,
    pub stddev: f64,
    /// Start of the aggregation period, caller offset preserved.
    pub period_start: DateTime<FixedOffset>,
    /// Advisory flag from the series configuration.
    pub restrict_to_nonnegative_integers: bool,
    /// Dimension map plus the aggregation-interval property.
    pub properties: HashMap<String, String>,
    /// Values of `TelemetryContext.`-prefixed dimensions.
    pub context_tags: HashMap<String, String>,
}

impl MetricRecord {
    /// Serializes an aggregate.
    ///
    /// Dimensions with the reserved context prefix are routed into
    /// `context_tags`; the rest become properties alongside the interval.
    /// Non-finite payload fields are scrubbed to 0 so a sink never sees NaN.
    pub fn from_aggregate(aggregate: &Aggregate) -> Self {
        let mut properties = HashMap::with_capacity(aggregate.dimensions.len() + 1);
        let mut context_tags = HashMap::new();

        for (name, value) in &aggregate.dimensions {
            if dimension_names::is_context_dimension(name) {
                context_tags.insert(name.clone(), value.clone());
            } else {
                properties.insert(name.clone(), value.clone());
            }
        }
        properties.insert(
            AGGREGATION_INTERVAL_PROPERTY.to_string(),
            aggregate.period.as_millis().to_string(),
        );

        let data = &aggregate.data;
        Self {
            name: aggregate.metric_id.to_string(),
            count: data.count(),
            sum: finite_or_zero(data.sum()),
            min: finite_or_zero(data.min()),
            max: finite_or_zero(data.max()),
            stddev: finite_or_zero(data.stddev()),
            period_start: aggregate.period_start,
            restrict_to_nonnegative_integers: aggregate.restrict_to_nonnegative_integers,
            properties,
            context_tags,
        }
    }
}

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

/// Accepts serialized aggregates and enqueues them for export.
pub trait Sink: Send + Sync {
    /// Returns the sink's name for logging.
    fn name(&self) -> &str;

    /// Enqueues one record. Must not block on I/O.
    fn export(&self, record: MetricRecord) -> Result<()>;
}

/// Sink that keeps records in memory, for tests and demos.
#[derive(Default)]
pub struct MemorySink {
    records: Mutex<Vec<MetricRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copies out everything exported so far.
    pub fn records(&self) -> Vec<MetricRecord> {
        self.records.lock().clone()
    }

    /// Moves out everything exported so far.
    pub fn drain(&self) -> Vec<MetricRecord> {
        std::mem::take(&mut *self.records.lock())
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl Sink for MemorySink {
    fn name(&self) -> &str {
        "memory"
    }

    fn export(&self, record: MetricRecord) -> Result<()> {
        self.records.lock().push(record);
        Ok(())
    }
}

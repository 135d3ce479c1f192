//! Aggregation kernels: the per-series state that absorbs tracked values.
//!
//! Two kinds exist. A [`MeasurementKernel`](measurement::MeasurementKernel)
//! summarizes one window (count, sum, min, max, stddev) and is replaced at
//! every window boundary. An [`AccumulatorKernel`](accumulator::AccumulatorKernel)
//! keeps a running total and survives boundaries until explicitly reset.
//! All kernel operations are atomic and safe for concurrent use.

pub mod accumulator;
pub mod measurement;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, FixedOffset};
use serde::Deserialize;

use self::accumulator::AccumulatorKernel;
use self::measurement::MeasurementKernel;

/// The two built-in aggregation semantics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KernelKind {
    /// Window summary statistics, reset at every boundary.
    #[default]
    Measurement,
    /// Running totals, carried across boundaries.
    Accumulator,
}

impl KernelKind {
    /// Returns the kind moniker carried on emitted aggregates.
    pub fn as_str(self) -> &'static str {
        match self {
            KernelKind::Measurement => "Measurement",
            KernelKind::Accumulator => "Accumulator",
        }
    }
}

/// Immutable snapshot of one series over one aggregation period.
#[derive(Debug, Clone)]
pub struct Aggregate {
    /// Metric this series belongs to.
    pub metric_id: Arc<str>,
    /// Dimension name to value, positional order per the metric schema.
    pub dimensions: HashMap<String, String>,
    /// Start of the aggregation period, caller offset preserved.
    pub period_start: DateTime<FixedOffset>,
    /// Length of the aggregation period.
    pub period: Duration,
    /// Advisory flag from the series configuration, passed through to sinks.
    pub restrict_to_nonnegative_integers: bool,
    /// Typed payload.
    pub data: AggregateData,
}

/// Typed aggregate payload, one variant per kernel kind.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AggregateData {
    Measurement {
        count: u64,
        sum: f64,
        min: f64,
        max: f64,
        stddev: f64,
    },
    Accumulator {
        sum: f64,
        min: f64,
        max: f64,
        /// Number of contributing track calls since the last reset.
        count: u64,
    },
}

impl AggregateData {
    pub fn kind(&self) -> KernelKind {
        match self {
            AggregateData::Measurement { .. } => KernelKind::Measurement,
            AggregateData::Accumulator { .. } => KernelKind::Accumulator,
        }
    }

    pub fn count(&self) -> u64 {
        match *self {
            AggregateData::Measurement { count, .. } => count,
            AggregateData::Accumulator { count, .. } => count,
        }
    }

    pub fn sum(&self) -> f64 {
        match *self {
            AggregateData::Measurement { sum, .. } => sum,
            AggregateData::Accumulator { sum, .. } => sum,
        }
    }

    pub fn min(&self) -> f64 {
        match *self {
            AggregateData::Measurement { min, .. } => min,
            AggregateData::Accumulator { min, .. } => min,
        }
    }

    pub fn max(&self) -> f64 {
        match *self {
            AggregateData::Measurement { max, .. } => max,
            AggregateData::Accumulator { max, .. } => max,
        }
    }

    /// Standard deviation; an accumulator carries no second moment, so 0.
    pub fn stddev(&self) -> f64 {
        match *self {
            AggregateData::Measurement { stddev, .. } => stddev,
            AggregateData::Accumulator { .. } => 0.0,
        }
    }
}

/// Clamps a tracked value to a concrete finite number.
///
/// NaN becomes 0.0; values beyond the representable range collapse to
/// the nearest representable bound. Applied once per track at the kernel
/// boundary.
pub(crate) fn clamp_value(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else if value == f64::INFINITY {
        f64::MAX
    } else if value == f64::NEG_INFINITY {
        f64::MIN
    } else {
        value
    }
}

/// An `f64` updated through atomic bit operations.
///
/// Additions and min/max run as CAS loops over the raw bits. NaN must not
/// enter (tracked values are clamped first), so the float comparisons in
/// the loops are total for the values that occur.
pub(crate) struct AtomicF64 {
    bits: AtomicU64,
}

impl AtomicF64 {
    pub fn new(value: f64) -> Self {
        Self {
            bits: AtomicU64::new(value.to_bits()),
        }
    }

    pub fn load(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Relaxed))
    }

    pub fn store(&self, value: f64) {
        self.bits.store(value.to_bits(), Ordering::Relaxed);
    }

    /// Adds `value` via a CAS loop.
    pub fn add(&self, value: f64) {
        loop {
            let old_bits = self.bits.load(Ordering::Relaxed);
            let new_bits = (f64::from_bits(old_bits) + value).to_bits();
            if self
                .bits
                .compare_exchange_weak(old_bits, new_bits, Ordering::Relaxed, Ordering::Relaxed)
                .is_ok()
            {
                break;
            }
        }
    }

    /// Lowers the stored value to `value` if it is smaller.
    pub fn fetch_min(&self, value: f64) {
        loop {
            let old_bits = self.bits.load(Ordering::Relaxed);
            if value >= f64::from_bits(old_bits) {
                break;
            }
            if self
                .bits
                .compare_exchange_weak(
                    old_bits,
                    value.to_bits(),
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                )
                .is_ok()
            {
                break;
            }
        }
    }

    /// Raises the stored value to `value` if it is larger.
    pub fn fetch_max(&self, value: f64) {
        loop {
            let old_bits = self.bits.load(Ordering::Relaxed);
            if value <= f64::from_bits(old_bits) {
                break;
            }
            if self
                .bits
                .compare_exchange_weak(
                    old_bits,
                    value.to_bits(),
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                )
                .is_ok()
            {
                break;
            }
        }
    }
}

/// A live kernel of either kind, dispatching to the variant state.
pub enum Kernel {
    Measurement(MeasurementKernel),
    Accumulator(AccumulatorKernel),
}

impl Kernel {
    pub fn new(kind: KernelKind) -> Self {
        match kind {
            KernelKind::Measurement => Kernel::Measurement(MeasurementKernel::new()),
            KernelKind::Accumulator => Kernel::Accumulator(AccumulatorKernel::new()),
        }
    }

    pub fn kind(&self) -> KernelKind {
        match self {
            Kernel::Measurement(_) => KernelKind::Measurement,
            Kernel::Accumulator(_) => KernelKind::Accumulator,
        }
    }

    /// Absorbs one value.
    pub fn track(&self, value: f64) {
        match self {
            Kernel::Measurement(k) => k.track(value),
            Kernel::Accumulator(k) => k.track(value),
        }
    }

    /// Returns the kernel to its identity state.
    pub fn reset(&self) {
        match self {
            Kernel::Measurement(k) => k.reset(),
            Kernel::Accumulator(k) => k.reset(),
        }
    }

    /// Produces a point-in-time payload snapshot.
    pub fn snapshot(&self) -> AggregateData {
        match self {
            Kernel::Measurement(k) => k.snapshot(),
            Kernel::Accumulator(k) => k.snapshot(),
        }
    }

    /// Whether the kernel has been tracked into or reset since creation.
    ///
    /// Gates persistent-aggregate emission: an untouched accumulator stays
    /// silent, a reset one keeps reporting zeros.
    pub fn touched(&self) -> bool {
        match self {
            Kernel::Measurement(k) => k.snapshot().count() > 0,
            Kernel::Accumulator(k) => k.touched(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_passes_finite_values() {
        assert_eq!(clamp_value(0.0), 0.0);
        assert_eq!(clamp_value(-273.15), -273.15);
        assert_eq!(clamp_value(f64::MAX), f64::MAX);
        assert_eq!(clamp_value(f64::MIN), f64::MIN);
    }

    #[test]
    fn test_clamp_nan_to_zero() {
        assert_eq!(clamp_value(f64::NAN), 0.0);
    }

    #[test]
    fn test_clamp_infinities_to_bounds() {
        assert_eq!(clamp_value(f64::INFINITY), f64::MAX);
        assert_eq!(clamp_value(f64::NEG_INFINITY), f64::MIN);
    }

    #[test]
    fn test_atomic_f64_add() {
        let v = AtomicF64::new(0.0);
        v.add(1.5);
        v.add(2.5);
        v.add(-1.0);
        assert_eq!(v.load(), 3.0);
    }

    #[test]
    fn test_atomic_f64_min_max() {
        let min = AtomicF64::new(f64::INFINITY);
        let max = AtomicF64::new(f64::NEG_INFINITY);
        for v in [3.0, -7.0, 12.0, 0.5] {
            min.fetch_min(v);
            max.fetch_max(v);
        }
        assert_eq!(min.load(), -7.0);
        assert_eq!(max.load(), 12.0);
    }

    #[test]
    fn test_kernel_kind_moniker() {
        assert_eq!(KernelKind::Measurement.as_str(), "Measurement");
        assert_eq!(KernelKind::Accumulator.as_str(), "Accumulator");
    }

    #[test]
    fn test_accumulator_data_has_zero_stddev() {
        let data = AggregateData::Accumulator {
            sum: 10.0,
            min: 1.0,
            max: 9.0,
            count: 2,
        };
        assert_eq!(data.stddev(), 0.0);
        assert_eq!(data.kind(), KernelKind::Accumulator);
    }

    #[test]
    fn test_atomic_f64_concurrent_add() {
        use std::sync::Arc;
        use std::thread;

        let v = Arc::new(AtomicF64::new(0.0));
        let mut handles = Vec::new();

        for _ in 0..4 {
            let v = Arc::clone(&v);
            handles.push(thread::spawn(move || {
                for _ in 0..1000 {
                    v.add(1.0);
                }
            }));
        }

        for h in handles {
            h.join().expect("thread panicked");
        }

        assert_eq!(v.load(), 4000.0);
    }
}

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use super::{clamp_value, AggregateData, AtomicF64};

/// Running-accumulator kernel.
///
/// Keeps a cumulative sum, min, max, and contributing-call count. Unlike a
/// measurement kernel it is never replaced at window boundaries: boundary
/// snapshots read the live state in place and the totals carry forward until
/// an explicit reset. All operations are atomic and safe for concurrent use.
pub struct AccumulatorKernel {
    sum: AtomicF64,
    min: AtomicF64,
    max: AtomicF64,
    count: AtomicU64,
    /// Set once track or reset has been called; gates emission so an
    /// accumulator that was installed but never used stays silent while a
    /// reset one keeps reporting zeros.
    touched: AtomicBool,
}

impl AccumulatorKernel {
    /// Creates a kernel in its identity state.
    pub fn new() -> Self {
        Self {
            sum: AtomicF64::new(0.0),
            min: AtomicF64::new(f64::INFINITY),
            max: AtomicF64::new(f64::NEG_INFINITY),
            count: AtomicU64::new(0),
            touched: AtomicBool::new(false),
        }
    }

    /// Records a value after clamping it to a finite number.
    pub fn track(&self, value: f64) {
        let v = clamp_value(value);
        self.touched.store(true, Ordering::Relaxed);
        self.sum.add(v);
        self.min.fetch_min(v);
        self.max.fetch_max(v);
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns a point-in-time snapshot of the running totals.
    pub fn snapshot(&self) -> AggregateData {
        let count = self.count.load(Ordering::Relaxed);
        let (min, max) = if count == 0 {
            (0.0, 0.0)
        } else {
            (self.min.load(), self.max.load())
        };

        AggregateData::Accumulator {
            sum: self.sum.load(),
            min,
            max,
            count,
        }
    }

    /// Returns the totals to their identity state. The kernel stays touched.
    pub fn reset(&self) {
        self.touched.store(true, Ordering::Relaxed);
        self.sum.store(0.0);
        self.min.store(f64::INFINITY);
        self.max.store(f64::NEG_INFINITY);
        self.count.store(0, Ordering::Relaxed);
    }

    /// Whether track or reset has ever been called on this kernel.
    pub fn touched(&self) -> bool {
        self.touched.load(Ordering::Relaxed)
    }
}

impl Default for AccumulatorKernel {
    fn default() -> Self {
        Self::new()
    }
}

use std::sync::atomic::{AtomicU64, Ordering};

use super::{clamp_value, AggregateData, AtomicF64};

/// Window summary statistics kernel.
///
/// Tracks count, sum, sum of squares, min, and max; the snapshot derives the
/// standard deviation from the two moments. Replaced with a fresh kernel at
/// every window boundary. All operations are atomic and safe for concurrent
/// use; a snapshot may observe a non-atomic cut across fields, which is
/// acceptable for statistical summaries.
pub struct MeasurementKernel {
    count: AtomicU64,
    sum: AtomicF64,
    sum_of_squares: AtomicF64,
    min: AtomicF64,
    max: AtomicF64,
}

impl MeasurementKernel {
    /// Creates a kernel in its identity state.
    pub fn new() -> Self {
        Self {
            count: AtomicU64::new(0),
            sum: AtomicF64::new(0.0),
            sum_of_squares: AtomicF64::new(0.0),
            min: AtomicF64::new(f64::INFINITY),
            max: AtomicF64::new(f64::NEG_INFINITY),
        }
    }

    /// Records a value after clamping it to a finite number.
    pub fn track(&self, value: f64) {
        let v = clamp_value(value);
        self.count.fetch_add(1, Ordering::Relaxed);
        self.sum.add(v);
        self.sum_of_squares.add(v * v);
        self.min.fetch_min(v);
        self.max.fetch_max(v);
    }

    /// Returns a point-in-time snapshot of the window statistics.
    pub fn snapshot(&self) -> AggregateData {
        let count = self.count.load(Ordering::Relaxed);
        if count == 0 {
            return AggregateData::Measurement {
                count: 0,
                sum: 0.0,
                min: 0.0,
                max: 0.0,
                stddev: 0.0,
            };
        }

        let sum = self.sum.load();
        let mean = sum / count as f64;
        // The floor absorbs catastrophic cancellation in the two-moment form.
        let variance = (self.sum_of_squares.load() / count as f64 - mean * mean).max(0.0);

        AggregateData::Measurement {
            count,
            sum,
            min: self.min.load(),
            max: self.max.load(),
            stddev: variance.sqrt(),
        }
    }

    /// Returns the kernel to its identity state.
    pub fn reset(&self) {
        self.count.store(0, Ordering::Relaxed);
        self.sum.store(0.0);
        self.sum_of_squares.store(0.0);
        self.min.store(f64::INFINITY);
        self.max.store(f64::NEG_INFINITY);
    }
}

impl Default for MeasurementKernel {
    fn default() -> Self {
        Self::new()
    }
}

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use serde::Deserialize;

use crate::error::MetricError;
use crate::kernel::KernelKind;

/// Default cap on total series per metric.
pub const DEFAULT_SERIES_COUNT_LIMIT: usize = 1000;

/// Default cap on distinct values observed at one dimension position.
pub const DEFAULT_VALUES_PER_DIMENSION_LIMIT: usize = 100;

fn default_series_count_limit() -> usize {
    DEFAULT_SERIES_COUNT_LIMIT
}

fn default_values_per_dimension_limit() -> usize {
    DEFAULT_VALUES_PER_DIMENSION_LIMIT
}

fn default_window_interval() -> Duration {
    Duration::from_secs(60)
}

/// Per-metric configuration, frozen at first registration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MetricConfiguration {
    /// Max total series the directory will create for the metric. Default: 1000.
    #[serde(default = "default_series_count_limit")]
    pub series_count_limit: usize,

    /// Max distinct values observed per dimension position. Default: 100.
    #[serde(default = "default_values_per_dimension_limit")]
    pub values_per_dimension_limit: usize,

    /// Aggregation kind for every series of the metric.
    #[serde(default)]
    pub kind: KernelKind,

    /// Advisory flag passed through to the sink; storage stays f64.
    #[serde(default)]
    pub restrict_to_nonnegative_integers: bool,
}

impl MetricConfiguration {
    /// Default window-summary configuration.
    pub fn measurement() -> Self {
        Self {
            series_count_limit: DEFAULT_SERIES_COUNT_LIMIT,
            values_per_dimension_limit: DEFAULT_VALUES_PER_DIMENSION_LIMIT,
            kind: KernelKind::Measurement,
            restrict_to_nonnegative_integers: false,
        }
    }

    /// Default running-accumulator configuration.
    pub fn accumulator() -> Self {
        Self {
            kind: KernelKind::Accumulator,
            ..Self::measurement()
        }
    }

    /// Validates the limits (both must be at least 1).
    pub fn validate(&self) -> Result<(), MetricError> {
        if self.series_count_limit < 1 {
            return Err(MetricError::InvalidConfiguration {
                reason: "series_count_limit must be at least 1".into(),
            });
        }
        if self.values_per_dimension_limit < 1 {
            return Err(MetricError::InvalidConfiguration {
                reason: "values_per_dimension_limit must be at least 1".into(),
            });
        }
        Ok(())
    }
}

impl Default for MetricConfiguration {
    fn default() -> Self {
        Self::measurement()
    }
}

/// Manager-level configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ManagerConfig {
    /// Default-cycle window length used by the background driver. Default: 60s.
    #[serde(default = "default_window_interval", with = "humantime_serde")]
    pub window_interval: Duration,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            window_interval: default_window_interval(),
        }
    }
}

// Process-wide default configurations. Published through an atomic handle so
// readers never tear; an override applies only to metrics registered after it.
static DEFAULT_MEASUREMENT: ArcSwapOption<MetricConfiguration> = ArcSwapOption::const_empty();
static DEFAULT_ACCUMULATOR: ArcSwapOption<MetricConfiguration> = ArcSwapOption::const_empty();

/// Replaces the process-wide default measurement configuration.
pub fn set_default_measurement_config(config: MetricConfiguration) -> Result<(), MetricError> {
    config.validate()?;
    if config.kind != KernelKind::Measurement {
        return Err(MetricError::InvalidConfiguration {
            reason: "default measurement configuration must have measurement kind".into(),
        });
    }
    DEFAULT_MEASUREMENT.store(Some(Arc::new(config)));
    Ok(())
}

/// Replaces the process-wide default accumulator configuration.
pub fn set_default_accumulator_config(config: MetricConfiguration) -> Result<(), MetricError> {
    config.validate()?;
    if config.kind != KernelKind::Accumulator {
        return Err(MetricError::InvalidConfiguration {
            reason: "default accumulator configuration must have accumulator kind".into(),
        });
    }
    DEFAULT_ACCUMULATOR.store(Some(Arc::new(config)));
    Ok(())
}

/// Returns the current process-wide default for `kind`.
pub fn default_config_for(kind: KernelKind) -> Arc<MetricConfiguration> {
    let slot = match kind {
        KernelKind::Measurement => &DEFAULT_MEASUREMENT,
        KernelKind::Accumulator => &DEFAULT_ACCUMULATOR,
    };
    slot.load_full().unwrap_or_else(|| {
        Arc::new(match kind {
            KernelKind::Measurement => MetricConfiguration::measurement(),
            KernelKind::Accumulator => MetricConfiguration::accumulator(),
        })
    })
}

//! The series directory: a per-manager registry mapping `(metric id,
//! ordered dimension values)` fingerprints to canonical series.
//!
//! Each metric gets a schema frozen at first registration (dimension names,
//! configuration, kernel kind). Lookups take a shared lock; the miss path
//! re-checks under the exclusive lock before enforcing the series-count and
//! per-dimension distinct-value caps. Nothing is committed when a capacity
//! check fails.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;

use crate::config::{default_config_for, MetricConfiguration};
use crate::error::MetricError;
use crate::kernel::KernelKind;
use crate::series::Series;

/// Result of a fingerprint lookup-or-insert.
#[derive(Debug)]
pub(crate) struct GetOrCreate {
    pub series: Arc<Series>,
    /// True when this call created the series.
    pub created: bool,
}

/// Frozen per-metric schema plus the series table it guards.
struct MetricEntry {
    metric_id: Arc<str>,
    dimension_names: Arc<[String]>,
    config: Arc<MetricConfiguration>,
    table: RwLock<SeriesTable>,
}

#[derive(Default)]
struct SeriesTable {
    series: HashMap<Box<[String]>, Arc<Series>>,
    /// Distinct values ever observed, one set per dimension position.
    values_seen: Vec<HashSet<String>>,
}

/// Concurrent, capacity-bounded registry of series.
pub struct SeriesDirectory {
    metrics: DashMap<Arc<str>, Arc<MetricEntry>>,
    total_series: AtomicUsize,
}

impl Default for SeriesDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl SeriesDirectory {
    pub fn new() -> Self {
        Self {
            metrics: DashMap::new(),
            total_series: AtomicUsize::new(0),
        }
    }

    /// Returns the canonical series for the fingerprint, creating it if the
    /// metric's caps allow.
    ///
    /// `dimensions` are positional `(name, value)` pairs; the names declare
    /// the schema on first registration and only the arity is checked
    /// afterwards. A `None` configuration matches any existing schema and
    /// falls back to the process-wide measurement default for a new one.
    pub(crate) fn get_or_create(
        &self,
        metric_id: &str,
        dimensions: &[(&str, &str)],
        config: Option<&MetricConfiguration>,
    ) -> Result<GetOrCreate, MetricError> {
        if metric_id.trim().is_empty() {
            return Err(MetricError::EmptyMetricId);
        }
        for (position, (name, value)) in dimensions.iter().enumerate() {
            if name.trim().is_empty() {
                return Err(MetricError::EmptyDimensionName {
                    metric_id: metric_id.to_string(),
                    position,
                });
            }
            if value.trim().is_empty() {
                return Err(MetricError::EmptyDimensionValue {
                    metric_id: metric_id.to_string(),
                    position,
                });
            }
        }
        if let Some(cfg) = config {
            cfg.validate()?;
        }

        let entry = self.metric_entry(metric_id, dimensions, config)?;

        if dimensions.len() != entry.dimension_names.len() {
            return Err(MetricError::DimensionArityMismatch {
                metric_id: metric_id.to_string(),
                declared: entry.dimension_names.len(),
                supplied: dimensions.len(),
            });
        }
        if let Some(cfg) = config {
            if *cfg != *entry.config {
                return Err(MetricError::ConfigurationMismatch {
                    metric_id: metric_id.to_string(),
                });
            }
        }

        let values: Vec<String> = dimensions.iter().map(|(_, v)| v.to_string()).collect();

        // Fast path: shared lock.
        {
            let table = entry.table.read();
            if let Some(series) = table.series.get(values.as_slice()) {
                return Ok(GetOrCreate {
                    series: Arc::clone(series),
                    created: false,
                });
            }
        }

        // Miss: exclusive lock with a re-check, then capacity checks in
        // order. No state is committed unless every check passes.
        let mut table = entry.table.write();
        if let Some(series) = table.series.get(values.as_slice()) {
            return Ok(GetOrCreate {
                series: Arc::clone(series),
                created: false,
            });
        }

        if table.series.len() >= entry.config.series_count_limit {
            return Err(MetricError::SeriesCapacityExceeded {
                metric_id: metric_id.to_string(),
                limit: entry.config.series_count_limit,
            });
        }
        for (position, value) in values.iter().enumerate() {
            let seen = &table.values_seen[position];
            if !seen.contains(value) && seen.len() >= entry.config.values_per_dimension_limit {
                return Err(MetricError::DimensionCapacityExceeded {
                    metric_id: metric_id.to_string(),
                    position,
                    limit: entry.config.values_per_dimension_limit,
                });
            }
        }

        let owned_values: Box<[String]> = values.into_boxed_slice();
        for (position, value) in owned_values.iter().enumerate() {
            table.values_seen[position].insert(value.clone());
        }

        let series = Arc::new(Series::new(
            Arc::clone(&entry.metric_id),
            Arc::clone(&entry.dimension_names),
            owned_values.clone(),
            Arc::clone(&entry.config),
        ));
        table.series.insert(owned_values, Arc::clone(&series));
        self.total_series.fetch_add(1, Ordering::Relaxed);

        Ok(GetOrCreate {
            series,
            created: true,
        })
    }

    /// Every series of one metric, iteration order unspecified.
    pub fn metric_series(&self, metric_id: &str) -> Vec<Arc<Series>> {
        match self.metrics.get(metric_id) {
            Some(entry) => entry.table.read().series.values().cloned().collect(),
            None => Vec::new(),
        }
    }

    /// Every series in the directory, iteration order unspecified.
    pub fn all_series(&self) -> Vec<Arc<Series>> {
        let mut all = Vec::with_capacity(self.total_series_count());
        for entry in self.metrics.iter() {
            all.extend(entry.table.read().series.values().cloned());
        }
        all
    }

    /// Live series count for one metric.
    pub fn series_count(&self, metric_id: &str) -> usize {
        self.metrics
            .get(metric_id)
            .map(|entry| entry.table.read().series.len())
            .unwrap_or(0)
    }

    /// Live series count across all metrics.
    pub fn total_series_count(&self) -> usize {
        self.total_series.load(Ordering::Relaxed)
    }

    /// Distinct values ever observed at one dimension position.
    pub fn dimension_value_count(&self, metric_id: &str, position: usize) -> usize {
        self.metrics
            .get(metric_id)
            .and_then(|entry| entry.table.read().values_seen.get(position).map(HashSet::len))
            .unwrap_or(0)
    }

    /// Declared kernel kind of a registered metric.
    pub fn metric_kind(&self, metric_id: &str) -> Option<KernelKind> {
        self.metrics.get(metric_id).map(|entry| entry.config.kind)
    }

    /// Finds or installs the metric schema. A supplied configuration is used
    /// verbatim for a new schema; `None` falls back to the process default.
    fn metric_entry(
        &self,
        metric_id: &str,
        dimensions: &[(&str, &str)],
        config: Option<&MetricConfiguration>,
    ) -> Result<Arc<MetricEntry>, MetricError> {
        if let Some(entry) = self.metrics.get(metric_id) {
            return Ok(Arc::clone(&*entry));
        }

        let resolved: Arc<MetricConfiguration> = match config {
            Some(cfg) => Arc::new(cfg.clone()),
            None => default_config_for(KernelKind::Measurement),
        };
        let names: Arc<[String]> = dimensions
            .iter()
            .map(|(name, _)| name.to_string())
            .collect();

        let entry = self
            .metrics
            .entry(Arc::from(metric_id))
            .or_insert_with(|| {
                Arc::new(MetricEntry {
                    metric_id: Arc::from(metric_id),
                    dimension_names: Arc::clone(&names),
                    config: resolved,
                    table: RwLock::new(SeriesTable {
                        series: HashMap::new(),
                        values_seen: vec![HashSet::new(); names.len()],
                    }),
                })
            });
        Ok(Arc::clone(&*entry))
    }
}

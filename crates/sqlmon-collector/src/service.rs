//! Host-facing entry point.
//!
//! [`MetricService`] addresses metrics by namespace (`prefix + path
//! segments`), initializes the collector lazily on first use, and serializes
//! polls behind a mutex so a host may call it from any thread.

use crate::discovery::Catalog;
use crate::dispatch::{Clock, MetricCollector, SystemClock};
use crate::error::{CollectorError, Result};
use crate::StatsSource;
use sqlmon_common::types::{MetricDataPoint, MetricValue};
use std::sync::{Arc, Mutex, MutexGuard};

/// Opens a new stats source. Called on every initialization attempt.
pub type SourceFactory = Box<dyn Fn() -> anyhow::Result<Box<dyn StatsSource>> + Send + Sync>;

struct Initialized {
    collector: MetricCollector,
    catalog: Catalog,
}

pub struct MetricService {
    prefix: Vec<String>,
    source_name: String,
    use_engine: bool,
    factory: SourceFactory,
    clock: Arc<dyn Clock>,
    state: Mutex<Option<Initialized>>,
}

impl MetricService {
    pub fn new(
        prefix: Vec<String>,
        source_name: impl Into<String>,
        use_engine: bool,
        factory: SourceFactory,
    ) -> Self {
        Self {
            prefix,
            source_name: source_name.into(),
            use_engine,
            factory,
            clock: Arc::new(SystemClock),
            state: Mutex::new(None),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Namespace of a metric path: the prefix followed by its `/` segments.
    pub fn namespace(&self, path: &str) -> Vec<String> {
        self.prefix
            .iter()
            .cloned()
            .chain(path.split('/').map(str::to_string))
            .collect()
    }

    /// Metric path of a namespace, `None` if it lies outside the prefix.
    pub fn path(&self, namespace: &[String]) -> Option<String> {
        let rest = namespace.strip_prefix(self.prefix.as_slice())?;
        if rest.is_empty() {
            return None;
        }
        Some(rest.join("/"))
    }

    fn lock(&self) -> Result<MutexGuard<'_, Option<Initialized>>> {
        self.state.lock().map_err(|_| CollectorError::LockPoisoned)
    }

    /// Opens the source and runs discovery unless that already succeeded.
    /// A failed attempt closes the source and leaves the service
    /// uninitialized, so the next call tries again.
    fn ensure_initialized<'a>(
        &self,
        state: &'a mut Option<Initialized>,
    ) -> Result<&'a mut Initialized> {
        if state.is_none() {
            let source = (self.factory)().map_err(|e| CollectorError::Connect(format!("{e:#}")))?;
            let mut collector =
                MetricCollector::new(source, self.use_engine).with_clock(Arc::clone(&self.clock));

            let catalog = match collector.discover() {
                Ok(catalog) => catalog,
                Err(e) => {
                    if let Err(close_err) = collector.close() {
                        tracing::warn!(error = %close_err, "Failed to close source after discovery error");
                    }
                    return Err(e);
                }
            };

            tracing::info!(metrics = catalog.len(), "Metric catalog ready");
            *state = Some(Initialized { collector, catalog });
        }

        state
            .as_mut()
            .ok_or_else(|| CollectorError::Connect("initialization did not complete".to_string()))
    }

    /// Namespaces of every discovered metric, sorted.
    ///
    /// # Errors
    ///
    /// Returns the initialization error if the source cannot be opened or
    /// discovery fails.
    pub fn metric_types(&self) -> Result<Vec<Vec<String>>> {
        let mut state = self.lock()?;
        let init = self.ensure_initialized(&mut state)?;
        Ok(init
            .catalog
            .entries()
            .into_iter()
            .map(|entry| self.namespace(&entry.name))
            .collect())
    }

    /// Collects the requested metrics, one data point per namespace in
    /// request order. Metrics that are unknown or produced no value come
    /// back as [`MetricValue::Null`].
    ///
    /// # Errors
    ///
    /// Returns the initialization error, or the error of the first batch
    /// that could not be fetched.
    pub fn collect_metrics(&self, namespaces: &[Vec<String>]) -> Result<Vec<MetricDataPoint>> {
        if namespaces.is_empty() {
            return Ok(Vec::new());
        }

        let mut state = self.lock()?;
        let init = self.ensure_initialized(&mut state)?;

        let paths: Vec<Option<String>> = namespaces.iter().map(|ns| self.path(ns)).collect();
        let values = init
            .collector
            .collect_names(paths.iter().flatten().map(String::as_str), &init.catalog)?;

        let timestamp = self.clock.now();
        Ok(namespaces
            .iter()
            .zip(&paths)
            .map(|(namespace, path)| MetricDataPoint {
                namespace: namespace.clone(),
                value: path
                    .as_ref()
                    .and_then(|p| values.get(p).copied())
                    .unwrap_or(MetricValue::Null),
                source: self.source_name.clone(),
                timestamp,
            })
            .collect())
    }

    /// Closes the source. The next call initializes from scratch.
    ///
    /// # Errors
    ///
    /// Propagates the source's close error.
    pub fn close(&self) -> Result<()> {
        let mut state = self.lock()?;
        match state.take() {
            Some(mut init) => init.collector.close(),
            None => Ok(()),
        }
    }
}

use crate::discovery::{self, Catalog};
use crate::error::Result;
use crate::rate::RateEngine;
use crate::StatsSource;
use chrono::{DateTime, Utc};
use sqlmon_common::types::{BatchId, MetricValue};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

/// Source of observation timestamps.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Owns a stats source and the rate state derived from it.
///
/// Polls must be serialized: `collect` takes `&mut self`, and the
/// [`service::MetricService`](crate::service::MetricService) wraps the
/// collector in a mutex for hosts that call from several threads.
pub struct MetricCollector {
    source: Box<dyn StatsSource>,
    use_engine: bool,
    rates: RateEngine,
    clock: Arc<dyn Clock>,
}

impl MetricCollector {
    /// `use_engine` makes the engine-internals batch mandatory and adds the
    /// engine counters to the global batch.
    pub fn new(source: Box<dyn StatsSource>, use_engine: bool) -> Self {
        Self {
            source,
            use_engine,
            rates: RateEngine::new(),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn rates(&self) -> &RateEngine {
        &self.rates
    }

    /// Builds the metric catalog. See [`discovery::discover`].
    ///
    /// # Errors
    ///
    /// Returns an error when a mandatory batch cannot be fetched.
    pub fn discover(&mut self) -> Result<Catalog> {
        discovery::discover(self.source.as_mut(), self.use_engine)
    }

    /// Fetches exactly the requested batches and converts their samples.
    ///
    /// All or nothing: the first batch that cannot be fetched aborts the
    /// poll. Batches converted before the failure keep their updated rate
    /// state.
    ///
    /// # Errors
    ///
    /// Returns the error of the first batch that is unavailable or failed.
    pub fn collect(&mut self, batches: &BTreeSet<BatchId>) -> Result<HashMap<String, MetricValue>> {
        let mut values = HashMap::new();

        for &batch in batches {
            let stats = self.source.fetch(batch, self.use_engine).require(batch)?;
            let now = self.clock.now();
            tracing::debug!(batch = %batch, count = stats.len(), "Fetched batch");
            self.rates.update_into(&mut values, &stats, now);
        }

        Ok(values)
    }

    /// Resolves `names` through `catalog` and collects the batches they need.
    /// Names missing from the catalog do not select any batch.
    ///
    /// # Errors
    ///
    /// See [`MetricCollector::collect`].
    pub fn collect_names<'a, I>(&mut self, names: I, catalog: &Catalog) -> Result<HashMap<String, MetricValue>>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let batches = catalog.batches_for(names);
        self.collect(&batches)
    }

    /// Releases the stats source.
    ///
    /// # Errors
    ///
    /// Propagates the source's close error.
    pub fn close(&mut self) -> Result<()> {
        self.source.close()
    }
}

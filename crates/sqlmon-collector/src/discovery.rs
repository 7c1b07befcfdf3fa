use crate::error::Result;
use crate::{BatchResult, StatsSource};
use sqlmon_common::types::{BatchId, MetricEntry, Stats};
use std::collections::{BTreeSet, HashMap};

/// Name → batch mapping built once by [`discover`].
///
/// Read-only after construction, so it can be shared freely between polls.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entries: HashMap<String, BatchId>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records every name of `stats` under `batch`. Returns the names that
    /// were already mapped to another batch.
    fn absorb(&mut self, stats: &Stats, batch: BatchId) -> Vec<(String, BatchId)> {
        let mut collisions = Vec::new();
        for name in stats.keys() {
            if let Some(previous) = self.entries.insert(name.clone(), batch) {
                if previous != batch {
                    collisions.push((name.clone(), previous));
                }
            }
        }
        collisions
    }

    pub fn batch_of(&self, name: &str) -> Option<BatchId> {
        self.entries.get(name).copied()
    }

    /// Distinct batches needed to refresh `names`. Unknown names are skipped.
    pub fn batches_for<'a, I>(&self, names: I) -> BTreeSet<BatchId>
    where
        I: IntoIterator<Item = &'a str>,
    {
        names
            .into_iter()
            .filter_map(|name| self.batch_of(name))
            .collect()
    }

    /// Entries sorted by name.
    pub fn entries(&self) -> Vec<MetricEntry> {
        let mut entries: Vec<MetricEntry> = self
            .entries
            .iter()
            .map(|(name, batch)| MetricEntry {
                name: name.clone(),
                batch: *batch,
            })
            .collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Runs every batch once and returns the catalog of available metrics.
///
/// The global batch is mandatory, and so is the engine batch when
/// `include_engine` is set. The replication batches are optional: a server
/// that is not a primary or replica simply contributes no names for them.
///
/// A name produced by two batches maps to the later one (fetch order is
/// [`BatchId::ALL`]); the collision is logged.
///
/// # Errors
///
/// Returns the source error when a mandatory batch cannot be fetched.
pub fn discover(source: &mut dyn StatsSource, include_engine: bool) -> Result<Catalog> {
    let mut catalog = Catalog::new();

    for batch in BatchId::ALL {
        let mandatory = match batch {
            BatchId::Global => true,
            BatchId::Engine if include_engine => true,
            BatchId::Engine => continue,
            BatchId::Primary | BatchId::Replica => false,
        };

        let result = source.fetch(batch, include_engine);
        let stats = if mandatory {
            result.require(batch)?
        } else {
            match result {
                BatchResult::Fetched(stats) => stats,
                BatchResult::Unavailable(reason) => {
                    tracing::debug!(batch = %batch, reason = %reason, "Optional batch unavailable, skipped");
                    continue;
                }
                BatchResult::Failed(e) => {
                    tracing::debug!(batch = %batch, error = %e, "Optional batch failed, skipped");
                    continue;
                }
            }
        };

        for (name, previous) in catalog.absorb(&stats, batch) {
            tracing::warn!(
                metric = %name,
                previous = %previous,
                batch = %batch,
                "Metric produced by two batches, keeping the later one"
            );
        }
        tracing::info!(batch = %batch, count = stats.len(), "Discovered metrics");
    }

    Ok(catalog)
}

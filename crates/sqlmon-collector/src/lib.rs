//! Measurement engine for database status counters.
//!
//! A [`StatsSource`] supplies named, typed samples grouped into batches
//! (see [`BatchId`]). [`discovery::discover`] runs every batch once to build
//! the metric catalog, and [`dispatch::MetricCollector`] refreshes only the
//! batches a poll needs, feeding each through the [`rate::RateEngine`] so
//! counters and derives come out as per-second rates.

pub mod discovery;
pub mod dispatch;
pub mod error;
pub mod mapping;
pub mod mysql;
pub mod rate;
pub mod service;


use error::CollectorError;
use sqlmon_common::types::{BatchId, Stats};

/// Outcome of fetching one batch.
///
/// `Unavailable` is distinct from `Failed`: a replication role the server
/// is not configured for is absent, not broken. Discovery skips optional
/// batches in either case, while collection treats both as fatal.
#[derive(Debug)]
pub enum BatchResult {
    Fetched(Stats),
    Unavailable(String),
    Failed(CollectorError),
}

impl BatchResult {
    /// Collapses the outcome for a batch that must be present.
    ///
    /// # Errors
    ///
    /// Returns [`CollectorError::Unavailable`] or the source error.
    pub fn require(self, batch: BatchId) -> error::Result<Stats> {
        match self {
            BatchResult::Fetched(stats) => Ok(stats),
            BatchResult::Unavailable(reason) => Err(CollectorError::Unavailable { batch, reason }),
            BatchResult::Failed(err) => Err(err),
        }
    }
}

impl From<error::Result<Stats>> for BatchResult {
    fn from(value: error::Result<Stats>) -> Self {
        match value {
            Ok(stats) => BatchResult::Fetched(stats),
            Err(err) => BatchResult::Failed(err),
        }
    }
}

/// Supplies samples for each batch. Implemented on top of a live database
/// client; the core never talks SQL itself.
///
/// Calls are blocking. A source is owned by one collector and is never
/// called concurrently.
pub trait StatsSource: Send {
    /// Server-wide status. `include_engine` adds the engine counters that
    /// the status listing carries alongside the generic ones.
    fn global_status(&mut self, include_engine: bool) -> BatchResult;

    /// Storage-engine internals.
    fn engine_internals(&mut self) -> BatchResult;

    /// Replication-source role status.
    fn primary_status(&mut self) -> BatchResult;

    /// Replication-replica role status.
    fn replica_status(&mut self) -> BatchResult;

    /// Releases the underlying connection.
    ///
    /// # Errors
    ///
    /// Returns [`CollectorError::Close`] if the client fails to shut down.
    fn close(&mut self) -> error::Result<()>;

    /// Fetches `batch` through the matching method.
    fn fetch(&mut self, batch: BatchId, include_engine: bool) -> BatchResult {
        match batch {
            BatchId::Global => self.global_status(include_engine),
            BatchId::Engine => self.engine_internals(),
            BatchId::Primary => self.primary_status(),
            BatchId::Replica => self.replica_status(),
        }
    }
}

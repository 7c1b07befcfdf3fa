//! [`StatsSource`] for MySQL-compatible servers.
//!
//! The SQL client is abstracted behind [`StatusQuery`]; this module only
//! turns its result sets into batches.

use crate::error::{CollectorError, Result};
use crate::mapping::{self, Table};
use crate::{BatchResult, StatsSource};
use sqlmon_common::classify::RawValue;
use sqlmon_common::types::BatchId;

/// First server version exposing the engine metrics table.
const ENGINE_METRICS_MIN_VERSION: u32 = 50600;

/// Row-level access to a server's status statements.
///
/// Implementations own the connection and pick the statement that fits
/// the server version.
pub trait StatusQuery: Send {
    /// Server version string, e.g. `5.7.22-log`.
    fn server_version(&mut self) -> anyhow::Result<String>;

    /// `(Variable_name, Value)` rows of the global status listing.
    fn global_status(&mut self) -> anyhow::Result<Vec<(String, RawValue)>>;

    /// `(name, count)` rows of the enabled engine metrics.
    fn engine_metrics(&mut self) -> anyhow::Result<Vec<(String, RawValue)>>;

    /// Primary status result, `None` when the role is not configured.
    fn primary_status(&mut self) -> anyhow::Result<Option<Table>>;

    /// Replica status result, `None` when the role is not configured.
    fn replica_status(&mut self) -> anyhow::Result<Option<Table>>;

    fn close(&mut self) -> anyhow::Result<()>;
}

/// Parses a server version string into `major * 10000 + minor * 100 + patch`.
///
/// Anything after the first `-` is ignored, as are components that do not
/// start with a digit. A version that does not fit in `u32` parses as 0.
///
/// # Examples
///
/// ```
/// use sqlmon_collector::mysql::parse_version;
///
/// assert_eq!(parse_version("5.6.30-log"), 50630);
/// assert_eq!(parse_version(" 8.0.36 "), 80036);
/// assert_eq!(parse_version("10.4"), 100400);
/// assert_eq!(parse_version("garbage"), 0);
/// assert_eq!(parse_version("500000.1.1"), 0);
/// ```
pub fn parse_version(version: &str) -> u32 {
    let dotted = version.trim().split('-').next().unwrap_or_default();
    let mut parts = [0_u64; 3];

    for (slot, component) in parts.iter_mut().zip(dotted.split('.')) {
        let digits: String = component.chars().take_while(char::is_ascii_digit).collect();
        match digits.parse() {
            Ok(value) => *slot = value,
            Err(_) => break,
        }
    }

    parts[0]
        .checked_mul(10000)
        .and_then(|v| v.checked_add(parts[1].checked_mul(100)?))
        .and_then(|v| v.checked_add(parts[2]))
        .and_then(|v| u32::try_from(v).ok())
        .unwrap_or(0)
}

fn source_error(batch: BatchId, err: &anyhow::Error) -> CollectorError {
    CollectorError::Source {
        batch,
        message: format!("{err:#}"),
    }
}

/// Batches backed by a [`StatusQuery`].
pub struct MysqlStatsSource<Q> {
    query: Q,
    version: u32,
}

impl<Q: StatusQuery> MysqlStatsSource<Q> {
    /// Wraps `query`, reading the server version once.
    ///
    /// # Errors
    ///
    /// Returns [`CollectorError::Connect`] when the version cannot be read.
    pub fn new(mut query: Q) -> Result<Self> {
        let raw = query
            .server_version()
            .map_err(|e| CollectorError::Connect(format!("version request failed: {e:#}")))?;
        let version = parse_version(&raw);
        tracing::info!(version = %raw.trim(), numeric = version, "Connected to server");
        Ok(Self { query, version })
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn supports_engine_metrics(&self) -> bool {
        self.version >= ENGINE_METRICS_MIN_VERSION
    }
}

impl<Q: StatusQuery> StatsSource for MysqlStatsSource<Q> {
    fn global_status(&mut self, include_engine: bool) -> BatchResult {
        match self.query.global_status() {
            Ok(rows) => mapping::map_global_status(&rows, include_engine).into(),
            Err(e) => BatchResult::Failed(source_error(BatchId::Global, &e)),
        }
    }

    fn engine_internals(&mut self) -> BatchResult {
        if !self.supports_engine_metrics() {
            return BatchResult::Failed(CollectorError::Unsupported(format!(
                "engine metrics need server version {ENGINE_METRICS_MIN_VERSION} or later, found {}",
                self.version
            )));
        }
        match self.query.engine_metrics() {
            Ok(rows) => mapping::map_engine_metrics(&rows).into(),
            Err(e) => BatchResult::Failed(source_error(BatchId::Engine, &e)),
        }
    }

    fn primary_status(&mut self) -> BatchResult {
        let table = match self.query.primary_status() {
            Ok(Some(table)) => table,
            Ok(None) => return BatchResult::Unavailable("primary role not configured".to_string()),
            Err(e) => return BatchResult::Failed(source_error(BatchId::Primary, &e)),
        };
        match mapping::map_primary_status(&table) {
            Ok(Some(stats)) => BatchResult::Fetched(stats),
            Ok(None) => BatchResult::Unavailable("primary status returned 0 rows".to_string()),
            Err(e) => BatchResult::Failed(e),
        }
    }

    fn replica_status(&mut self) -> BatchResult {
        let table = match self.query.replica_status() {
            Ok(Some(table)) => table,
            Ok(None) => return BatchResult::Unavailable("replica role not configured".to_string()),
            Err(e) => return BatchResult::Failed(source_error(BatchId::Replica, &e)),
        };
        match mapping::map_replica_status(&table) {
            Ok(Some(stats)) => BatchResult::Fetched(stats),
            Ok(None) => BatchResult::Unavailable("replica status returned 0 rows".to_string()),
            Err(e) => BatchResult::Failed(e),
        }
    }

    fn close(&mut self) -> Result<()> {
        self.query
            .close()
            .map_err(|e| CollectorError::Close(format!("{e:#}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;

    struct FakeQuery {
        version: &'static str,
        global: Vec<(String, RawValue)>,
        replica: Option<Table>,
        fail_engine: bool,
        closed: bool,
    }

    impl FakeQuery {
        fn new(version: &'static str) -> Self {
            Self {
                version,
                global: vec![("Threads_running".to_string(), RawValue::Int(3))],
                replica: None,
                fail_engine: false,
                closed: false,
            }
        }
    }

    impl StatusQuery for FakeQuery {
        fn server_version(&mut self) -> anyhow::Result<String> {
            Ok(self.version.to_string())
        }

        fn global_status(&mut self) -> anyhow::Result<Vec<(String, RawValue)>> {
            Ok(self.global.clone())
        }

        fn engine_metrics(&mut self) -> anyhow::Result<Vec<(String, RawValue)>> {
            if self.fail_engine {
                bail!("connection reset");
            }
            Ok(vec![("dml_reads".to_string(), RawValue::Int(10))])
        }

        fn primary_status(&mut self) -> anyhow::Result<Option<Table>> {
            Ok(Some(Table::default()))
        }

        fn replica_status(&mut self) -> anyhow::Result<Option<Table>> {
            Ok(self.replica.clone())
        }

        fn close(&mut self) -> anyhow::Result<()> {
            self.closed = true;
            Ok(())
        }
    }

    #[test]
    fn oversized_version_components_parse_as_zero() {
        assert_eq!(parse_version("500000.1.1"), 0);
        assert_eq!(parse_version("1.99999999999999999999.0"), 10000);
        assert_eq!(parse_version("429496.72.95"), u32::MAX);

        let source = MysqlStatsSource::new(FakeQuery::new("500000.1.1")).unwrap();
        assert_eq!(source.version(), 0);
        assert!(!source.supports_engine_metrics());
    }

    #[test]
    fn engine_metrics_require_a_recent_server() {
        let mut old = MysqlStatsSource::new(FakeQuery::new("5.5.62")).unwrap();
        assert!(matches!(
            old.engine_internals(),
            BatchResult::Failed(CollectorError::Unsupported(_))
        ));

        let mut recent = MysqlStatsSource::new(FakeQuery::new("5.7.22-log")).unwrap();
        let stats = recent.engine_internals().require(BatchId::Engine).unwrap();
        assert_eq!(stats["operations/dml_reads"].value(), Some(10));
    }

    #[test]
    fn query_errors_are_tagged_with_their_batch() {
        let mut query = FakeQuery::new("8.0.36");
        query.fail_engine = true;
        let mut source = MysqlStatsSource::new(query).unwrap();

        match source.engine_internals() {
            BatchResult::Failed(CollectorError::Source { batch, message }) => {
                assert_eq!(batch, BatchId::Engine);
                assert!(message.contains("connection reset"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn unconfigured_roles_are_unavailable() {
        let mut source = MysqlStatsSource::new(FakeQuery::new("8.0.36")).unwrap();
        assert!(matches!(source.primary_status(), BatchResult::Unavailable(_)));
        assert!(matches!(source.replica_status(), BatchResult::Unavailable(_)));
    }

    #[test]
    fn global_status_is_mapped() {
        let mut source = MysqlStatsSource::new(FakeQuery::new("8.0.36")).unwrap();
        let stats = source.global_status(false).require(BatchId::Global).unwrap();
        assert_eq!(stats["threads/running"].value(), Some(3));
        source.close().unwrap();
        assert!(source.query.closed);
    }
}

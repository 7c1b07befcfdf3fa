//! Translation of vendor status rows into named samples.
//!
//! Status names are matched against fixed tables; anything not listed is
//! dropped. Metric names are `family/stat`.

use crate::error::{CollectorError, Result};
use sqlmon_common::classify::{classify_raw, RawValue};
use sqlmon_common::types::{BatchId, Stats, StatKind};

use StatKind::{Counter, Derive, Gauge};

/// A result set with named columns, as returned for the replication
/// status statements.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<RawValue>>,
}

/// Status name prefixes mapped to a metric family. All are counters.
const GLOBAL_PREFIXES: &[(&str, &str)] = &[
    ("Com_", "mysql_commands"),
    ("Handler_", "mysql_handler"),
    ("Table_locks_", "mysql_locks"),
    ("Select_", "mysql_select"),
    ("Sort_", "mysql_sort"),
];

/// Prepared-statement commands are excluded from `mysql_commands`.
const EXCLUDED_COMMAND_PREFIX: &str = "Com_stmt_";

const GLOBAL_NAMES: &[(&str, &str, StatKind)] = &[
    ("Qcache_hits", "cache_result/qcache-hits", Derive),
    ("Qcache_inserts", "cache_result/qcache-inserts", Derive),
    ("Qcache_not_cached", "cache_result/qcache-not_cached", Derive),
    ("Qcache_lowmem_prunes", "cache_result/qcache-prunes", Derive),
    ("Qcache_queries_in_cache", "cache_size/qcache", Gauge),
    ("Bytes_received", "mysql_octets/rx", Gauge),
    ("Bytes_sent", "mysql_octets/tx", Gauge),
    ("Threads_running", "threads/running", Gauge),
    ("Threads_connected", "threads/connected", Gauge),
    ("Threads_cached", "threads/cached", Gauge),
    ("Threads_created", "total_threads/created", Derive),
];

/// Engine counters reported by the global status listing. Only mapped when
/// the engine feature is enabled.
const GLOBAL_ENGINE_NAMES: &[(&str, &str, StatKind)] = &[
    ("Innodb_buffer_pool_pages_data", "mysql_bpool_pages/data", Gauge),
    ("Innodb_buffer_pool_pages_dirty", "mysql_bpool_pages/dirty", Gauge),
    ("Innodb_buffer_pool_pages_flushed", "mysql_bpool_counters/pages_flushed", Counter),
    ("Innodb_buffer_pool_pages_free", "mysql_bpool_pages/free", Gauge),
    ("Innodb_buffer_pool_pages_misc", "mysql_bpool_pages/misc", Gauge),
    ("Innodb_buffer_pool_pages_total", "mysql_bpool_pages/total", Gauge),
    ("Innodb_buffer_pool_read_ahead_rnd", "mysql_bpool_counters/read_ahead_rnd", Counter),
    ("Innodb_buffer_pool_read_ahead", "mysql_bpool_counters/read_ahead", Counter),
    ("Innodb_buffer_pool_read_ahead_evicted", "mysql_bpool_counters/read_ahead_evicted", Counter),
    ("Innodb_buffer_pool_read_requests", "mysql_bpool_counters/read_requests", Counter),
    ("Innodb_buffer_pool_reads", "mysql_bpool_counters/reads", Counter),
    ("Innodb_buffer_pool_write_requests", "mysql_bpool_counters/write_requests", Counter),
    ("Innodb_buffer_pool_bytes_data", "mysql_bpool_bytes/data", Gauge),
    ("Innodb_buffer_pool_bytes_dirty", "mysql_bpool_bytes/dirty", Gauge),
    ("Innodb_data_fsyncs", "mysql_innodb_data/fsyncs", Counter),
    ("Innodb_data_read", "mysql_innodb_data/read", Counter),
    ("Innodb_data_reads", "mysql_innodb_data/reads", Counter),
    ("Innodb_data_writes", "mysql_innodb_data/writes", Counter),
    ("Innodb_data_written", "mysql_innodb_data/written", Counter),
    ("Innodb_dblwr_writes", "mysql_innodb_dblwr/writes", Counter),
    ("Innodb_dblwr_pages_written", "mysql_innodb_dblwr/written", Counter),
    ("Innodb_log_waits", "mysql_innodb_log/waits", Counter),
    ("Innodb_log_write_requests", "mysql_innodb_log/write_requests", Counter),
    ("Innodb_log_writes", "mysql_innodb_log/writes", Counter),
    ("Innodb_os_log_fsyncs", "mysql_innodb_log/fsyncs", Counter),
    ("Innodb_os_log_written", "mysql_innodb_log/written", Counter),
    ("Innodb_pages_created", "mysql_innodb_pages/created", Counter),
    ("Innodb_pages_read", "mysql_innodb_pages/read", Counter),
    ("Innodb_pages_written", "mysql_innodb_pages/written", Counter),
    ("Innodb_row_lock_time", "mysql_innodb_row_lock/time", Counter),
    ("Innodb_row_lock_waits", "mysql_innodb_row_lock/waits", Counter),
    ("Innodb_rows_deleted", "mysql_innodb_rows/deleted", Counter),
    ("Innodb_rows_inserted", "mysql_innodb_rows/inserted", Counter),
    ("Innodb_rows_read", "mysql_innodb_rows/read", Counter),
    ("Innodb_rows_updated", "mysql_innodb_rows/updated", Counter),
];

/// Names from the engine metrics table.
const ENGINE_NAMES: &[(&str, &str, StatKind)] = &[
    ("metadata_mem_pool_size", "bytes/metadata_mem_pool_size", Gauge),
    ("lock_deadlocks", "mysql_locks/lock_deadlocks", Derive),
    ("lock_timeouts", "mysql_locks/lock_timeouts", Derive),
    ("lock_row_lock_current_waits", "mysql_locks/lock_row_lock_current_waits", Derive),
    ("buffer_pool_size", "bytes/buffer_pool_size", Gauge),
    ("buffer_pool_reads", "operations/buffer_pool_reads", Derive),
    ("buffer_pool_read_requests", "operations/buffer_pool_read_requests", Derive),
    ("buffer_pool_write_requests", "operations/buffer_pool_write_requests", Derive),
    ("buffer_pool_wait_free", "operations/buffer_pool_wait_free", Derive),
    ("buffer_pool_read_ahead", "operations/buffer_pool_read_ahead", Derive),
    ("buffer_pool_read_ahead_evicted", "operations/buffer_pool_read_ahead_evicted", Derive),
    ("buffer_pool_pages_total", "gauge/buffer_pool_pages_total", Gauge),
    ("buffer_pool_pages_misc", "gauge/buffer_pool_pages_misc", Gauge),
    ("buffer_pool_pages_data", "gauge/buffer_pool_pages_data", Gauge),
    ("buffer_pool_bytes_data", "gauge/buffer_pool_bytes_data", Gauge),
    ("buffer_pool_pages_dirty", "gauge/buffer_pool_pages_dirty", Gauge),
    ("buffer_pool_bytes_dirty", "gauge/buffer_pool_bytes_dirty", Gauge),
    ("buffer_pool_pages_free", "gauge/buffer_pool_pages_free", Gauge),
    ("buffer_pages_created", "operations/buffer_pages_created", Derive),
    ("buffer_pages_written", "operations/buffer_pages_written", Derive),
    ("buffer_pages_read", "operations/buffer_pages_read", Derive),
    ("buffer_data_reads", "operations/buffer_data_reads", Derive),
    ("buffer_data_written", "operations/buffer_data_written", Derive),
    ("os_data_reads", "operations/os_data_reads", Derive),
    ("os_data_writes", "operations/os_data_writes", Derive),
    ("os_data_fsyncs", "operations/os_data_fsyncs", Derive),
    ("os_log_bytes_written", "operations/os_log_bytes_written", Derive),
    ("os_log_fsyncs", "operations/os_log_fsyncs", Derive),
    ("os_log_pending_fsyncs", "operations/os_log_pending_fsyncs", Derive),
    ("os_log_pending_writes", "operations/os_log_pending_writes", Derive),
    ("trx_rseg_history_len", "gauge/trx_rseg_history_len", Gauge),
    ("log_waits", "operations/log_waits", Derive),
    ("log_write_requests", "operations/log_write_requests", Derive),
    ("log_writes", "operations/log_writes", Derive),
    ("adaptive_hash_searches", "operations/adaptive_hash_searches", Derive),
    ("file_num_open_files", "gauge/file_num_open_files", Gauge),
    ("ibuf_merges_insert", "operations/ibuf_merges_insert", Derive),
    ("ibuf_merges_delete_mark", "operations/ibuf_merges_delete_mark", Derive),
    ("ibuf_merges_delete", "operations/ibuf_merges_delete", Derive),
    ("ibuf_merges_discard_insert", "operations/ibuf_merges_discard_insert", Derive),
    ("ibuf_merges_discard_delete_mark", "operations/ibuf_merges_discard_delete_mark", Derive),
    ("ibuf_merges_discard_delete", "operations/ibuf_merges_discard_delete", Derive),
    ("ibuf_merges_discard_merges", "operations/ibuf_merges_discard_merges", Derive),
    ("ibuf_size", "bytes/ibuf_size", Gauge),
    ("innodb_activity_count", "gauge/innodb_activity_count", Gauge),
    ("innodb_dblwr_writes", "operations/innodb_dblwr_writes", Derive),
    ("innodb_dblwr_pages_written", "operations/innodb_dblwr_pages_written", Derive),
    ("innodb_dblwr_page_size", "gauge/innodb_dblwr_page_size", Gauge),
    ("innodb_rwlock_s_spin_waits", "operations/innodb_rwlock_s_spin_waits", Derive),
    ("innodb_rwlock_x_spin_waits", "operations/innodb_rwlock_x_spin_waits", Derive),
    ("innodb_rwlock_s_spin_rounds", "operations/innodb_rwlock_s_spin_rounds", Derive),
    ("innodb_rwlock_x_spin_rounds", "operations/innodb_rwlock_x_spin_rounds", Derive),
    ("innodb_rwlock_s_os_waits", "operations/innodb_rwlock_s_os_waits", Derive),
    ("innodb_rwlock_x_os_waits", "operations/innodb_rwlock_x_os_waits", Derive),
    ("dml_reads", "operations/dml_reads", Derive),
    ("dml_inserts", "operations/dml_inserts", Derive),
    ("dml_deletes", "operations/dml_deletes", Derive),
    ("dml_updates", "operations/dml_updates", Derive),
];

/// Position column of the primary status row.
const PRIMARY_POSITION_IDX: usize = 1;

// Replica status columns.
const REPLICA_READ_POS_IDX: usize = 6;
const REPLICA_EXEC_POS_IDX: usize = 21;
const REPLICA_SECONDS_BEHIND_IDX: usize = 32;
const REPLICA_MIN_COLUMNS: usize = REPLICA_SECONDS_BEHIND_IDX + 1;

type NameTable = &'static [(&'static str, &'static str, StatKind)];

fn lookup(table: NameTable, name: &str) -> Option<(&'static str, StatKind)> {
    table
        .iter()
        .find(|(status, _, _)| *status == name)
        .map(|&(_, metric, kind)| (metric, kind))
}

fn insert(
    stats: &mut Stats,
    metric: String,
    kind: StatKind,
    column: &str,
    raw: &RawValue,
) -> Result<()> {
    let sample = classify_raw(kind, raw).map_err(|source| CollectorError::InvalidValue {
        column: column.to_string(),
        source,
    })?;
    stats.insert(metric, sample);
    Ok(())
}

/// Maps `(Variable_name, Value)` rows of the global status listing.
///
/// # Errors
///
/// Returns [`CollectorError::InvalidValue`] for a mapped row whose value is
/// not an integer.
pub fn map_global_status<'a, I>(rows: I, include_engine: bool) -> Result<Stats>
where
    I: IntoIterator<Item = &'a (String, RawValue)>,
{
    let mut stats = Stats::new();

    for (name, raw) in rows {
        let prefixed = GLOBAL_PREFIXES.iter().find(|(prefix, _)| name.starts_with(prefix));
        if let Some((prefix, family)) = prefixed {
            if !name.starts_with(EXCLUDED_COMMAND_PREFIX) {
                let metric = format!("{family}/{}", &name[prefix.len()..]);
                insert(&mut stats, metric, Counter, name, raw)?;
            }
            continue;
        }

        let mapped = lookup(GLOBAL_NAMES, name).or_else(|| {
            if include_engine {
                lookup(GLOBAL_ENGINE_NAMES, name)
            } else {
                None
            }
        });
        if let Some((metric, kind)) = mapped {
            insert(&mut stats, metric.to_string(), kind, name, raw)?;
        }
    }

    Ok(stats)
}

/// Maps `(name, count)` rows of the engine metrics table.
///
/// # Errors
///
/// Returns [`CollectorError::InvalidValue`] for a mapped row whose count is
/// not an integer.
pub fn map_engine_metrics<'a, I>(rows: I) -> Result<Stats>
where
    I: IntoIterator<Item = &'a (String, RawValue)>,
{
    let mut stats = Stats::new();
    for (name, raw) in rows {
        if let Some((metric, kind)) = lookup(ENGINE_NAMES, name) {
            insert(&mut stats, metric.to_string(), kind, name, raw)?;
        }
    }
    Ok(stats)
}

/// Maps the first row of the primary status result. `None` when the
/// result is empty, which is how a server without binary logging answers.
///
/// # Errors
///
/// Returns [`CollectorError::MalformedRow`] when the row is too short.
pub fn map_primary_status(table: &Table) -> Result<Option<Stats>> {
    let Some(row) = table.rows.first() else {
        return Ok(None);
    };

    let position = row.get(PRIMARY_POSITION_IDX).ok_or_else(|| CollectorError::MalformedRow {
        batch: BatchId::Primary,
        message: format!("expected at least {} columns, got {}", PRIMARY_POSITION_IDX + 1, row.len()),
    })?;

    let mut stats = Stats::new();
    insert(
        &mut stats,
        "mysql_log_position/master-bin".to_string(),
        Counter,
        "Position",
        position,
    )?;
    Ok(Some(stats))
}

/// Maps the first row of the replica status result. `None` when the
/// result is empty, i.e. the server is not replicating.
///
/// # Errors
///
/// Returns [`CollectorError::MalformedRow`] when the result has fewer
/// columns than the replica status layout needs.
pub fn map_replica_status(table: &Table) -> Result<Option<Stats>> {
    if table.columns.len() < REPLICA_MIN_COLUMNS {
        return Err(CollectorError::MalformedRow {
            batch: BatchId::Replica,
            message: format!(
                "expected at least {REPLICA_MIN_COLUMNS} columns, got {}",
                table.columns.len()
            ),
        });
    }

    let Some(row) = table.rows.first() else {
        return Ok(None);
    };

    if row.len() < REPLICA_MIN_COLUMNS {
        return Err(CollectorError::MalformedRow {
            batch: BatchId::Replica,
            message: format!("row has {} values for {} columns", row.len(), table.columns.len()),
        });
    }

    let fields = [
        (REPLICA_READ_POS_IDX, "mysql_log_position/slave-read", Counter),
        (REPLICA_EXEC_POS_IDX, "mysql_log_position/slave-exec", Counter),
        (REPLICA_SECONDS_BEHIND_IDX, "mysql_log_position/time_offset", Gauge),
    ];

    let mut stats = Stats::new();
    for (idx, metric, kind) in fields {
        insert(&mut stats, metric.to_string(), kind, &table.columns[idx], &row[idx])?;
    }
    Ok(Some(stats))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(pairs: &[(&str, RawValue)]) -> Vec<(String, RawValue)> {
        pairs
            .iter()
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect()
    }

    #[test]
    fn prefixed_status_names_become_counters() {
        let rows = rows(&[
            ("Com_select", RawValue::from("120")),
            ("Com_stmt_execute", RawValue::from("7")),
            ("Handler_read_first", RawValue::Int(3)),
            ("Uptime", RawValue::Int(1000)),
        ]);

        let stats = map_global_status(&rows, false).unwrap();

        assert_eq!(stats.len(), 2);
        assert_eq!(stats["mysql_commands/select"].value(), Some(120));
        assert_eq!(stats["mysql_commands/select"].kind, Counter);
        assert_eq!(stats["mysql_handler/read_first"].value(), Some(3));
        assert!(!stats.contains_key("mysql_commands/stmt_execute"));
    }

    #[test]
    fn engine_status_names_need_the_engine_feature() {
        let rows = rows(&[
            ("Threads_running", RawValue::Int(4)),
            ("Innodb_rows_read", RawValue::Int(900)),
        ]);

        let without = map_global_status(&rows, false).unwrap();
        assert_eq!(without.len(), 1);
        assert_eq!(without["threads/running"].kind, Gauge);

        let with = map_global_status(&rows, true).unwrap();
        assert_eq!(with.len(), 2);
        assert_eq!(with["mysql_innodb_rows/read"].kind, Counter);
    }

    #[test]
    fn null_status_value_is_kept_as_null_sample() {
        let rows = rows(&[("Qcache_hits", RawValue::Null)]);
        let stats = map_global_status(&rows, false).unwrap();
        assert!(stats["cache_result/qcache-hits"].is_null);
    }

    #[test]
    fn non_numeric_mapped_value_is_rejected() {
        let rows = rows(&[("Threads_cached", RawValue::from("many"))]);
        let err = map_global_status(&rows, false).unwrap_err();
        assert!(matches!(err, CollectorError::InvalidValue { ref column, .. } if column == "Threads_cached"));
    }

    #[test]
    fn engine_metrics_use_their_own_table() {
        let rows = rows(&[
            ("lock_deadlocks", RawValue::Int(2)),
            ("buffer_pool_size", RawValue::Int(134_217_728)),
            ("unknown_counter", RawValue::Int(1)),
        ]);

        let stats = map_engine_metrics(&rows).unwrap();

        assert_eq!(stats.len(), 2);
        assert_eq!(stats["mysql_locks/lock_deadlocks"].kind, Derive);
        assert_eq!(stats["bytes/buffer_pool_size"].value(), Some(134_217_728));
    }

    #[test]
    fn primary_status_reads_the_position_column() {
        let table = Table {
            columns: vec!["File".into(), "Position".into()],
            rows: vec![vec![RawValue::from("binlog.000003"), RawValue::UInt(154)]],
        };
        let stats = map_primary_status(&table).unwrap().unwrap();
        assert_eq!(stats["mysql_log_position/master-bin"].value(), Some(154));

        assert!(map_primary_status(&Table::default()).unwrap().is_none());
    }

    #[test]
    fn replica_status_needs_the_full_layout() {
        let columns: Vec<String> = (0..40).map(|i| format!("col{i}")).collect();
        let mut row = vec![RawValue::Null; 40];
        row[REPLICA_READ_POS_IDX] = RawValue::Int(500);
        row[REPLICA_EXEC_POS_IDX] = RawValue::Int(480);

        let table = Table {
            columns: columns.clone(),
            rows: vec![row],
        };
        let stats = map_replica_status(&table).unwrap().unwrap();
        assert_eq!(stats["mysql_log_position/slave-read"].value(), Some(500));
        assert_eq!(stats["mysql_log_position/slave-exec"].value(), Some(480));
        assert!(stats["mysql_log_position/time_offset"].is_null);

        let short = Table {
            columns: columns[..10].to_vec(),
            rows: Vec::new(),
        };
        assert!(matches!(
            map_replica_status(&short),
            Err(CollectorError::MalformedRow { batch: BatchId::Replica, .. })
        ));
    }
}

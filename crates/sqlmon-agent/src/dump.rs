//! [`StatusQuery`] over tab-separated status dumps.
//!
//! Each file holds the output of `mysql -B -e '<statement>'`: a header line
//! followed by tab-separated rows, with `NULL` for missing values. Files are
//! re-read on every call so an external job can refresh them between polls.
//!
//! | File                 | Statement                                  |
//! |----------------------|--------------------------------------------|
//! | `version.tsv`        | `SELECT VERSION()`                         |
//! | `global_status.tsv`  | `SHOW GLOBAL STATUS`                       |
//! | `innodb_metrics.tsv` | `SELECT name, count, type FROM information_schema.innodb_metrics WHERE status = 'enabled'` |
//! | `master_status.tsv`  | `SHOW MASTER STATUS` (optional)            |
//! | `slave_status.tsv`   | `SHOW SLAVE STATUS` (optional)             |

use anyhow::{bail, Context, Result};
use sqlmon_collector::mapping::Table;
use sqlmon_collector::mysql::StatusQuery;
use sqlmon_common::classify::RawValue;
use std::io::ErrorKind;
use std::path::PathBuf;

const VERSION_FILE: &str = "version.tsv";
const GLOBAL_STATUS_FILE: &str = "global_status.tsv";
const ENGINE_METRICS_FILE: &str = "innodb_metrics.tsv";
const PRIMARY_STATUS_FILE: &str = "master_status.tsv";
const REPLICA_STATUS_FILE: &str = "slave_status.tsv";

pub struct DumpQuery {
    dir: PathBuf,
}

impl DumpQuery {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn read(&self, file: &str) -> Result<Table> {
        self.read_optional(file)?
            .with_context(|| format!("{} not found", self.dir.join(file).display()))
    }

    fn read_optional(&self, file: &str) -> Result<Option<Table>> {
        let path = self.dir.join(file);
        match std::fs::read_to_string(&path) {
            Ok(content) => parse_table(&content)
                .map(Some)
                .with_context(|| format!("cannot parse {}", path.display())),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("cannot read {}", path.display())),
        }
    }

    fn read_pairs(&self, file: &str) -> Result<Vec<(String, RawValue)>> {
        let table = self.read(file)?;
        table
            .rows
            .into_iter()
            .enumerate()
            .map(|(i, row)| {
                let mut fields = row.into_iter();
                match (fields.next(), fields.next()) {
                    (Some(RawValue::Text(name)), Some(value)) => Ok((name, value)),
                    _ => bail!("{file}: row {} needs a name and a value", i + 1),
                }
            })
            .collect()
    }
}

fn parse_field(field: &str) -> RawValue {
    if field == "NULL" {
        RawValue::Null
    } else {
        RawValue::Text(field.to_string())
    }
}

/// Parses a header line plus tab-separated rows. Blank lines are skipped.
fn parse_table(content: &str) -> Result<Table> {
    let mut lines = content.lines().filter(|line| !line.trim().is_empty());
    let Some(header) = lines.next() else {
        return Ok(Table::default());
    };

    let columns: Vec<String> = header.split('\t').map(str::to_string).collect();
    let mut rows = Vec::new();
    for (i, line) in lines.enumerate() {
        let row: Vec<RawValue> = line.split('\t').map(parse_field).collect();
        if row.len() != columns.len() {
            bail!(
                "row {} has {} fields, header has {}",
                i + 1,
                row.len(),
                columns.len()
            );
        }
        rows.push(row);
    }

    Ok(Table { columns, rows })
}

impl StatusQuery for DumpQuery {
    fn server_version(&mut self) -> Result<String> {
        let table = self.read(VERSION_FILE)?;
        match table.rows.first().and_then(|row| row.first()) {
            Some(RawValue::Text(version)) => Ok(version.clone()),
            _ => bail!("{VERSION_FILE} holds no version"),
        }
    }

    fn global_status(&mut self) -> Result<Vec<(String, RawValue)>> {
        self.read_pairs(GLOBAL_STATUS_FILE)
    }

    fn engine_metrics(&mut self) -> Result<Vec<(String, RawValue)>> {
        self.read_pairs(ENGINE_METRICS_FILE)
    }

    fn primary_status(&mut self) -> Result<Option<Table>> {
        self.read_optional(PRIMARY_STATUS_FILE)
    }

    fn replica_status(&mut self) -> Result<Option<Table>> {
        self.read_optional(REPLICA_STATUS_FILE)
    }

    fn close(&mut self) -> Result<()> {
        tracing::debug!(dir = %self.dir.display(), "Status dump source closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlmon_collector::mysql::MysqlStatsSource;
    use sqlmon_collector::{BatchResult, StatsSource};
    use sqlmon_common::types::BatchId;
    use std::fs;
    use tempfile::TempDir;

    fn setup() -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(VERSION_FILE), "VERSION()\n5.7.22-log\n").unwrap();
        fs::write(
            dir.path().join(GLOBAL_STATUS_FILE),
            "Variable_name\tValue\nCom_select\t42\nThreads_running\t3\nQcache_hits\tNULL\n",
        )
        .unwrap();
        dir
    }

    #[test]
    fn should_parse_header_and_null_fields() {
        let table = parse_table("a\tb\n1\tNULL\n\n2\t3\n").unwrap();
        assert_eq!(table.columns, vec!["a", "b"]);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0][1], RawValue::Null);
        assert_eq!(table.rows[1][1], RawValue::Text("3".to_string()));
    }

    #[test]
    fn should_reject_ragged_rows() {
        assert!(parse_table("a\tb\n1\n").is_err());
    }

    #[test]
    fn should_read_global_status_through_the_mysql_source() {
        let dir = setup();
        let mut source = MysqlStatsSource::new(DumpQuery::new(dir.path())).unwrap();
        assert_eq!(source.version(), 50722);

        let stats = source.global_status(false).require(BatchId::Global).unwrap();
        assert_eq!(stats["mysql_commands/select"].value(), Some(42));
        assert_eq!(stats["threads/running"].value(), Some(3));
        assert!(stats["cache_result/qcache-hits"].is_null);
    }

    #[test]
    fn should_treat_missing_role_dumps_as_unavailable() {
        let dir = setup();
        let mut source = MysqlStatsSource::new(DumpQuery::new(dir.path())).unwrap();

        assert!(matches!(source.primary_status(), BatchResult::Unavailable(_)));
        assert!(matches!(source.replica_status(), BatchResult::Unavailable(_)));
    }

    #[test]
    fn should_read_primary_position() {
        let dir = setup();
        fs::write(
            dir.path().join(PRIMARY_STATUS_FILE),
            "File\tPosition\tBinlog_Do_DB\tBinlog_Ignore_DB\tExecuted_Gtid_Set\nbinlog.000002\t1337\t\t\t\n",
        )
        .unwrap();
        let mut source = MysqlStatsSource::new(DumpQuery::new(dir.path())).unwrap();

        let stats = source.primary_status().require(BatchId::Primary).unwrap();
        assert_eq!(stats["mysql_log_position/master-bin"].value(), Some(1337));
    }

    #[test]
    fn should_fail_without_global_status_dump() {
        let dir = setup();
        fs::remove_file(dir.path().join(GLOBAL_STATUS_FILE)).unwrap();
        let mut query = DumpQuery::new(dir.path());

        let err = query.global_status().unwrap_err();
        assert!(err.to_string().contains(GLOBAL_STATUS_FILE));
    }
}

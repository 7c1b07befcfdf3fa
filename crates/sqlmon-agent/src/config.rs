use anyhow::{ensure, Context};
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Deserialize)]
pub struct AgentConfig {
    /// Reported as the `source` of every data point
    #[serde(default = "default_source_name")]
    pub source_name: String,
    /// Directory holding the status dumps
    pub status_dir: PathBuf,
    /// Collect storage-engine internals; startup fails if they are missing
    #[serde(default)]
    pub use_engine_metrics: bool,
    #[serde(default = "default_collection_interval")]
    pub collection_interval_secs: u64,
    #[serde(default = "default_namespace_prefix")]
    pub namespace_prefix: Vec<String>,
    /// Metric paths to poll (e.g. `threads/running`). Empty polls everything discovered.
    #[serde(default)]
    pub metrics: Vec<String>,
}

fn default_source_name() -> String {
    hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "localhost".to_string())
}

fn default_collection_interval() -> u64 {
    10
}

fn default_namespace_prefix() -> Vec<String> {
    vec!["sqlmon".to_string(), "mysql".to_string()]
}

impl AgentConfig {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content =
            std::fs::read_to_string(path).with_context(|| format!("cannot read config {path}"))?;
        Self::parse(&content).with_context(|| format!("invalid config {path}"))
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(content)?;
        ensure!(
            config.collection_interval_secs > 0,
            "collection_interval_secs must be greater than 0"
        );
        ensure!(
            !config.namespace_prefix.is_empty(),
            "namespace_prefix must not be empty"
        );
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_apply_defaults_for_optional_fields() {
        let config = AgentConfig::parse(r#"status_dir = "/var/lib/sqlmon""#).unwrap();

        assert_eq!(config.status_dir, PathBuf::from("/var/lib/sqlmon"));
        assert!(!config.use_engine_metrics);
        assert_eq!(config.collection_interval_secs, 10);
        assert_eq!(config.namespace_prefix, vec!["sqlmon", "mysql"]);
        assert!(config.metrics.is_empty());
        assert!(!config.source_name.is_empty());
    }

    #[test]
    fn should_default_source_name_to_machine_hostname() {
        let expected = hostname::get().unwrap().to_string_lossy().to_string();
        let config = AgentConfig::parse(r#"status_dir = "dumps""#).unwrap();
        assert_eq!(config.source_name, expected);
    }

    #[test]
    fn should_read_explicit_settings() {
        let config = AgentConfig::parse(
            r#"
            source_name = "db-01"
            status_dir = "dumps"
            use_engine_metrics = true
            collection_interval_secs = 30
            namespace_prefix = ["acme", "db"]
            metrics = ["threads/running", "mysql_commands/select"]
            "#,
        )
        .unwrap();

        assert_eq!(config.source_name, "db-01");
        assert!(config.use_engine_metrics);
        assert_eq!(config.collection_interval_secs, 30);
        assert_eq!(config.namespace_prefix, vec!["acme", "db"]);
        assert_eq!(config.metrics.len(), 2);
    }

    #[test]
    fn should_reject_zero_interval() {
        let err = AgentConfig::parse(
            r#"
            status_dir = "dumps"
            collection_interval_secs = 0
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("collection_interval_secs"));
    }

    #[test]
    fn should_require_status_dir() {
        assert!(AgentConfig::parse("use_engine_metrics = true").is_err());
    }
}

mod config;
mod dump;

use anyhow::Result;
use sqlmon_collector::mysql::MysqlStatsSource;
use sqlmon_collector::service::MetricService;
use sqlmon_collector::StatsSource;
use sqlmon_common::types::MetricDataPoint;
use std::io::Write;
use std::path::PathBuf;
use tokio::signal;
use tokio::time::{interval, Duration};
use tracing_subscriber::EnvFilter;

use crate::dump::DumpQuery;

fn build_service(config: &config::AgentConfig) -> MetricService {
    let status_dir: PathBuf = config.status_dir.clone();
    MetricService::new(
        config.namespace_prefix.clone(),
        config.source_name.clone(),
        config.use_engine_metrics,
        Box::new(move || -> anyhow::Result<Box<dyn StatsSource>> {
            let source = MysqlStatsSource::new(DumpQuery::new(status_dir.clone()))?;
            Ok(Box::new(source))
        }),
    )
}

/// Namespaces to poll: the configured paths, or the whole catalog.
fn resolve_namespaces(
    service: &MetricService,
    metrics: &[String],
) -> sqlmon_collector::error::Result<Vec<Vec<String>>> {
    if metrics.is_empty() {
        return service.metric_types();
    }
    Ok(metrics.iter().map(|path| service.namespace(path)).collect())
}

/// Writes one JSON object per data point to stdout.
fn emit(points: &[MetricDataPoint]) -> Result<()> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for point in points {
        serde_json::to_writer(&mut out, point)?;
        out.write_all(b"\n")?;
    }
    out.flush()?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::from_default_env().add_directive("sqlmon=info".parse()?))
        .init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config/agent.toml".to_string());

    let config = config::AgentConfig::load(&config_path)?;
    tracing::info!(source = %config.source_name, "sqlmon-agent starting");

    let service = build_service(&config);
    let mut namespaces: Option<Vec<Vec<String>>> = None;
    let mut tick = interval(Duration::from_secs(config.collection_interval_secs));

    tracing::info!(
        interval_secs = config.collection_interval_secs,
        status_dir = %config.status_dir.display(),
        engine = config.use_engine_metrics,
        "Starting collection loop"
    );

    loop {
        tokio::select! {
            _ = tick.tick() => {
                // Discovery is retried on every tick until it succeeds
                if namespaces.is_none() {
                    match resolve_namespaces(&service, &config.metrics) {
                        Ok(resolved) => {
                            tracing::info!(count = resolved.len(), "Polling metrics");
                            namespaces = Some(resolved);
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "Discovery failed, retrying next tick");
                            continue;
                        }
                    }
                }
                let Some(ref wanted) = namespaces else { continue };

                match service.collect_metrics(wanted) {
                    Ok(points) => {
                        tracing::debug!(count = points.len(), "Collected metrics");
                        if let Err(e) = emit(&points) {
                            tracing::error!(error = %e, "Failed to write metrics");
                        }
                    }
                    Err(e) => tracing::warn!(error = %e, "Collection failed"),
                }
            }
            _ = signal::ctrl_c() => {
                tracing::info!("Shutting down gracefully");
                if let Err(e) = service.close() {
                    tracing::warn!(error = %e, "Failed to close status source");
                }
                break;
            }
        }
    }

    Ok(())
}

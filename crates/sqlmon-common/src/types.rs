use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Semantic kind of a sampled value.
///
/// # Examples
///
/// ```
/// use sqlmon_common::types::StatKind;
///
/// let kind: StatKind = "counter".parse().unwrap();
/// assert_eq!(kind, StatKind::Counter);
/// assert_eq!(kind.to_string(), "counter");
/// assert!(kind.is_rate());
/// assert!(!StatKind::Gauge.is_rate());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatKind {
    /// Instantaneous value, reported as-is.
    Gauge,
    /// Signed value reported as a rate; may go down, never wraps.
    Derive,
    /// Monotonic value reported as a rate; a decrease means wraparound.
    Counter,
}

impl StatKind {
    /// Whether samples of this kind are turned into a rate of change.
    pub fn is_rate(self) -> bool {
        matches!(self, StatKind::Derive | StatKind::Counter)
    }
}

impl std::fmt::Display for StatKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StatKind::Gauge => write!(f, "gauge"),
            StatKind::Derive => write!(f, "derive"),
            StatKind::Counter => write!(f, "counter"),
        }
    }
}

impl std::str::FromStr for StatKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "gauge" => Ok(StatKind::Gauge),
            "derive" => Ok(StatKind::Derive),
            "counter" => Ok(StatKind::Counter),
            _ => Err(format!("unknown stat kind: {s}")),
        }
    }
}

/// One observed value.
///
/// `value` carries no meaning when `is_null` is set; read it through
/// [`Sample::value`] to get that check for free.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sample {
    pub value: i64,
    pub kind: StatKind,
    pub is_null: bool,
}

impl Sample {
    pub fn value(&self) -> Option<i64> {
        if self.is_null {
            None
        } else {
            Some(self.value)
        }
    }
}

/// Samples of one batch keyed by their hierarchical name (`family/stat`).
pub type Stats = HashMap<String, Sample>;

/// Identifies the logical request that produces a group of samples.
///
/// The numeric form (`0..=3`) is what hosts exchange; the string form is
/// used in logs and configuration.
///
/// # Examples
///
/// ```
/// use sqlmon_common::types::BatchId;
///
/// assert_eq!(BatchId::try_from(2).unwrap(), BatchId::Primary);
/// assert_eq!(BatchId::Replica.as_u8(), 3);
/// assert_eq!("engine".parse::<BatchId>().unwrap(), BatchId::Engine);
/// assert!(BatchId::try_from(9).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchId {
    /// Server-wide status counters. Always available.
    Global,
    /// Storage-engine internals. Optional feature.
    Engine,
    /// Replication-source role status.
    Primary,
    /// Replication-replica role status.
    Replica,
}

impl BatchId {
    /// All batches in fetch order.
    pub const ALL: [BatchId; 4] = [
        BatchId::Global,
        BatchId::Engine,
        BatchId::Primary,
        BatchId::Replica,
    ];

    pub fn as_u8(self) -> u8 {
        match self {
            BatchId::Global => 0,
            BatchId::Engine => 1,
            BatchId::Primary => 2,
            BatchId::Replica => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BatchId::Global => "global",
            BatchId::Engine => "engine",
            BatchId::Primary => "primary",
            BatchId::Replica => "replica",
        }
    }
}

impl TryFrom<u8> for BatchId {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        BatchId::ALL
            .into_iter()
            .find(|id| id.as_u8() == value)
            .ok_or_else(|| format!("unknown batch id: {value}"))
    }
}

impl std::fmt::Display for BatchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BatchId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BatchId::ALL
            .into_iter()
            .find(|id| id.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown batch: {s}"))
    }
}

/// Output of the rate engine for a single metric.
///
/// Gauges keep their integer value; counters and derives always become a
/// floating-point rate. Serializes to a bare JSON `null`, integer or float.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MetricValue {
    Null,
    Gauge(i64),
    Rate(f64),
}

impl MetricValue {
    pub fn is_null(&self) -> bool {
        matches!(self, MetricValue::Null)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            MetricValue::Null => None,
            MetricValue::Gauge(v) => Some(v as f64),
            MetricValue::Rate(v) => Some(v),
        }
    }
}

impl From<Option<i64>> for MetricValue {
    fn from(value: Option<i64>) -> Self {
        value.map_or(MetricValue::Null, MetricValue::Gauge)
    }
}

/// Catalog record: which batch must be fetched to refresh `name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MetricEntry {
    pub name: String,
    pub batch: BatchId,
}

/// A collected value addressed by its full namespace, ready for a pipeline.
#[derive(Debug, Clone, Serialize)]
pub struct MetricDataPoint {
    pub namespace: Vec<String>,
    pub value: MetricValue,
    pub source: String,
    pub timestamp: DateTime<Utc>,
}

impl MetricDataPoint {
    /// Namespace joined with `/`, handy for logs and line-oriented output.
    pub fn path(&self) -> String {
        self.namespace.join("/")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_sample_hides_its_value() {
        let sample = Sample {
            value: 42,
            kind: StatKind::Counter,
            is_null: true,
        };
        assert_eq!(sample.value(), None);

        let sample = Sample {
            is_null: false,
            ..sample
        };
        assert_eq!(sample.value(), Some(42));
    }

    #[test]
    fn metric_value_serializes_as_bare_json() {
        assert_eq!(serde_json::to_string(&MetricValue::Null).unwrap(), "null");
        assert_eq!(serde_json::to_string(&MetricValue::Gauge(7)).unwrap(), "7");
        assert_eq!(serde_json::to_string(&MetricValue::Rate(2.5)).unwrap(), "2.5");
    }

    #[test]
    fn batch_ids_round_trip_through_their_numeric_form() {
        for id in BatchId::ALL {
            assert_eq!(BatchId::try_from(id.as_u8()).unwrap(), id);
        }
    }

    #[test]
    fn unknown_stat_kind_is_rejected() {
        let err = "histogram".parse::<StatKind>().unwrap_err();
        assert!(err.contains("histogram"));
    }
}

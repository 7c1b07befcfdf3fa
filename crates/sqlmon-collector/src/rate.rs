//! Rate conversion for counters and derives.
//!
//! Gauges pass through untouched. For rate-type samples the engine keeps the
//! last raw value and its observation time per metric name, and emits
//! `(value - last) / elapsed_seconds` once a previous point exists.
//!
//! Counter wraparound is corrected by guessing the counter width from the
//! previous value: below 2^32 it is taken to be a 32-bit counter, otherwise
//! a 64-bit one. The source never reports the width, so a 64-bit counter
//! that wraps while still small is corrected with the wrong width.

use chrono::{DateTime, Utc};
use sqlmon_common::types::{MetricValue, Sample, StatKind, Stats};
use std::collections::HashMap;

const WIDTH_32: i128 = 1 << 32;
const WIDTH_64: i128 = 1 << 64;

/// Last observation of a rate-type metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateState {
    pub value: i64,
    pub observed_at: DateTime<Utc>,
}

/// Per-metric state for rate computation.
///
/// One engine belongs to one collector; it is not meant to be shared
/// between concurrent polls.
#[derive(Debug, Default)]
pub struct RateEngine {
    states: HashMap<String, RateState>,
}

impl RateEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Converts a batch observed now.
    pub fn update(&mut self, stats: &Stats) -> HashMap<String, MetricValue> {
        self.update_at(stats, Utc::now())
    }

    /// Converts a batch observed at `now`.
    pub fn update_at(&mut self, stats: &Stats, now: DateTime<Utc>) -> HashMap<String, MetricValue> {
        let mut out = HashMap::with_capacity(stats.len());
        self.update_into(&mut out, stats, now);
        out
    }

    /// Converts a batch observed at `now`, merging the outputs into `out`.
    pub fn update_into(
        &mut self,
        out: &mut HashMap<String, MetricValue>,
        stats: &Stats,
        now: DateTime<Utc>,
    ) {
        for (name, sample) in stats {
            let value = self.observe(name, sample, now);
            out.insert(name.clone(), value);
        }
    }

    fn observe(&mut self, name: &str, sample: &Sample, now: DateTime<Utc>) -> MetricValue {
        if !sample.kind.is_rate() {
            return sample.value().into();
        }

        let Some(value) = sample.value() else {
            if self.states.remove(name).is_some() {
                tracing::debug!(metric = name, "Null observation, rate state cleared");
            }
            return MetricValue::Null;
        };

        let current = RateState {
            value,
            observed_at: now,
        };

        let Some(previous) = self.states.insert(name.to_string(), current) else {
            return MetricValue::Null;
        };

        let elapsed = elapsed_secs(previous.observed_at, now);
        if elapsed <= 0.0 {
            tracing::warn!(
                metric = name,
                elapsed_secs = elapsed,
                "Non-positive interval between observations, restarting rate"
            );
            return MetricValue::Null;
        }

        let delta = corrected_delta(sample.kind, previous.value, value);
        MetricValue::Rate(delta as f64 / elapsed)
    }

    /// Current state for `name`, if a rate window is open.
    pub fn state(&self, name: &str) -> Option<&RateState> {
        self.states.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

/// Change between two raw values, corrected for wraparound on counters.
///
/// # Examples
///
/// ```
/// use sqlmon_collector::rate::corrected_delta;
/// use sqlmon_common::types::StatKind;
///
/// assert_eq!(corrected_delta(StatKind::Counter, 4_294_967_290, 5), 11);
/// assert_eq!(corrected_delta(StatKind::Derive, 20, 5), -15);
/// ```
pub fn corrected_delta(kind: StatKind, previous: i64, current: i64) -> i128 {
    let delta = i128::from(current) - i128::from(previous);
    if kind != StatKind::Counter || delta >= 0 {
        return delta;
    }

    let width = if i128::from(previous) < WIDTH_32 {
        WIDTH_32
    } else {
        WIDTH_64
    };
    delta + width
}

fn elapsed_secs(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    let micros = (to - from).num_microseconds().unwrap_or(i64::MAX);
    micros as f64 / 1_000_000.0
}

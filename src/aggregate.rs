//! Aggregation engine
//!
//! Computes average, peak and RMS over the most recent window of readings
//! of each requested channel. Structured values are projected to a scalar
//! through [`Value::magnitude`](crate::protocol::Value::magnitude); values
//! without a projection (locations) are not counted.

use crate::error::ValidationError;
use crate::protocol::Channel;
use crate::store::ChannelStore;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// Default number of readings per channel considered by an aggregation
pub const DEFAULT_WINDOW: usize = 100;

/// Statistic computed over a window
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    Average,
    Peak,
    Rms,
}

impl Metric {
    /// Every metric
    pub const ALL: [Metric; 3] = [Metric::Average, Metric::Peak, Metric::Rms];

    /// API name
    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Average => "average",
            Metric::Peak => "peak",
            Metric::Rms => "rms",
        }
    }

    /// Compute this metric over `values`, `None` when empty
    pub fn compute(&self, values: &[f64]) -> Option<f64> {
        if values.is_empty() {
            return None;
        }
        let n = values.len() as f64;
        Some(match self {
            Metric::Average => values.iter().sum::<f64>() / n,
            Metric::Peak => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            Metric::Rms => (values.iter().map(|v| v * v).sum::<f64>() / n).sqrt(),
        })
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Metric {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "average" => Ok(Metric::Average),
            "peak" => Ok(Metric::Peak),
            "rms" => Ok(Metric::Rms),
            _ => Err(ValidationError::InvalidMetric(s.to_string())),
        }
    }
}

/// Set of requested metrics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricSet(BTreeSet<Metric>);

impl Default for MetricSet {
    fn default() -> Self {
        Self::all()
    }
}

impl MetricSet {
    /// All three metrics
    pub fn all() -> Self {
        Self(Metric::ALL.into_iter().collect())
    }

    /// Parse a comma-separated list; an empty list means all metrics
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let set = raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::parse)
            .collect::<Result<BTreeSet<Metric>, _>>()?;

        if set.is_empty() {
            Ok(Self::all())
        } else {
            Ok(Self(set))
        }
    }

    /// Iterate in a stable order
    pub fn iter(&self) -> impl Iterator<Item = Metric> + '_ {
        self.0.iter().copied()
    }

    /// Whether `metric` was requested
    pub fn contains(&self, metric: Metric) -> bool {
        self.0.contains(&metric)
    }
}

impl FromIterator<Metric> for MetricSet {
    fn from_iter<I: IntoIterator<Item = Metric>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Aggregates for one channel
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelSummary {
    /// When the summary was computed
    pub timestamp: DateTime<Utc>,
    /// Requested metrics; `None` when the window has no projectable value
    pub metrics: BTreeMap<Metric, Option<f64>>,
    /// Distinct devices in the window
    pub device_count: usize,
    /// Readings in the window
    pub reading_count: usize,
}

/// Aggregate the last `window` readings of each named channel.
///
/// Unknown channel names are skipped.
pub fn aggregate(
    store: &ChannelStore,
    channels: &[&str],
    window: usize,
    metrics: &MetricSet,
) -> BTreeMap<Channel, ChannelSummary> {
    let now = Utc::now();
    channels
        .iter()
        .filter_map(|name| name.trim().parse::<Channel>().ok())
        .map(|channel| (channel, summarize(store, channel, window, metrics, now)))
        .collect()
}

/// Aggregate one channel
pub fn summarize(
    store: &ChannelStore,
    channel: Channel,
    window: usize,
    metrics: &MetricSet,
    now: DateTime<Utc>,
) -> ChannelSummary {
    let readings = store.read_window(channel, window);
    let values: Vec<f64> = readings.iter().filter_map(|r| r.value.magnitude()).collect();
    let devices: BTreeSet<u16> = readings.iter().map(|r| r.device_id).collect();

    ChannelSummary {
        timestamp: now,
        metrics: metrics.iter().map(|m| (m, m.compute(&values))).collect(),
        device_count: devices.len(),
        reading_count: readings.len(),
    }
}

//! Query engine
//!
//! Read-only views over a [`ChannelStore`]: time-filtered series, bounded
//! history, latest values and device listing. Parameters arrive as raw
//! strings from the HTTP layer and are validated here, so the same rules
//! apply to every caller.

use crate::error::ValidationError;
use crate::protocol::{Channel, Reading};
use crate::store::{ChannelStore, StoreStats};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Default number of entries returned by a history query
pub const DEFAULT_HISTORY_LIMIT: usize = 100;

/// How a series query treats a time range with only one bound
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeRangePolicy {
    /// Both bounds or neither
    #[default]
    RequireBoth,
    /// Either bound may be given alone
    AllowOpen,
}

/// Validated parameters of a series query
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesQuery {
    pub channel: Channel,
    pub device_id: Option<u16>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl SeriesQuery {
    /// Unfiltered query over a whole channel
    pub fn new(channel: Channel) -> Self {
        Self {
            channel,
            device_id: None,
            start: None,
            end: None,
        }
    }

    /// Validate raw parameters.
    ///
    /// Checks run in order: channel, time range, device id. Empty strings
    /// count as absent.
    pub fn parse(
        channel: &str,
        device_id: Option<&str>,
        start: Option<&str>,
        end: Option<&str>,
        policy: TimeRangePolicy,
    ) -> Result<Self, ValidationError> {
        let channel: Channel = channel.parse()?;

        let start = non_empty(start).map(parse_timestamp).transpose()?;
        let end = non_empty(end).map(parse_timestamp).transpose()?;

        match (start, end) {
            (Some(s), Some(e)) if s > e => {
                return Err(ValidationError::InvalidTimeRange(format!(
                    "startTime {} is after endTime {}",
                    s.to_rfc3339(),
                    e.to_rfc3339()
                )));
            }
            (Some(_), None) | (None, Some(_)) if policy == TimeRangePolicy::RequireBoth => {
                return Err(ValidationError::InvalidTimeRange(
                    "both startTime and endTime must be provided".to_string(),
                ));
            }
            _ => {}
        }

        let device_id = non_empty(device_id).map(parse_device_id).transpose()?;

        Ok(Self {
            channel,
            device_id,
            start,
            end,
        })
    }

    fn matches(&self, reading: &Reading) -> bool {
        self.device_id.map_or(true, |id| reading.device_id == id)
            && self.start.map_or(true, |s| reading.timestamp >= s)
            && self.end.map_or(true, |e| reading.timestamp <= e)
    }
}

/// Validated parameters of a history query
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryQuery {
    pub channel: Channel,
    pub limit: usize,
    pub device_id: Option<u16>,
}

impl HistoryQuery {
    /// Validate raw parameters.
    ///
    /// A missing, non-numeric or non-positive limit falls back to
    /// [`DEFAULT_HISTORY_LIMIT`].
    pub fn parse(
        channel: &str,
        limit: Option<&str>,
        device_id: Option<&str>,
    ) -> Result<Self, ValidationError> {
        let channel: Channel = channel.parse()?;
        let limit = non_empty(limit)
            .and_then(|l| l.trim().parse::<i64>().ok())
            .filter(|l| *l > 0)
            .map_or(DEFAULT_HISTORY_LIMIT, |l| {
                usize::try_from(l).unwrap_or(usize::MAX)
            });
        let device_id = non_empty(device_id).map(parse_device_id).transpose()?;

        Ok(Self {
            channel,
            limit,
            device_id,
        })
    }
}

/// Read-only query facade over a store
#[derive(Debug, Clone, Copy)]
pub struct QueryEngine<'a> {
    store: &'a ChannelStore,
}

impl<'a> QueryEngine<'a> {
    /// Create a query engine over `store`
    pub fn new(store: &'a ChannelStore) -> Self {
        Self { store }
    }

    /// Readings matching the query, oldest first
    pub fn query(&self, query: &SeriesQuery) -> Vec<Reading> {
        self.store
            .read_all(query.channel)
            .into_iter()
            .filter(|r| query.matches(r))
            .collect()
    }

    /// Up to `limit` most recent readings, newest first
    pub fn history(&self, query: &HistoryQuery) -> Vec<Reading> {
        let mut readings: Vec<Reading> = self
            .store
            .read_all(query.channel)
            .into_iter()
            .filter(|r| query.device_id.map_or(true, |id| r.device_id == id))
            .collect();

        let skip = readings.len().saturating_sub(query.limit);
        readings.drain(..skip);
        readings.reverse();
        readings
    }

    /// Latest reading of every channel, `None` where nothing matches
    pub fn latest_all(&self, device_id: Option<u16>) -> BTreeMap<Channel, Option<Reading>> {
        Channel::ALL
            .iter()
            .map(|c| (*c, self.store.read_latest(*c, device_id)))
            .collect()
    }

    /// Device ids seen in retained history, ascending
    pub fn list_devices(&self) -> Vec<u16> {
        self.store.devices().into_iter().collect()
    }

    /// Store statistics
    pub fn stats(&self) -> StoreStats {
        self.store.stats()
    }
}

/// Parse a device filter: a positive integer that fits a `u16`
pub fn parse_device_id(raw: &str) -> Result<u16, ValidationError> {
    match raw.trim().parse::<u16>() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(ValidationError::InvalidDeviceId(raw.to_string())),
    }
}

/// Parse an optional device filter, treating an empty string as absent
pub fn parse_optional_device_id(raw: Option<&str>) -> Result<Option<u16>, ValidationError> {
    non_empty(raw).map(parse_device_id).transpose()
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, ValidationError> {
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| ValidationError::InvalidTimeRange(format!("'{}': {}", raw, e)))
}

fn non_empty(raw: Option<&str>) -> Option<&str> {
    raw.filter(|s| !s.trim().is_empty())
}

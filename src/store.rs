//! Bounded per-channel reading store
//!
//! Each channel keeps its readings in arrival order in a ring of at most
//! `capacity` entries. When a push would exceed the capacity the oldest
//! reading of that channel is evicted.
//!
//! The store is shared between the ingestion task, the rule scheduler and
//! the HTTP handlers, so all access goes through an internal `RwLock` and
//! readers always get cloned snapshots.

use crate::protocol::{Channel, Reading, ReadingSet, Value};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Default per-channel capacity
pub const DEFAULT_CAPACITY: usize = 1000;

/// Thread-safe bounded store of readings keyed by channel
#[derive(Debug)]
pub struct ChannelStore {
    capacity: usize,
    channels: RwLock<HashMap<Channel, VecDeque<Reading>>>,
}

impl Default for ChannelStore {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl ChannelStore {
    /// Create a store keeping at most `capacity` readings per channel.
    ///
    /// A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            channels: RwLock::new(HashMap::new()),
        }
    }

    /// Per-channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append one reading per `(channel, value)` pair, all stamped alike.
    ///
    /// Returns the number of readings appended.
    pub fn write<I>(&self, device_id: u16, timestamp: DateTime<Utc>, values: I) -> usize
    where
        I: IntoIterator<Item = (Channel, Value)>,
    {
        let mut guard = self.write_guard();
        let mut count = 0;
        for (channel, value) in values {
            self.push(&mut guard, Reading::new(timestamp, device_id, channel, value));
            count += 1;
        }
        count
    }

    /// Append every reading of a decoded set under a single write lock
    pub fn ingest(&self, set: &ReadingSet) -> usize {
        let mut guard = self.write_guard();
        for reading in &set.readings {
            self.push(&mut guard, reading.clone());
        }
        set.readings.len()
    }

    /// Snapshot of a channel, oldest first
    pub fn read_all(&self, channel: Channel) -> Vec<Reading> {
        self.read_guard()
            .get(&channel)
            .map(|q| q.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Last `n` readings of a channel, oldest first
    pub fn read_window(&self, channel: Channel, n: usize) -> Vec<Reading> {
        self.read_guard()
            .get(&channel)
            .map(|q| q.iter().skip(q.len().saturating_sub(n)).cloned().collect())
            .unwrap_or_default()
    }

    /// Most recent reading of a channel, optionally restricted to one device
    pub fn read_latest(&self, channel: Channel, device_id: Option<u16>) -> Option<Reading> {
        let guard = self.read_guard();
        let queue = guard.get(&channel)?;
        match device_id {
            None => queue.back().cloned(),
            Some(id) => queue.iter().rev().find(|r| r.device_id == id).cloned(),
        }
    }

    /// Number of readings currently held for a channel
    pub fn len(&self, channel: Channel) -> usize {
        self.read_guard().get(&channel).map_or(0, VecDeque::len)
    }

    /// Total number of readings across all channels
    pub fn total_len(&self) -> usize {
        self.read_guard().values().map(VecDeque::len).sum()
    }

    /// True when no channel holds any reading
    pub fn is_empty(&self) -> bool {
        self.total_len() == 0
    }

    /// Distinct device ids present in retained history
    pub fn devices(&self) -> BTreeSet<u16> {
        self.read_guard()
            .values()
            .flat_map(|q| q.iter().map(|r| r.device_id))
            .collect()
    }

    /// Per-channel counts and latest readings
    pub fn stats(&self) -> StoreStats {
        let guard = self.read_guard();
        let channels = guard
            .iter()
            .filter(|(_, q)| !q.is_empty())
            .map(|(channel, q)| {
                (
                    *channel,
                    ChannelStats {
                        count: q.len(),
                        latest: q.back().cloned(),
                    },
                )
            })
            .collect();

        StoreStats {
            capacity: self.capacity,
            total_readings: guard.values().map(VecDeque::len).sum(),
            channels,
        }
    }

    fn push(&self, guard: &mut HashMap<Channel, VecDeque<Reading>>, reading: Reading) {
        let queue = guard.entry(reading.channel).or_default();
        while queue.len() >= self.capacity {
            queue.pop_front();
        }
        queue.push_back(reading);
    }

    fn read_guard(&self) -> RwLockReadGuard<'_, HashMap<Channel, VecDeque<Reading>>> {
        self.channels.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_guard(&self) -> RwLockWriteGuard<'_, HashMap<Channel, VecDeque<Reading>>> {
        self.channels.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Store-wide statistics
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    pub capacity: usize,
    pub total_readings: usize,
    pub channels: BTreeMap<Channel, ChannelStats>,
}

/// Statistics for one channel
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelStats {
    pub count: usize,
    pub latest: Option<Reading>,
}

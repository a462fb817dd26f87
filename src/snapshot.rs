//! Point-in-time captures of a counter.
//!
//! A [`StatsSnapshot`] pairs what a counter holds (its total and shard count,
//! read from the store) with what its handle did (the [`OperationStats`]
//! tallies). Observers render snapshots; with the `serde` feature they can
//! also be serialized with any serde format.
//!
//! # Examples
//!
//! ```rust
//! use sommatori::counter::ShardedCounter;
//! use sommatori::keys::Namespace;
//! use sommatori::store::memory::MemoryStore;
//!
//! let counter = ShardedCounter::new(MemoryStore::new(), Namespace::new("orders"));
//! counter.increment(3)?;
//!
//! let snapshot = counter.snapshot()?;
//! assert_eq!(snapshot.total, Some(3));
//! assert_eq!(snapshot.get("increments").map(|e| e.value), Some(1));
//! # Ok::<(), sommatori::error::CounterError>(())
//! ```

use crate::counter::ShardedCounter;
use crate::error::Result;
use crate::keys::Namespace;
use crate::shard_id::ShardIdSource;
use crate::stats::{OperationStats, Tally};
use crate::store::Store;

/// One named tally value.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StatEntry {
    /// Name of the tally.
    pub name: String,
    /// Its value at capture time.
    pub value: u64,
}

impl StatEntry {
    /// Creates an entry.
    pub fn new(name: impl Into<String>, value: u64) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// The state of one counter at a point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StatsSnapshot {
    /// Name of the counter's namespace.
    pub namespace: String,
    /// The counter's total, when it was read.
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub total: Option<i64>,
    /// Number of shards, when it was read.
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub shards: Option<usize>,
    /// Operation tallies.
    pub stats: Vec<StatEntry>,
}

impl StatsSnapshot {
    /// Captures the tallies of `stats`.
    pub fn capture(namespace: &Namespace, stats: &OperationStats) -> Self {
        Self::from_tallies(namespace, stats, Tally::value)
    }

    /// Captures the tallies of `stats` and zeroes them.
    pub fn capture_and_reset(namespace: &Namespace, stats: &OperationStats) -> Self {
        Self::from_tallies(namespace, stats, Tally::value_and_reset)
    }

    fn from_tallies(
        namespace: &Namespace,
        stats: &OperationStats,
        read: impl Fn(&Tally) -> u64,
    ) -> Self {
        Self {
            namespace: namespace.to_string(),
            total: None,
            shards: None,
            stats: stats
                .tallies()
                .iter()
                .map(|tally| StatEntry::new(tally.name(), read(tally)))
                .collect(),
        }
    }

    /// Records the counter's total.
    pub fn with_total(mut self, total: i64) -> Self {
        self.total = Some(total);
        self
    }

    /// Records the counter's shard count.
    pub fn with_shards(mut self, shards: usize) -> Self {
        self.shards = Some(shards);
        self
    }

    /// Finds a tally by name.
    pub fn get(&self, name: &str) -> Option<&StatEntry> {
        self.stats.iter().find(|entry| entry.name == name)
    }
}

impl<S: Store, G: ShardIdSource> ShardedCounter<S, G> {
    /// Captures the total, the shard count and the operation tallies.
    ///
    /// Total and shard count come from two separate snapshots and may
    /// disagree under concurrent writes.
    pub fn snapshot(&self) -> Result<StatsSnapshot> {
        let shards = self.shard_count()?;
        let total = self.get_total()?;
        Ok(StatsSnapshot::capture(self.namespace(), self.stats())
            .with_total(total)
            .with_shards(shards))
    }
}

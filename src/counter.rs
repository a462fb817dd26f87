//! The high-contention counter.
//!
//! A [`ShardedCounter`] is never stored as a single record. Its value is the
//! sum of many small deltas (shards) kept under the counter's [`Namespace`]:
//!
//! ```text
//!   increment(+5) ─► shard 9c1f04e2 += 5 ─┐
//!   increment(+3) ─► shard 03aa7710 += 3 ─┼─►  namespace range  ─► get_total()
//!   increment(-2) ─► shard e4015b9d += -2 ┘   [9c1f.., 03aa.., e401..]  = 6
//!                                                   │
//!                                                compact()
//!                                                   ▼
//!                                             [5d02c0a1: 6]
//! ```
//!
//! # Writing
//!
//! [`increment`](ShardedCounter::increment) draws a fresh random shard id and
//! adds its delta to that one key. With a store offering atomic add the write
//! carries no read dependency at all; otherwise it reads and rewrites only its
//! own shard. Either way two increments only ever contend if they picked the
//! same id, so any number of writers proceed in parallel.
//!
//! # Reading
//!
//! [`get_total`](ShardedCounter::get_total) scans the whole namespace range in
//! one snapshot and sums it. The result reflects exactly the increments
//! committed before the snapshot. The snapshot read registers no conflict, so
//! readers never slow writers down.
//!
//! # Compacting
//!
//! Every increment may add a shard. [`compact`](ShardedCounter::compact)
//! folds all of them into one inside a single serializable transaction. That
//! transaction covers the whole namespace and therefore conflicts with any
//! increment committing meanwhile, so it is meant to run occasionally, e.g.
//! through [`maybe_compact`](ShardedCounter::maybe_compact).
//!
//! # Retries
//!
//! Conflicts and transient store failures are retried with a new transaction
//! (and, for writes, a new shard id) up to
//! [`CounterConfig::max_attempts`]; past that the call fails with
//! [`CounterError::ContentionExhausted`] and has not taken effect.
//!
//! # Example
//!
//! ```rust
//! use sommatori::counter::ShardedCounter;
//! use sommatori::keys::Namespace;
//! use sommatori::store::memory::MemoryStore;
//!
//! let counter = ShardedCounter::new(MemoryStore::new(), Namespace::new("orders"));
//!
//! counter.increment(5)?;
//! counter.increment(3)?;
//! counter.increment(-2)?;
//! assert_eq!(counter.get_total()?, 6);
//!
//! counter.compact()?;
//! assert_eq!(counter.get_total()?, 6);
//! assert_eq!(counter.shard_count()?, 1);
//! # Ok::<(), sommatori::error::CounterError>(())
//! ```

use std::fmt;

use rand::Rng;
use tracing::{debug, trace, warn};

use crate::config::CounterConfig;
use crate::error::{CounterError, Operation, Result};
use crate::keys::{decode_delta, encode_delta, hex, KeyError, Namespace, ShardId};
use crate::shard_id::{RandomShardIds, ShardIdSource};
use crate::stats::{OperationStats, Tally};
use crate::store::{KeyRange, RangeOptions, Store, Transaction};

/// Isolation of a total read inside a caller's transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadMode {
    /// Read without registering conflicts.
    Snapshot,
    /// Register the whole namespace as read: the transaction then conflicts
    /// with every increment committing before it does.
    Serializable,
}

/// Outcome of a [`ShardedCounter::compact`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompactionReport {
    /// Shards present before the compaction.
    pub shards_before: usize,
    /// The counter's total, now held by a single shard.
    pub total: i64,
}

#[derive(Debug)]
struct Shard {
    key: Vec<u8>,
    id: ShardId,
    delta: i64,
}

/// A counter sharded over a transactional key-value store.
///
/// The counter holds no in-process state about its value; any number of
/// `ShardedCounter` handles, in any number of processes, may address the same
/// namespace concurrently.
pub struct ShardedCounter<S, G = RandomShardIds> {
    store: S,
    namespace: Namespace,
    config: CounterConfig,
    ids: G,
    stats: OperationStats,
}

impl<S: Store> ShardedCounter<S, RandomShardIds> {
    /// A counter with the default configuration.
    pub fn new(store: S, namespace: Namespace) -> Self {
        Self {
            store,
            namespace,
            config: CounterConfig::default(),
            ids: RandomShardIds,
            stats: OperationStats::new(),
        }
    }

    /// A counter with `config`, after validating it.
    pub fn with_config(store: S, namespace: Namespace, config: CounterConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            store,
            namespace,
            config,
            ids: RandomShardIds,
            stats: OperationStats::new(),
        })
    }
}

impl<S: Store, G: ShardIdSource> ShardedCounter<S, G> {
    /// Replaces the shard id generator.
    pub fn with_id_source<H: ShardIdSource>(self, ids: H) -> ShardedCounter<S, H> {
        ShardedCounter {
            store: self.store,
            namespace: self.namespace,
            config: self.config,
            ids,
            stats: self.stats,
        }
    }

    /// The counter's namespace.
    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// The counter's configuration.
    pub fn config(&self) -> &CounterConfig {
        &self.config
    }

    /// Operation statistics of this handle.
    pub fn stats(&self) -> &OperationStats {
        &self.stats
    }

    /// The underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Adds `delta` (possibly negative) to the counter.
    ///
    /// A zero delta returns immediately. Arithmetic wraps on overflow.
    pub fn increment(&self, delta: i64) -> Result<()> {
        if delta == 0 {
            return Ok(());
        }
        self.run(
            Operation::Increment,
            &self.stats.increment_retries,
            true,
            |txn| self.increment_in(txn, delta),
        )?;
        self.stats.increments.incr();
        self.maybe_coalesce();
        Ok(())
    }

    /// Subtracts `delta` from the counter.
    pub fn decrement(&self, delta: i64) -> Result<()> {
        self.increment(delta.wrapping_neg())
    }

    /// Adds `delta` to a fresh shard inside the caller's transaction.
    ///
    /// Returns the shard written, or `None` for a zero delta. Committing and
    /// retrying are up to the caller.
    pub fn increment_in(&self, txn: &mut S::Txn, delta: i64) -> Result<Option<ShardId>> {
        if delta == 0 {
            return Ok(None);
        }
        let id = self.ids.next_id(self.config.shard_id_width);
        self.add_to_shard(txn, &id, delta)?;
        trace!(namespace = %self.namespace, shard = %id, delta, "shard write buffered");
        Ok(Some(id))
    }

    /// The counter's total, read from one consistent snapshot.
    ///
    /// Shards are summed with wrapping two's-complement arithmetic, the same
    /// as the stores' atomic add, so a total past `i64::MAX` wraps around.
    pub fn get_total(&self) -> Result<i64> {
        let total = self.run(
            Operation::GetTotal,
            &self.stats.read_retries,
            false,
            |txn| self.get_total_in(txn, ReadMode::Snapshot),
        )?;
        self.stats.reads.incr();
        Ok(total)
    }

    /// The counter's total as seen by the caller's transaction, including its
    /// own buffered increments. Wraps on overflow like [`get_total`].
    ///
    /// [`get_total`]: ShardedCounter::get_total
    pub fn get_total_in(&self, txn: &mut S::Txn, mode: ReadMode) -> Result<i64> {
        let options = RangeOptions::new().snapshot(mode == ReadMode::Snapshot);
        let shards = self.read_shards(txn, options)?;
        Ok(sum(&shards))
    }

    /// Every shard with its delta, from one snapshot.
    pub fn shards(&self) -> Result<Vec<(ShardId, i64)>> {
        self.run(
            Operation::GetTotal,
            &self.stats.read_retries,
            false,
            |txn| {
                let shards = self.read_shards(txn, RangeOptions::new().snapshot(true))?;
                Ok(shards.into_iter().map(|s| (s.id, s.delta)).collect())
            },
        )
    }

    /// Number of shards, from one snapshot.
    pub fn shard_count(&self) -> Result<usize> {
        self.run(
            Operation::GetTotal,
            &self.stats.read_retries,
            false,
            |txn| {
                let pairs =
                    txn.get_range(&self.namespace.range(), RangeOptions::new().snapshot(true))?;
                Ok(pairs.len())
            },
        )
    }

    /// Folds every shard into a single one holding the total.
    ///
    /// Runs as one serializable transaction over the whole namespace. A
    /// namespace with at most one shard is left untouched.
    pub fn compact(&self) -> Result<CompactionReport> {
        let report = self.run(
            Operation::Compact,
            &self.stats.compaction_retries,
            true,
            |txn| self.compact_in(txn),
        )?;
        if report.shards_before > 1 {
            self.stats.compactions.incr();
            self.stats.shards_coalesced.add(report.shards_before as u64);
            debug!(
                namespace = %self.namespace,
                shards = report.shards_before,
                total = report.total,
                "compacted"
            );
        }
        Ok(report)
    }

    /// Compacts only when the shard count exceeds
    /// [`CounterConfig::compact_threshold`].
    pub fn maybe_compact(&self) -> Result<Option<CompactionReport>> {
        let shards = self.shard_count()?;
        if shards <= self.config.compact_threshold {
            return Ok(None);
        }
        self.compact().map(Some)
    }

    /// Merges up to `limit` shards found from a random point of the id space.
    ///
    /// The shards are located with a snapshot read, then re-read
    /// serializably, deleted, and their sum added to a fresh shard. This is
    /// a single best-effort attempt that only conflicts with writers of the
    /// shards it picked. Returns the number of shards merged.
    pub fn coalesce(&self, limit: usize) -> Result<usize> {
        let mut txn = self.store.begin()?;
        let merged = self.coalesce_in(&mut txn, limit)?;
        if merged == 0 {
            return Ok(0);
        }
        self.store.commit(txn)?;

        self.stats.compactions.incr();
        self.stats.shards_coalesced.add(merged as u64);
        trace!(namespace = %self.namespace, merged, "coalesced shards");
        Ok(merged)
    }

    /// Sets the counter to `value`.
    ///
    /// Reads the total serializably and writes the difference as a new shard
    /// in the same transaction, so the result is exact even under concurrent
    /// increments (which make this call retry).
    pub fn set_total(&self, value: i64) -> Result<()> {
        self.run(
            Operation::SetTotal,
            &self.stats.increment_retries,
            true,
            |txn| {
                let current = self.get_total_in(txn, ReadMode::Serializable)?;
                self.increment_in(txn, value.wrapping_sub(current))?;
                Ok(())
            },
        )
    }

    /// Deletes every shard, destroying the counter.
    pub fn clear(&self) -> Result<()> {
        self.run(
            Operation::Clear,
            &self.stats.compaction_retries,
            true,
            |txn| {
                txn.clear_range(&self.namespace.range());
                Ok(())
            },
        )?;
        debug!(namespace = %self.namespace, "cleared");
        Ok(())
    }

    fn add_to_shard(&self, txn: &mut S::Txn, id: &ShardId, delta: i64) -> Result<()> {
        let key = self.namespace.shard_key(id);
        if txn.supports_atomic_add() {
            txn.atomic_add(&key, delta)?;
        } else {
            let current = match txn.get(&key)? {
                Some(value) => {
                    decode_delta(&value).map_err(|reason| corrupt_value(&key, reason))?
                }
                None => 0,
            };
            txn.set(&key, &encode_delta(current.wrapping_add(delta)));
        }
        Ok(())
    }

    fn compact_in(&self, txn: &mut S::Txn) -> Result<CompactionReport> {
        let shards = self.read_shards(txn, RangeOptions::new())?;
        let total = sum(&shards);
        if shards.len() > 1 {
            for shard in &shards {
                txn.clear(&shard.key);
            }
            let id = self.ids.next_id(self.config.shard_id_width);
            txn.set(&self.namespace.shard_key(&id), &encode_delta(total));
        }
        Ok(CompactionReport {
            shards_before: shards.len(),
            total,
        })
    }

    fn coalesce_in(&self, txn: &mut S::Txn, limit: usize) -> Result<usize> {
        let pivot = self
            .namespace
            .shard_key(&self.ids.next_id(self.config.shard_id_width));
        let range = self.namespace.range();
        let reverse = rand::thread_rng().gen_bool(0.5);
        let scan = if reverse {
            KeyRange::new(range.start, pivot)
        } else {
            KeyRange::new(pivot, range.end)
        };

        let options = RangeOptions::new()
            .snapshot(true)
            .limit(limit)
            .reverse(reverse);
        let candidates = txn.get_range(&scan, options)?;
        if candidates.len() < 2 {
            return Ok(0);
        }

        let mut total = 0i64;
        for (key, _) in &candidates {
            self.namespace
                .decode(key)
                .map_err(|reason| corrupt_key(key, reason))?;
            if let Some(value) = txn.get(key)? {
                let delta = decode_delta(&value).map_err(|reason| corrupt_value(key, reason))?;
                total = total.wrapping_add(delta);
            }
            txn.clear(key);
        }
        // The fresh id may already hold a shard outside the batch.
        let id = self.ids.next_id(self.config.shard_id_width);
        self.add_to_shard(txn, &id, total)?;
        Ok(candidates.len())
    }

    fn read_shards(&self, txn: &mut S::Txn, options: RangeOptions) -> Result<Vec<Shard>> {
        txn.get_range(&self.namespace.range(), options)?
            .into_iter()
            .map(|(key, value)| {
                let id = self
                    .namespace
                    .decode(&key)
                    .map_err(|reason| corrupt_key(&key, reason))?;
                let delta = decode_delta(&value).map_err(|reason| corrupt_value(&key, reason))?;
                Ok(Shard { key, id, delta })
            })
            .collect()
    }

    fn maybe_coalesce(&self) {
        let probability = self.config.coalesce_probability;
        if probability <= 0.0 || !rand::thread_rng().gen_bool(probability) {
            return;
        }
        match self.coalesce(self.config.coalesce_batch) {
            Ok(_) => {}
            Err(err) if err.is_retryable() => {
                debug!(namespace = %self.namespace, error = %err, "coalesce lost a race");
            }
            Err(err) => {
                warn!(namespace = %self.namespace, error = %err, "coalesce failed");
            }
        }
    }

    /// Runs `body` in fresh transactions until it succeeds, fails for good,
    /// or the attempt bound is reached.
    fn run<T>(
        &self,
        operation: Operation,
        retries: &Tally,
        commit: bool,
        mut body: impl FnMut(&mut S::Txn) -> Result<T>,
    ) -> Result<T> {
        let attempts = self.config.max_attempts;
        for attempt in 1..=attempts {
            match self.attempt(commit, &mut body) {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() => {
                    retries.incr();
                    debug!(
                        namespace = %self.namespace,
                        %operation,
                        attempt,
                        error = %err,
                        "retrying"
                    );
                }
                Err(err) => return Err(err),
            }
        }
        self.stats.contention_exhausted.incr();
        warn!(namespace = %self.namespace, %operation, attempts, "giving up");
        Err(CounterError::ContentionExhausted {
            operation,
            attempts,
        })
    }

    fn attempt<T>(
        &self,
        commit: bool,
        body: &mut impl FnMut(&mut S::Txn) -> Result<T>,
    ) -> Result<T> {
        let mut txn = self.store.begin()?;
        let value = body(&mut txn)?;
        if commit {
            self.store.commit(txn)?;
        }
        Ok(value)
    }
}

impl<S, G> fmt::Debug for ShardedCounter<S, G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShardedCounter")
            .field("namespace", &self.namespace)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Wrapping sum of the shard deltas.
fn sum(shards: &[Shard]) -> i64 {
    shards
        .iter()
        .fold(0i64, |acc, shard| acc.wrapping_add(shard.delta))
}

fn corrupt_key(key: &[u8], reason: KeyError) -> CounterError {
    CounterError::CorruptShardKey {
        key: hex(key),
        reason,
    }
}

fn corrupt_value(key: &[u8], reason: KeyError) -> CounterError {
    CounterError::CorruptShardValue {
        key: hex(key),
        reason,
    }
}

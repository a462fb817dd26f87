//! # Sommatori - High-Contention Counters on Transactional Key-Value Stores
//!
//! A Rust library implementing counters that many writers can update at once
//! on top of an ordered, transactional key-value store, without every update
//! conflicting with every other one.
//!
//! ## The Problem
//!
//! The obvious way to keep a counter in a transactional store is one key
//! holding the value: read it, add, write it back. Under optimistic
//! concurrency control every such transaction reads and writes the same key,
//! so any two concurrent updates conflict and all but one are aborted and
//! retried. Throughput collapses to roughly one update per commit latency, no
//! matter how many writers there are.
//!
//! ## The Solution: Sharded Counters
//!
//! A [`ShardedCounter`](counter::ShardedCounter) stores its value as many
//! small deltas (shards) under a reserved key range:
//!
//! 1. **Blind writes**: an increment adds its delta to a freshly drawn random
//!    shard key. It never reads the counter's value, and with atomic add it
//!    reads nothing at all, so concurrent increments do not conflict.
//!
//! 2. **Aggregation on Read**: the total is the sum of every shard in the
//!    range, read inside one snapshot, so it is exact as of that snapshot and
//!    never blocks writers.
//!
//! 3. **Compaction**: shards accumulate, so the range is periodically folded
//!    into a single shard holding the total, in one serializable transaction.
//!
//! 4. **Bounded retries**: conflicts and transient store failures are retried
//!    a bounded number of times; past that, the caller gets
//!    [`ContentionExhausted`](error::CounterError::ContentionExhausted) and the
//!    operation has not happened.
//!
//! ```text
//!   writer A ──► [ns|9c1f04e2] += 5 ┐
//!   writer B ──► [ns|03aa7710] += 3 ├──► get_total() = Σ range = 6
//!   writer C ──► [ns|e4015b9d] += -2┘
//! ```
//!
//! It is the same pattern as a per-thread sharded in-memory counter (each
//! writer touches its own slot, reads add the slots up), moved into a
//! transactional store where the "slots" are keys and the "cache line
//! bouncing" is transaction conflicts.
//!
//! ## Quick Start
//!
//! ```rust
//! use sommatori::counter::ShardedCounter;
//! use sommatori::keys::Namespace;
//! use sommatori::store::memory::MemoryStore;
//!
//! let store = MemoryStore::new();
//! let orders = ShardedCounter::new(store, Namespace::new("orders"));
//!
//! // Increment from any thread, any process
//! orders.increment(5)?;
//! orders.increment(3)?;
//! orders.decrement(2)?;
//!
//! // Read the total (aggregates all shards in one snapshot)
//! assert_eq!(orders.get_total()?, 6);
//!
//! // Fold the shards together
//! orders.compact()?;
//! assert_eq!(orders.shard_count()?, 1);
//! # Ok::<(), sommatori::error::CounterError>(())
//! ```
//!
//! ## Stores
//!
//! The counter runs on anything implementing [`Store`](store::Store) and
//! [`Transaction`](store::Transaction): snapshot and serializable point and
//! range reads, writes, clears, and optionally a little-endian atomic add.
//! The crate ships [`MemoryStore`](store::memory::MemoryStore), an in-process
//! MVCC store with optimistic validation and fault injection, used by the
//! tests, the benchmark and the demo.
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`counter`] | The sharded counter and its operations |
//! | [`store`] | Transactional store abstraction and the in-memory store |
//! | [`keys`] | Namespace and shard key codec |
//! | [`shard_id`] | Shard id generation and width sizing |
//! | [`config`] | Tuning parameters |
//! | [`error`] | Error types |
//! | [`stats`] | Per-handle operation statistics |
//! | [`snapshot`] | Point-in-time captures of a counter |
//! | [`observers`] | Table and JSON rendering of snapshots |
//!
//! ## Logging
//!
//! Operations emit [`tracing`] events: `trace` for every buffered shard
//! write, `debug` for retries and compactions, `warn` when an operation gives
//! up or an opportunistic coalesce fails for good. Install any subscriber to
//! see them.
//!
//! ## Observers
//!
//! | Feature | Module | Description |
//! |---------|--------|-------------|
//! | `table` | [`observers::table`] | Pretty-print snapshots as tables |
//! | `json` | [`observers::json`] | Serialize snapshots to JSON |
//! | `serde` | | `Serialize`/`Deserialize` for snapshots and configuration |
//! | `full` | All observers | Enables all observer modules |
//!
//! ```rust,ignore
//! use sommatori::observers::table::TableObserver;
//!
//! println!("{}", TableObserver::new().render([&orders.snapshot()?]));
//! ```

pub mod config;
pub mod counter;
pub mod error;
pub mod keys;
pub mod observers;
pub mod shard_id;
pub mod snapshot;
pub mod stats;
pub mod store;

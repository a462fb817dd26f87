//! In-process operation statistics.
//!
//! Every [`ShardedCounter`](crate::counter::ShardedCounter) keeps a set of
//! [`Tally`] cells counting what its operations did: commits, retries,
//! compactions, exhausted calls. Those cells are hit by every writer thread,
//! so they use the same trick as the stored counter itself, in memory: each
//! thread bumps its own cache-padded slot and a read sums the slots.
//!
//! ```text
//!                          ┌─────────────────────────────────────┐
//!                          │               Tally                 │
//!                          ├─────────────────────────────────────┤
//!   Thread 0 ──writes──►   │ [Slot 0] ████████ (CachePadded)     │
//!   Thread 1 ──writes──►   │ [Slot 1] ████████ (CachePadded)     │
//!        ...               │    ...                              │
//!   Thread 63 ─writes──►   │ [Slot 63] ███████ (CachePadded)     │
//!                          └─────────────────────────────────────┘
//!                                          │
//!                                          ▼
//!                                   value() aggregates
//!                                   all slots on read
//! ```
//!
//! Statistics are telemetry about operations. They never carry the counter's
//! value: the only authoritative total is the sum of the stored shards read
//! inside one snapshot.

use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use crossbeam_utils::CachePadded;

/// Number of slots per tally.
pub(crate) const NUM_COMPONENTS: usize = 64;

/// Global counter for assigning slot IDs to threads.
static NEXT_SLOT_ID: AtomicUsize = AtomicUsize::new(0);

thread_local! {
    /// Slot index of the current thread, assigned on first use.
    static THREAD_SLOT_INDEX: usize = next_slot_id();
}

/// Assigns the next slot round-robin, in `[0, NUM_COMPONENTS)`.
fn next_slot_id() -> usize {
    NEXT_SLOT_ID.fetch_add(1, Ordering::Relaxed) % NUM_COMPONENTS
}

/// A named, contention-free event count.
pub struct Tally {
    name: &'static str,
    components: [CachePadded<AtomicU64>; NUM_COMPONENTS],
}

impl Tally {
    /// Creates a tally at zero.
    pub const fn new(name: &'static str) -> Self {
        const ZERO: CachePadded<AtomicU64> = CachePadded::new(AtomicU64::new(0));
        Tally {
            name,
            components: [ZERO; NUM_COMPONENTS],
        }
    }

    /// The tally's name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    #[inline]
    fn local(&self) -> &AtomicU64 {
        THREAD_SLOT_INDEX.with(|idx| &self.components[*idx])
    }

    /// Adds `value` to the current thread's slot.
    #[inline]
    pub fn add(&self, value: u64) {
        self.local().fetch_add(value, Ordering::Relaxed);
    }

    /// Adds one.
    #[inline]
    pub fn incr(&self) {
        self.add(1);
    }

    /// Sum of all slots.
    pub fn value(&self) -> u64 {
        self.components
            .iter()
            .map(|slot| slot.load(Ordering::Relaxed))
            .fold(0u64, u64::wrapping_add)
    }

    /// Sum of all slots, zeroing each slot as it is read.
    ///
    /// Increments racing with the reset land either in the returned value or
    /// in the next one, never in both.
    pub fn value_and_reset(&self) -> u64 {
        self.components
            .iter()
            .map(|slot| slot.swap(0, Ordering::Relaxed))
            .fold(0u64, u64::wrapping_add)
    }
}

impl Debug for Tally {
    /// Formats the tally showing non-zero slots.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{{", self.name)?;
        for (i, slot) in self.components.iter().enumerate() {
            let val = slot.load(Ordering::Relaxed);
            if val != 0 {
                write!(f, " [{i}]:{val}")?;
            }
        }
        write!(f, " }}")
    }
}

/// The tallies kept by one counter.
#[derive(Debug)]
pub struct OperationStats {
    /// Committed increments.
    pub increments: Tally,
    /// Increment attempts that hit a retryable failure.
    pub increment_retries: Tally,
    /// Completed total reads.
    pub reads: Tally,
    /// Read attempts that hit a retryable failure.
    pub read_retries: Tally,
    /// Committed compactions and partial coalesces.
    pub compactions: Tally,
    /// Compaction attempts that hit a retryable failure.
    pub compaction_retries: Tally,
    /// Shard keys removed by compactions and coalesces.
    pub shards_coalesced: Tally,
    /// Calls that gave up with `ContentionExhausted`.
    pub contention_exhausted: Tally,
}

impl OperationStats {
    /// All tallies at zero.
    pub const fn new() -> Self {
        Self {
            increments: Tally::new("increments"),
            increment_retries: Tally::new("increment_retries"),
            reads: Tally::new("reads"),
            read_retries: Tally::new("read_retries"),
            compactions: Tally::new("compactions"),
            compaction_retries: Tally::new("compaction_retries"),
            shards_coalesced: Tally::new("shards_coalesced"),
            contention_exhausted: Tally::new("contention_exhausted"),
        }
    }

    /// The tallies in a fixed order.
    pub fn tallies(&self) -> [&Tally; 8] {
        [
            &self.increments,
            &self.increment_retries,
            &self.reads,
            &self.read_retries,
            &self.compactions,
            &self.compaction_retries,
            &self.shards_coalesced,
            &self.contention_exhausted,
        ]
    }

    /// Total retries across all operations.
    pub fn retries(&self) -> u64 {
        self.increment_retries.value()
            + self.read_retries.value()
            + self.compaction_retries.value()
    }
}

impl Default for OperationStats {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new() {
        let tally = Tally::new("t");
        assert_eq!(tally.value(), 0);
        assert_eq!(tally.name(), "t");
    }

    #[test]
    fn test_add() {
        let tally = Tally::new("t");
        tally.incr();
        tally.add(4);
        assert_eq!(tally.value(), 5);
    }

    #[test]
    fn test_value_and_reset() {
        let tally = Tally::new("t");
        tally.add(7);
        assert_eq!(tally.value_and_reset(), 7);
        assert_eq!(tally.value(), 0);
    }

    #[test]
    fn test_debug() {
        let tally = Tally::new("hits");
        tally.add(3);
        let debug_str = format!("{:?}", tally);
        assert!(debug_str.starts_with("hits{"));
        assert!(debug_str.contains(":3"));
        assert!(debug_str.ends_with("}"));
    }

    #[test]
    fn test_multiple_threads() {
        use std::sync::Arc;
        use std::thread;

        let tally = Arc::new(Tally::new("t"));
        let mut handles = vec![];

        for _ in 0..8 {
            let tally = Arc::clone(&tally);
            handles.push(thread::spawn(move || {
                for _ in 0..1000 {
                    tally.incr();
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(tally.value(), 8000);
    }

    #[test]
    fn test_static_stats() {
        static STATS: OperationStats = OperationStats::new();
        STATS.increment_retries.add(2);
        STATS.read_retries.incr();
        assert_eq!(STATS.retries(), 3);
    }

    #[test]
    fn test_tallies_order() {
        let stats = OperationStats::default();
        let names: Vec<_> = stats.tallies().iter().map(|t| t.name()).collect();
        assert_eq!(names[0], "increments");
        assert_eq!(names[7], "contention_exhausted");
        assert_eq!(names.len(), 8);
    }
}

//! Counter tuning parameters.
//!
//! [`CounterConfig`] gathers the knobs of the sharding protocol. The defaults
//! suit a deployment with up to 64 concurrent writers per counter:
//!
//! | Field | Default | Effect |
//! |-------|---------|--------|
//! | `shard_id_width` | 4 bytes | collision probability < 1e-6 at 64 writers |
//! | `max_attempts` | 5 | attempts per operation before `ContentionExhausted` |
//! | `compact_threshold` | 1024 | shard count above which `maybe_compact` compacts |
//! | `coalesce_probability` | 0.0 | chance an increment triggers a partial coalesce |
//! | `coalesce_batch` | 20 | shards merged by one partial coalesce |
//!
//! With the `serde` feature the struct can be embedded in an application's
//! own configuration; missing fields take their defaults.
//!
//! ```rust
//! use sommatori::config::CounterConfig;
//! use sommatori::shard_id::ShardIdWidth;
//!
//! let config = CounterConfig::new()
//!     .with_shard_id_width(ShardIdWidth::new(8).unwrap())
//!     .with_max_attempts(10)
//!     .with_coalesce_probability(0.1);
//! assert!(config.validate().is_ok());
//! ```

use crate::error::{CounterError, Result};
use crate::shard_id::ShardIdWidth;

/// Default retry bound.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default shard count above which [`maybe_compact`](crate::counter::ShardedCounter::maybe_compact) acts.
pub const DEFAULT_COMPACT_THRESHOLD: usize = 1024;

/// Default size of a partial coalesce.
pub const DEFAULT_COALESCE_BATCH: usize = 20;

/// Tuning parameters of a sharded counter.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
pub struct CounterConfig {
    /// Width of freshly drawn shard ids.
    pub shard_id_width: ShardIdWidth,
    /// Attempts per operation, at least 1.
    pub max_attempts: u32,
    /// Shard count above which `maybe_compact` compacts.
    pub compact_threshold: usize,
    /// Probability in `[0, 1]` that a successful increment runs a partial coalesce.
    pub coalesce_probability: f64,
    /// Shards merged by one partial coalesce, at least 1.
    pub coalesce_batch: usize,
}

impl CounterConfig {
    /// The default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the shard id width.
    pub fn with_shard_id_width(mut self, width: ShardIdWidth) -> Self {
        self.shard_id_width = width;
        self
    }

    /// Sizes shard ids for `writers` concurrent writers and a collision
    /// probability of at most `target`.
    pub fn for_peak_writers(mut self, writers: u64, target: f64) -> Self {
        self.shard_id_width = ShardIdWidth::for_collision_target(writers, target);
        self
    }

    /// Sets the retry bound.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Sets the compaction threshold.
    pub fn with_compact_threshold(mut self, shards: usize) -> Self {
        self.compact_threshold = shards;
        self
    }

    /// Sets the opportunistic coalescing probability.
    pub fn with_coalesce_probability(mut self, probability: f64) -> Self {
        self.coalesce_probability = probability;
        self
    }

    /// Sets the partial coalesce size.
    pub fn with_coalesce_batch(mut self, shards: usize) -> Self {
        self.coalesce_batch = shards;
        self
    }

    /// Checks every field is in range.
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(CounterError::InvalidConfig(
                "max_attempts must be at least 1".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.coalesce_probability) {
            return Err(CounterError::InvalidConfig(format!(
                "coalesce_probability {} outside [0, 1]",
                self.coalesce_probability
            )));
        }
        if self.coalesce_batch == 0 {
            return Err(CounterError::InvalidConfig(
                "coalesce_batch must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

impl Default for CounterConfig {
    fn default() -> Self {
        Self {
            shard_id_width: ShardIdWidth::default(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            compact_threshold: DEFAULT_COMPACT_THRESHOLD,
            coalesce_probability: 0.0,
            coalesce_batch: DEFAULT_COALESCE_BATCH,
        }
    }
}

//! Error types for counter operations.
//!
//! All public operations return [`Result`], whose error type [`CounterError`]
//! separates the failures a caller can act on:
//!
//! - [`CounterError::ContentionExhausted`] - every attempt hit a retryable
//!   store failure; the call did not take effect and may be retried later.
//! - [`CounterError::CorruptShardKey`] / [`CounterError::CorruptShardValue`] -
//!   data inside the namespace range does not decode; the read or compaction
//!   that met it is aborted.
//! - [`CounterError::Store`] - a non-retryable store failure, passed through.
//!
//! # Example
//!
//! ```rust
//! use sommatori::error::CounterError;
//! use sommatori::store::StoreError;
//!
//! let err = CounterError::from(StoreError::Unavailable("network down".into()));
//! assert!(matches!(err, CounterError::Store(StoreError::Unavailable(_))));
//! ```

use thiserror::Error;

use crate::keys::KeyError;
use crate::store::StoreError;

/// The operation a [`CounterError::ContentionExhausted`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// [`ShardedCounter::increment`](crate::counter::ShardedCounter::increment).
    Increment,
    /// [`ShardedCounter::get_total`](crate::counter::ShardedCounter::get_total).
    GetTotal,
    /// [`ShardedCounter::compact`](crate::counter::ShardedCounter::compact).
    Compact,
    /// [`ShardedCounter::set_total`](crate::counter::ShardedCounter::set_total).
    SetTotal,
    /// [`ShardedCounter::clear`](crate::counter::ShardedCounter::clear).
    Clear,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Operation::Increment => "increment",
            Operation::GetTotal => "get_total",
            Operation::Compact => "compact",
            Operation::SetTotal => "set_total",
            Operation::Clear => "clear",
        };
        f.write_str(name)
    }
}

/// Unified error type for counter operations.
#[derive(Debug, Error)]
pub enum CounterError {
    /// Every attempt failed with a retryable store error.
    #[error("{operation} gave up after {attempts} attempts")]
    ContentionExhausted {
        /// The operation that gave up.
        operation: Operation,
        /// Number of attempts made.
        attempts: u32,
    },

    /// A key inside the namespace range has an unexpected shape.
    #[error("corrupt shard key {key}: {reason}")]
    CorruptShardKey {
        /// Hex rendering of the offending key.
        key: String,
        /// What failed to decode.
        reason: KeyError,
    },

    /// A shard value is not an encoded delta.
    #[error("corrupt value at shard key {key}: {reason}")]
    CorruptShardValue {
        /// Hex rendering of the key holding the value.
        key: String,
        /// What failed to decode.
        reason: KeyError,
    },

    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Error reported by the underlying store.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl CounterError {
    /// Returns `true` if the underlying store error may succeed on a new attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CounterError::Store(e) if e.is_retryable())
    }
}

/// Result type for counter operations.
pub type Result<T> = std::result::Result<T, CounterError>;

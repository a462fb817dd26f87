//! Capability interface to a transactional ordered key-value store.
//!
//! Counters never talk to a concrete database. They are written against the
//! two traits in this module, which capture the minimal capability set the
//! sharded-counter protocol needs:
//!
//! - ordered byte-key range reads within one consistent snapshot,
//! - buffered writes committed atomically,
//! - conflict detection reported as [`StoreError::Conflict`] at commit,
//! - optionally, an atomic add on a stored integer.
//!
//! # Snapshot vs serializable reads
//!
//! Every read happens at the snapshot taken when the transaction began. A
//! normal read also joins the transaction's read-conflict set: if any key it
//! covered is written by another transaction that commits first, this
//! transaction fails with [`StoreError::Conflict`]. A read issued with
//! [`RangeOptions::snapshot`] set skips that registration and can never cause
//! a conflict.
//!
//! # Atomic add
//!
//! Stores that can add to a stored integer without reading it report
//! [`Transaction::supports_atomic_add`]. The stored value is treated as a
//! little-endian two's-complement integer, and the addition wraps. Because it
//! creates no read dependency, an atomic add never participates in a conflict.
//!
//! ```text
//!   writer A ──atomic_add(k1)──┐
//!   writer B ──atomic_add(k2)──┼──► commit: no read set, never conflicts
//!   writer C ──atomic_add(k1)──┘
//!
//!   writer D ──get(k3), set(k3)──► commit: conflicts only with another
//!                                  writer of k3 in the same window
//! ```
//!
//! See [`memory::MemoryStore`] for an in-process implementation.

pub mod memory;

use thiserror::Error;

/// Errors reported by a store adapter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The transaction's reads overlap a write committed concurrently.
    #[error("transaction conflict")]
    Conflict,

    /// A transient failure (timeout, leader change); a new attempt may succeed.
    #[error("transient store failure: {0}")]
    Transient(String),

    /// The store cannot serve requests.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// [`Transaction::atomic_add`] was called on a store without that capability.
    #[error("atomic add is not supported by this store")]
    AtomicAddUnsupported,
}

impl StoreError {
    /// Returns `true` for failures that a fresh transaction may not hit again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Conflict | StoreError::Transient(_))
    }
}

/// A half-open `[start, end)` byte-key range.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyRange {
    /// First key of the range (inclusive).
    pub start: Vec<u8>,
    /// End of the range (exclusive).
    pub end: Vec<u8>,
}

impl KeyRange {
    /// Creates a new range.
    pub fn new(start: impl Into<Vec<u8>>, end: impl Into<Vec<u8>>) -> Self {
        Self {
            start: start.into(),
            end: end.into(),
        }
    }

    /// Returns `true` if `key` lies within the range.
    pub fn contains(&self, key: &[u8]) -> bool {
        key >= self.start.as_slice() && key < self.end.as_slice()
    }

    /// Returns `true` if the range cannot contain any key.
    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    /// Returns `true` if the two ranges share at least one key.
    pub fn overlaps(&self, other: &KeyRange) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// Options for [`Transaction::get_range`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RangeOptions {
    /// Skip the read-conflict registration.
    pub snapshot: bool,
    /// Maximum number of pairs to return.
    pub limit: Option<usize>,
    /// Return pairs in descending key order.
    pub reverse: bool,
}

impl RangeOptions {
    /// Serializable, unlimited, ascending.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether the read is a snapshot read.
    pub fn snapshot(mut self, enabled: bool) -> Self {
        self.snapshot = enabled;
        self
    }

    /// Caps the number of returned pairs.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Sets descending order.
    pub fn reverse(mut self, enabled: bool) -> Self {
        self.reverse = enabled;
        self
    }
}

/// One open transaction.
///
/// Writes are buffered until [`Store::commit`]. Reads observe the snapshot the
/// transaction began at, overlaid with its own buffered writes.
pub trait Transaction {
    /// Reads a single key, joining the read-conflict set.
    fn get(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;

    /// Reads the pairs inside `range` in key order.
    fn get_range(
        &mut self,
        range: &KeyRange,
        options: RangeOptions,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError>;

    /// Buffers a write of `value` at `key`.
    fn set(&mut self, key: &[u8], value: &[u8]);

    /// Buffers a deletion of `key`.
    fn clear(&mut self, key: &[u8]);

    /// Buffers a deletion of every key inside `range`.
    fn clear_range(&mut self, range: &KeyRange);

    /// Returns `true` if [`atomic_add`](Transaction::atomic_add) is available.
    fn supports_atomic_add(&self) -> bool {
        false
    }

    /// Buffers a wrapping addition of `delta` to the integer stored at `key`.
    ///
    /// A missing key counts as zero.
    fn atomic_add(&mut self, _key: &[u8], _delta: i64) -> Result<(), StoreError> {
        Err(StoreError::AtomicAddUnsupported)
    }
}

/// A transactional ordered key-value store.
pub trait Store: Send + Sync {
    /// The transaction handle type.
    type Txn: Transaction;

    /// Opens a transaction at the current snapshot.
    fn begin(&self) -> Result<Self::Txn, StoreError>;

    /// Atomically applies the transaction's buffered writes.
    ///
    /// Fails with [`StoreError::Conflict`] when validation detects an
    /// overlapping concurrent commit, in which case nothing is applied.
    fn commit(&self, txn: Self::Txn) -> Result<(), StoreError>;
}

impl<T: Store + ?Sized> Store for std::sync::Arc<T> {
    type Txn = T::Txn;

    fn begin(&self) -> Result<Self::Txn, StoreError> {
        (**self).begin()
    }

    fn commit(&self, txn: Self::Txn) -> Result<(), StoreError> {
        (**self).commit(txn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_contains() {
        let range = KeyRange::new(b"b".to_vec(), b"d".to_vec());
        assert!(!range.contains(b"a"));
        assert!(range.contains(b"b"));
        assert!(range.contains(b"c\xff"));
        assert!(!range.contains(b"d"));
    }

    #[test]
    fn test_range_overlaps() {
        let a = KeyRange::new(b"a".to_vec(), b"c".to_vec());
        let b = KeyRange::new(b"b".to_vec(), b"e".to_vec());
        let c = KeyRange::new(b"c".to_vec(), b"e".to_vec());
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c));
        assert!(KeyRange::new(b"x".to_vec(), b"x".to_vec()).is_empty());
    }

    #[test]
    fn test_range_options_builder() {
        let opts = RangeOptions::new().snapshot(true).limit(3).reverse(true);
        assert!(opts.snapshot);
        assert_eq!(opts.limit, Some(3));
        assert!(opts.reverse);
        assert_eq!(RangeOptions::new(), RangeOptions::default());
    }

    #[test]
    fn test_retryable() {
        assert!(StoreError::Conflict.is_retryable());
        assert!(StoreError::Transient("t".into()).is_retryable());
        assert!(!StoreError::Unavailable("u".into()).is_retryable());
        assert!(!StoreError::AtomicAddUnsupported.is_retryable());
    }
}

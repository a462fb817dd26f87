//! In-process transactional store with optimistic conflict detection.
//!
//! [`MemoryStore`] keeps a version history per key. A transaction reads at the
//! version that was current when it began and buffers its writes; at commit it
//! is validated against everything committed since:
//!
//! ```text
//!   begin (read_version = 7)
//!     get(k1)               -> read set {k1}
//!     get_range([a, b))     -> read set {k1, [a, b)}
//!     get_range(snapshot)   -> read set unchanged
//!     atomic_add(k2)        -> no read dependency
//!   commit
//!     any key in the read set written at version > 7 ?  -> Conflict
//!     otherwise apply all writes at version 8
//! ```
//!
//! Histories are retained for the lifetime of the store, which suits tests,
//! demos and benchmarks rather than long-running production workloads.
//!
//! # Example
//!
//! ```rust
//! use sommatori::store::memory::MemoryStore;
//! use sommatori::store::{Store, StoreError, Transaction};
//!
//! let store = MemoryStore::new();
//!
//! let mut a = store.begin().unwrap();
//! let mut b = store.begin().unwrap();
//! a.get(b"k").unwrap();
//! a.set(b"k", b"from a");
//! b.set(b"k", b"from b");
//!
//! store.commit(b).unwrap();
//! assert_eq!(store.commit(a), Err(StoreError::Conflict));
//! ```

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

use crate::store::{KeyRange, RangeOptions, Store, StoreError, Transaction};

#[derive(Debug, Clone)]
struct Version {
    version: u64,
    value: Option<Vec<u8>>,
}

#[derive(Debug, Default)]
struct Inner {
    version: u64,
    data: BTreeMap<Vec<u8>, Vec<Version>>,
    commit_faults: VecDeque<StoreError>,
    range_faults: VecDeque<StoreError>,
    committed: u64,
    conflicts: u64,
}

impl Inner {
    fn read_at(&self, key: &[u8], at: u64) -> Option<&[u8]> {
        self.data.get(key).and_then(|history| visible(history, at))
    }

    fn latest(&self, key: &[u8]) -> Option<&[u8]> {
        self.read_at(key, self.version)
    }

    fn written_after(history: &[Version], at: u64) -> bool {
        history.last().is_some_and(|v| v.version > at)
    }

    fn live_keys(&self, range: &KeyRange) -> Vec<Vec<u8>> {
        if range.is_empty() {
            return Vec::new();
        }
        self.data
            .range(range.start.clone()..range.end.clone())
            .filter(|(_, history)| visible(history, self.version).is_some())
            .map(|(key, _)| key.clone())
            .collect()
    }
}

fn visible(history: &[Version], at: u64) -> Option<&[u8]> {
    history
        .iter()
        .rev()
        .find(|v| v.version <= at)
        .and_then(|v| v.value.as_deref())
}

/// Wrapping little-endian addition used by atomic add.
fn add_le(existing: Option<&[u8]>, delta: i64) -> Vec<u8> {
    let mut buf = [0u8; 8];
    if let Some(bytes) = existing {
        let n = bytes.len().min(8);
        buf[..n].copy_from_slice(&bytes[..n]);
    }
    i64::from_le_bytes(buf)
        .wrapping_add(delta)
        .to_le_bytes()
        .to_vec()
}

#[derive(Debug, Clone)]
enum Mutation {
    Set(Vec<u8>),
    Clear,
    Add(i64),
}

/// An in-memory [`Store`] with snapshot reads and optimistic validation.
///
/// Cloning a `MemoryStore` yields another handle to the same data.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
    atomic_add: bool,
}

impl MemoryStore {
    /// Creates an empty store offering atomic add.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            atomic_add: true,
        }
    }

    /// Creates an empty store without atomic add, so writers must fall back
    /// to read-modify-write.
    pub fn without_atomic_add() -> Self {
        Self {
            atomic_add: false,
            ..Self::new()
        }
    }

    /// Makes the next commit fail with `err` before validation.
    ///
    /// Failures queue up and are consumed one per commit.
    pub fn inject_commit_failure(&self, err: StoreError) {
        self.inner.lock().commit_faults.push_back(err);
    }

    /// Makes the next range read fail with `err`.
    pub fn inject_range_failure(&self, err: StoreError) {
        self.inner.lock().range_faults.push_back(err);
    }

    /// Number of commits that applied writes.
    pub fn committed(&self) -> u64 {
        self.inner.lock().committed
    }

    /// Number of commits rejected with [`StoreError::Conflict`].
    pub fn conflicts(&self) -> u64 {
        self.inner.lock().conflicts
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        let inner = self.inner.lock();
        inner
            .data
            .values()
            .filter(|history| visible(history, inner.version).is_some())
            .count()
    }

    /// Returns `true` if no key is live.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Live keys inside `range`, in order.
    pub fn keys_in(&self, range: &KeyRange) -> Vec<Vec<u8>> {
        self.inner.lock().live_keys(range)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Store for MemoryStore {
    type Txn = MemoryTransaction;

    fn begin(&self) -> Result<MemoryTransaction, StoreError> {
        let read_version = self.inner.lock().version;
        Ok(MemoryTransaction {
            inner: Arc::clone(&self.inner),
            read_version,
            atomic_add: self.atomic_add,
            writes: BTreeMap::new(),
            cleared: Vec::new(),
            read_keys: Vec::new(),
            read_ranges: Vec::new(),
        })
    }

    fn commit(&self, txn: MemoryTransaction) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();

        if let Some(err) = inner.commit_faults.pop_front() {
            if err == StoreError::Conflict {
                inner.conflicts += 1;
            }
            return Err(err);
        }

        let read_version = txn.read_version;
        let key_conflict = txn.read_keys.iter().any(|key| {
            inner
                .data
                .get(key)
                .is_some_and(|history| Inner::written_after(history, read_version))
        });
        let range_conflict = || {
            txn.read_ranges.iter().any(|range| {
                !range.is_empty()
                    && inner
                        .data
                        .range(range.start.clone()..range.end.clone())
                        .any(|(_, history)| Inner::written_after(history, read_version))
            })
        };
        if key_conflict || range_conflict() {
            inner.conflicts += 1;
            trace!(read_version, "memory store commit conflict");
            return Err(StoreError::Conflict);
        }

        if txn.writes.is_empty() && txn.cleared.is_empty() {
            return Ok(());
        }

        inner.version += 1;
        let version = inner.version;

        for range in &txn.cleared {
            for key in inner.live_keys(range) {
                inner
                    .data
                    .entry(key)
                    .or_default()
                    .push(Version { version, value: None });
            }
        }

        for (key, mutation) in txn.writes {
            let value = match mutation {
                Mutation::Set(value) => Some(value),
                Mutation::Clear => None,
                Mutation::Add(delta) => Some(add_le(inner.latest(&key), delta)),
            };
            inner
                .data
                .entry(key)
                .or_default()
                .push(Version { version, value });
        }

        inner.committed += 1;
        Ok(())
    }
}

/// A transaction on a [`MemoryStore`].
#[derive(Debug)]
pub struct MemoryTransaction {
    inner: Arc<Mutex<Inner>>,
    read_version: u64,
    atomic_add: bool,
    writes: BTreeMap<Vec<u8>, Mutation>,
    cleared: Vec<KeyRange>,
    read_keys: Vec<Vec<u8>>,
    read_ranges: Vec<KeyRange>,
}

impl MemoryTransaction {
    /// The version this transaction reads at.
    pub fn read_version(&self) -> u64 {
        self.read_version
    }

    fn is_cleared(&self, key: &[u8]) -> bool {
        self.cleared.iter().any(|range| range.contains(key))
    }

    /// The value at `key` before this transaction's buffered mutation of it.
    fn base_value(&self, inner: &Inner, key: &[u8]) -> Option<Vec<u8>> {
        if self.is_cleared(key) {
            None
        } else {
            inner.read_at(key, self.read_version).map(<[u8]>::to_vec)
        }
    }
}

impl Transaction for MemoryTransaction {
    fn get(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        self.read_keys.push(key.to_vec());
        let inner = self.inner.lock();
        let value = match self.writes.get(key) {
            Some(Mutation::Set(value)) => Some(value.clone()),
            Some(Mutation::Clear) => None,
            Some(Mutation::Add(delta)) => {
                Some(add_le(self.base_value(&inner, key).as_deref(), *delta))
            }
            None => self.base_value(&inner, key),
        };
        Ok(value)
    }

    fn get_range(
        &mut self,
        range: &KeyRange,
        options: RangeOptions,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError> {
        let mut inner = self.inner.lock();
        if let Some(err) = inner.range_faults.pop_front() {
            return Err(err);
        }
        if range.is_empty() {
            return Ok(Vec::new());
        }

        let mut view: BTreeMap<Vec<u8>, Vec<u8>> = inner
            .data
            .range(range.start.clone()..range.end.clone())
            .filter(|(key, _)| !self.is_cleared(key))
            .filter_map(|(key, history)| {
                visible(history, self.read_version).map(|value| (key.clone(), value.to_vec()))
            })
            .collect();
        drop(inner);

        for (key, mutation) in self.writes.range(range.start.clone()..range.end.clone()) {
            match mutation {
                Mutation::Set(value) => {
                    view.insert(key.clone(), value.clone());
                }
                Mutation::Clear => {
                    view.remove(key);
                }
                Mutation::Add(delta) => {
                    let sum = add_le(view.get(key).map(Vec::as_slice), *delta);
                    view.insert(key.clone(), sum);
                }
            }
        }

        let mut pairs: Vec<(Vec<u8>, Vec<u8>)> = view.into_iter().collect();
        if options.reverse {
            pairs.reverse();
        }
        let truncated = match options.limit {
            Some(limit) if pairs.len() > limit => {
                pairs.truncate(limit);
                true
            }
            _ => false,
        };

        if !options.snapshot {
            // Only the part of the range actually returned is protected.
            let read = match (truncated, pairs.last()) {
                (true, Some((last, _))) if options.reverse => {
                    KeyRange::new(last.clone(), range.end.clone())
                }
                (true, Some((last, _))) => {
                    let mut end = last.clone();
                    end.push(0x00);
                    KeyRange::new(range.start.clone(), end)
                }
                _ => range.clone(),
            };
            self.read_ranges.push(read);
        }

        Ok(pairs)
    }

    fn set(&mut self, key: &[u8], value: &[u8]) {
        self.writes
            .insert(key.to_vec(), Mutation::Set(value.to_vec()));
    }

    fn clear(&mut self, key: &[u8]) {
        self.writes.insert(key.to_vec(), Mutation::Clear);
    }

    fn clear_range(&mut self, range: &KeyRange) {
        if range.is_empty() {
            return;
        }
        self.writes.retain(|key, _| !range.contains(key));
        self.cleared.push(range.clone());
    }

    fn supports_atomic_add(&self) -> bool {
        self.atomic_add
    }

    fn atomic_add(&mut self, key: &[u8], delta: i64) -> Result<(), StoreError> {
        if !self.atomic_add {
            return Err(StoreError::AtomicAddUnsupported);
        }
        let covered = self.is_cleared(key);
        let mutation = match self.writes.remove(key) {
            Some(Mutation::Set(value)) => Mutation::Set(add_le(Some(&value), delta)),
            Some(Mutation::Clear) => Mutation::Set(add_le(None, delta)),
            Some(Mutation::Add(previous)) => Mutation::Add(previous.wrapping_add(delta)),
            None if covered => Mutation::Set(add_le(None, delta)),
            None => Mutation::Add(delta),
        };
        self.writes.insert(key.to_vec(), mutation);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn put(store: &MemoryStore, key: &[u8], value: &[u8]) {
        let mut txn = store.begin().unwrap();
        txn.set(key, value);
        store.commit(txn).unwrap();
    }

    fn whole() -> KeyRange {
        KeyRange::new(Vec::new(), vec![0xff])
    }

    #[test]
    fn test_read_your_writes() {
        let store = MemoryStore::new();
        let mut txn = store.begin().unwrap();
        assert_eq!(txn.get(b"a").unwrap(), None);
        txn.set(b"a", b"1");
        assert_eq!(txn.get(b"a").unwrap(), Some(b"1".to_vec()));
        txn.clear(b"a");
        assert_eq!(txn.get(b"a").unwrap(), None);
    }

    #[test]
    fn test_snapshot_isolation() {
        let store = MemoryStore::new();
        put(&store, b"a", b"old");

        let mut reader = store.begin().unwrap();
        put(&store, b"a", b"new");
        put(&store, b"b", b"new");

        assert_eq!(reader.get(b"a").unwrap(), Some(b"old".to_vec()));
        let pairs = reader.get_range(&whole(), RangeOptions::new()).unwrap();
        assert_eq!(pairs, vec![(b"a".to_vec(), b"old".to_vec())]);
    }

    #[test]
    fn test_read_write_conflict() {
        let store = MemoryStore::new();
        let mut a = store.begin().unwrap();
        a.get(b"k").unwrap();
        a.set(b"other", b"x");

        put(&store, b"k", b"v");

        assert_eq!(store.commit(a), Err(StoreError::Conflict));
        assert_eq!(store.conflicts(), 1);
        assert_eq!(store.keys_in(&whole()), vec![b"k".to_vec()]);
    }

    #[test]
    fn test_disjoint_writers_do_not_conflict() {
        let store = MemoryStore::new();
        let mut a = store.begin().unwrap();
        let mut b = store.begin().unwrap();
        a.get(b"a").unwrap();
        a.set(b"a", b"1");
        b.get(b"b").unwrap();
        b.set(b"b", b"2");
        store.commit(a).unwrap();
        store.commit(b).unwrap();
        assert_eq!(store.conflicts(), 0);
        assert_eq!(store.committed(), 2);
    }

    #[test]
    fn test_range_read_conflicts_with_insert() {
        let store = MemoryStore::new();
        let mut a = store.begin().unwrap();
        a.get_range(&KeyRange::new(b"a".to_vec(), b"c".to_vec()), RangeOptions::new())
            .unwrap();
        a.set(b"z", b"1");

        put(&store, b"b", b"phantom");

        assert_eq!(store.commit(a), Err(StoreError::Conflict));
    }

    #[test]
    fn test_range_read_conflicts_with_delete() {
        let store = MemoryStore::new();
        put(&store, b"b", b"1");

        let mut a = store.begin().unwrap();
        a.get_range(&whole(), RangeOptions::new()).unwrap();
        a.set(b"z", b"1");

        let mut deleter = store.begin().unwrap();
        deleter.clear(b"b");
        store.commit(deleter).unwrap();

        assert_eq!(store.commit(a), Err(StoreError::Conflict));
    }

    #[test]
    fn test_snapshot_range_read_never_conflicts() {
        let store = MemoryStore::new();
        let mut a = store.begin().unwrap();
        a.get_range(&whole(), RangeOptions::new().snapshot(true))
            .unwrap();
        a.set(b"z", b"1");

        put(&store, b"b", b"1");

        assert_eq!(store.commit(a), Ok(()));
    }

    #[test]
    fn test_limited_range_protects_only_returned_part() {
        let store = MemoryStore::new();
        put(&store, b"a", b"1");
        put(&store, b"b", b"1");
        put(&store, b"c", b"1");

        let mut a = store.begin().unwrap();
        let pairs = a
            .get_range(&whole(), RangeOptions::new().limit(1))
            .unwrap();
        assert_eq!(pairs.len(), 1);
        a.set(b"z", b"1");

        put(&store, b"c", b"2");
        assert_eq!(store.commit(a), Ok(()));
    }

    #[test]
    fn test_reverse_limit() {
        let store = MemoryStore::new();
        for key in [b"a", b"b", b"c"] {
            put(&store, key, b"1");
        }
        let mut txn = store.begin().unwrap();
        let pairs = txn
            .get_range(&whole(), RangeOptions::new().reverse(true).limit(2))
            .unwrap();
        let keys: Vec<_> = pairs.into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec![b"c".to_vec(), b"b".to_vec()]);
    }

    #[test]
    fn test_atomic_add_has_no_read_dependency() {
        let store = MemoryStore::new();
        let mut a = store.begin().unwrap();
        let mut b = store.begin().unwrap();
        a.atomic_add(b"n", 5).unwrap();
        b.atomic_add(b"n", -2).unwrap();
        store.commit(a).unwrap();
        store.commit(b).unwrap();

        let mut reader = store.begin().unwrap();
        let value = reader.get(b"n").unwrap().unwrap();
        assert_eq!(value, 3i64.to_le_bytes().to_vec());
        assert_eq!(store.conflicts(), 0);
    }

    #[test]
    fn test_atomic_add_merges_with_buffered_writes() {
        let store = MemoryStore::new();
        put(&store, b"n", &10i64.to_le_bytes());

        let mut txn = store.begin().unwrap();
        txn.atomic_add(b"n", 1).unwrap();
        txn.atomic_add(b"n", 1).unwrap();
        assert_eq!(txn.get(b"n").unwrap(), Some(12i64.to_le_bytes().to_vec()));

        txn.clear_range(&whole());
        txn.atomic_add(b"n", 4).unwrap();
        assert_eq!(txn.get(b"n").unwrap(), Some(4i64.to_le_bytes().to_vec()));
        store.commit(txn).unwrap();

        assert_eq!(store.keys_in(&whole()), vec![b"n".to_vec()]);
    }

    #[test]
    fn test_add_le_wraps_and_pads() {
        assert_eq!(add_le(None, -1), (-1i64).to_le_bytes().to_vec());
        assert_eq!(add_le(Some(&[1]), 1), 2i64.to_le_bytes().to_vec());
        assert_eq!(
            add_le(Some(&i64::MAX.to_le_bytes()), 1),
            i64::MIN.to_le_bytes().to_vec()
        );
    }

    #[test]
    fn test_without_atomic_add() {
        let store = MemoryStore::without_atomic_add();
        let mut txn = store.begin().unwrap();
        assert!(!txn.supports_atomic_add());
        assert_eq!(
            txn.atomic_add(b"n", 1),
            Err(StoreError::AtomicAddUnsupported)
        );
    }

    #[test]
    fn test_clear_range() {
        let store = MemoryStore::new();
        for key in [b"a", b"b", b"c"] {
            put(&store, key, b"1");
        }
        let mut txn = store.begin().unwrap();
        txn.clear_range(&KeyRange::new(b"a".to_vec(), b"c".to_vec()));
        txn.set(b"b", b"2");
        let pairs = txn.get_range(&whole(), RangeOptions::new()).unwrap();
        assert_eq!(
            pairs,
            vec![
                (b"b".to_vec(), b"2".to_vec()),
                (b"c".to_vec(), b"1".to_vec())
            ]
        );
        store.commit(txn).unwrap();
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_injected_failures() {
        let store = MemoryStore::new();
        store.inject_commit_failure(StoreError::Transient("timeout".into()));
        store.inject_range_failure(StoreError::Unavailable("down".into()));

        let mut txn = store.begin().unwrap();
        assert_eq!(
            txn.get_range(&whole(), RangeOptions::new()),
            Err(StoreError::Unavailable("down".into()))
        );
        assert!(txn.get_range(&whole(), RangeOptions::new()).is_ok());

        txn.set(b"a", b"1");
        assert_eq!(
            store.commit(txn),
            Err(StoreError::Transient("timeout".into()))
        );
        assert!(store.is_empty());
    }

    #[test]
    fn test_read_only_commit_is_noop() {
        let store = MemoryStore::new();
        let mut txn = store.begin().unwrap();
        txn.get(b"a").unwrap();
        store.commit(txn).unwrap();
        assert_eq!(store.committed(), 0);
    }

    #[test]
    fn test_concurrent_commits() {
        use std::thread;

        let store = MemoryStore::new();
        let mut handles = vec![];
        for i in 0..8u8 {
            let store = store.clone();
            handles.push(thread::spawn(move || {
                for j in 0..50u8 {
                    let mut txn = store.begin().unwrap();
                    txn.set(&[i, j], b"x");
                    store.commit(txn).unwrap();
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(store.len(), 400);
        assert_eq!(store.conflicts(), 0);
    }
}

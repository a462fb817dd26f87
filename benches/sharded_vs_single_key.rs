//! Benchmark comparing a sharded counter with a single-key counter.
//!
//! Both run on the in-memory store under the same writer concurrency:
//! 1. `ShardedCounter` with atomic add (blind writes, no read set)
//! 2. `ShardedCounter` without atomic add (read-modify-write of a random shard)
//! 3. A single key updated by read-modify-write, retried until it commits
//!
//! Run with:
//! ```bash
//! cargo bench --bench sharded_vs_single_key
//! ```

use std::sync::Arc;
use std::thread;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use sommatori::counter::ShardedCounter;
use sommatori::keys::{decode_delta, encode_delta, Namespace};
use sommatori::store::memory::MemoryStore;
use sommatori::store::{Store, StoreError, Transaction};

const NUM_THREADS: usize = 8;
const ITERATIONS_PER_THREAD: usize = 2_000;

fn run_sharded(store: MemoryStore) -> i64 {
    let counter = Arc::new(ShardedCounter::new(store, Namespace::new("bench")));
    let mut handles = vec![];

    for _ in 0..NUM_THREADS {
        let counter_clone = Arc::clone(&counter);
        let handle = thread::spawn(move || {
            for _ in 0..ITERATIONS_PER_THREAD {
                counter_clone.increment(1).unwrap();
            }
        });
        handles.push(handle);
    }

    for handle in handles {
        handle.join().unwrap();
    }

    counter.get_total().unwrap()
}

/// Adds one to `key`, retrying conflicts until the write commits.
fn single_key_increment(store: &MemoryStore, key: &[u8]) {
    loop {
        let mut txn = store.begin().unwrap();
        let current = txn
            .get(key)
            .unwrap()
            .map(|value| decode_delta(&value).unwrap())
            .unwrap_or(0);
        txn.set(key, &encode_delta(current + 1));
        match store.commit(txn) {
            Ok(()) => return,
            Err(StoreError::Conflict) => continue,
            Err(err) => panic!("commit failed: {err}"),
        }
    }
}

fn run_single_key() -> i64 {
    let store = MemoryStore::without_atomic_add();
    let key = b"bench/single".to_vec();
    let mut handles = vec![];

    for _ in 0..NUM_THREADS {
        let store = store.clone();
        let key = key.clone();
        let handle = thread::spawn(move || {
            for _ in 0..ITERATIONS_PER_THREAD {
                single_key_increment(&store, &key);
            }
        });
        handles.push(handle);
    }

    for handle in handles {
        handle.join().unwrap();
    }

    let mut txn = store.begin().unwrap();
    let value = txn.get(&key).unwrap().unwrap();
    decode_delta(&value).unwrap()
}

fn bench_contended_increment(c: &mut Criterion) {
    let mut group = c.benchmark_group("contended_increment");
    group.sample_size(20);

    let label = format!("{}threads x {}iter", NUM_THREADS, ITERATIONS_PER_THREAD);

    group.bench_function(BenchmarkId::new("sharded (atomic add)", &label), |b| {
        b.iter(|| black_box(run_sharded(MemoryStore::new())))
    });

    group.bench_function(BenchmarkId::new("sharded (read-modify-write)", &label), |b| {
        b.iter(|| black_box(run_sharded(MemoryStore::without_atomic_add())))
    });

    group.bench_function(BenchmarkId::new("single key (read-modify-write)", &label), |b| {
        b.iter(|| black_box(run_single_key()))
    });

    group.finish();
}

fn bench_get_total(c: &mut Criterion) {
    let mut group = c.benchmark_group("get_total");

    for shards in [10usize, 100, 1_000] {
        let counter = ShardedCounter::new(MemoryStore::new(), Namespace::new("bench"));
        for _ in 0..shards {
            counter.increment(1).unwrap();
        }

        group.bench_function(BenchmarkId::new("shards", shards), |b| {
            b.iter(|| black_box(counter.get_total().unwrap()))
        });

        counter.compact().unwrap();
        group.bench_function(BenchmarkId::new("compacted", shards), |b| {
            b.iter(|| black_box(counter.get_total().unwrap()))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_contended_increment, bench_get_total);
criterion_main!(benches);

//! Facade-level throughput benchmarks.
//!
//! Targets mirror what a single-node embedding host cares about: how
//! many Add/Get/Enumerate calls per second the store sustains once the
//! lock manager, replicator round-trip and apply engine are all in the
//! loop, not just the bare containers underneath.

use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::runtime::Runtime;
use vstore_concurrency::{InProcessLockManager, IsolationLevel};
use vstore_core::error::Result;
use vstore_core::{
    Key, LexicographicComparator, OperationKind, RawKeySerializer, RawValueSerializer, ReadStatus,
    Replicator, Role, Value, Vsn, WriteStatus,
};
use vstore_engine::{StoreConfig, VersionedStore};

struct BenchReplicator(AtomicU64);

impl BenchReplicator {
    fn new() -> Self {
        BenchReplicator(AtomicU64::new(0))
    }
}

#[async_trait::async_trait]
impl Replicator for BenchReplicator {
    fn commit_lsn_now(&self) -> Vsn {
        Vsn::new(self.0.load(Ordering::SeqCst))
    }
    fn get_visibility_vsn(&self) -> Vsn {
        Vsn::new(self.0.load(Ordering::SeqCst))
    }
    fn role(&self) -> Role {
        Role::Primary
    }
    fn read_status(&self) -> ReadStatus {
        ReadStatus::Readable
    }
    fn write_status(&self) -> WriteStatus {
        WriteStatus::Writable
    }
    async fn append_redo(&self, _op: OperationKind, _key: Key, _value: Option<Value>) -> Result<Vsn> {
        Ok(Vsn::new(self.0.fetch_add(1, Ordering::SeqCst) + 1))
    }
}

fn setup_store() -> (Arc<VersionedStore>, TempDir, Runtime) {
    let temp_dir = TempDir::new().unwrap();
    let rt = Runtime::new().unwrap();
    let config = StoreConfig::builder(temp_dir.path()).sweep_interval(None).build();
    let store = Arc::new(
        VersionedStore::open(
            config,
            Arc::new(LexicographicComparator),
            Arc::new(InProcessLockManager::new()),
            Arc::new(BenchReplicator::new()),
            None,
            Arc::new(RawKeySerializer),
            Arc::new(RawValueSerializer),
        )
        .unwrap(),
    );
    (store, temp_dir, rt)
}

/// Target: sustained unique-key Add throughput.
fn bench_add(c: &mut Criterion) {
    let (store, _temp, rt) = setup_store();

    let mut group = c.benchmark_group("facade");
    group.throughput(Throughput::Elements(1));

    let counter = AtomicU64::new(0);
    group.bench_function("add", |b| {
        b.iter(|| {
            let i = counter.fetch_add(1, Ordering::SeqCst);
            rt.block_on(async {
                let txn = store.begin_transaction(IsolationLevel::ReadCommitted);
                let key = Key::from(format!("key{i}").as_str());
                let result = store.add(&txn, key, Value::from("v"), None).await.unwrap();
                store.end_transaction(&txn);
                result
            })
        })
    });
    group.finish();
}

/// Target: read-committed Get throughput against a pre-populated store.
fn bench_conditional_get(c: &mut Criterion) {
    let (store, _temp, rt) = setup_store();

    rt.block_on(async {
        for i in 0..1000 {
            let txn = store.begin_transaction(IsolationLevel::ReadCommitted);
            let key = Key::from(format!("key{i}").as_str());
            store.add(&txn, key, Value::from("v"), None).await.unwrap();
            store.end_transaction(&txn);
        }
    });

    let mut group = c.benchmark_group("facade");
    group.throughput(Throughput::Elements(1));

    let counter = AtomicU64::new(0);
    group.bench_function("conditional_get", |b| {
        b.iter(|| {
            let i = counter.fetch_add(1, Ordering::SeqCst) % 1000;
            rt.block_on(async {
                let txn = store.begin_transaction(IsolationLevel::ReadCommitted);
                let key = Key::from(format!("key{i}").as_str());
                let got = store.conditional_get(&txn, &key, None).await.unwrap();
                store.end_transaction(&txn);
                got
            })
        })
    });
    group.finish();
}

/// Target: full-range enumeration throughput over a 1000-key store.
fn bench_enumerate(c: &mut Criterion) {
    let (store, _temp, rt) = setup_store();

    rt.block_on(async {
        for i in 0..1000 {
            let txn = store.begin_transaction(IsolationLevel::ReadCommitted);
            let key = Key::from(format!("key{i}").as_str());
            store.add(&txn, key, Value::from("v"), None).await.unwrap();
            store.end_transaction(&txn);
        }
    });

    let mut group = c.benchmark_group("facade");
    group.throughput(Throughput::Elements(1000));

    group.bench_function("enumerate_full_range", |b| {
        b.iter(|| {
            let txn = store.begin_transaction(IsolationLevel::Snapshot);
            let enumerator = store.create_enumerator(&txn, None, None).unwrap();
            let count = enumerator.filter_map(|r| r.ok()).count();
            store.end_transaction(&txn);
            count
        })
    });
    group.finish();
}

/// Target: checkpoint throughput for a moderately sized differential.
fn bench_checkpoint(c: &mut Criterion) {
    let (store, _temp, rt) = setup_store();

    let mut group = c.benchmark_group("facade");
    group.throughput(Throughput::Elements(1));

    let lsn = AtomicU64::new(0);
    group.bench_function("checkpoint_500_keys", |b| {
        b.iter(|| {
            rt.block_on(async {
                for i in 0..500u32 {
                    let txn = store.begin_transaction(IsolationLevel::ReadCommitted);
                    let key = Key::from_bytes(i.to_be_bytes().to_vec());
                    let _ = store.add(&txn, key, Value::from("v"), None).await;
                    store.end_transaction(&txn);
                }
                let checkpoint_lsn = Vsn::new(lsn.fetch_add(1000, Ordering::SeqCst) + 1000);
                store.checkpoint(checkpoint_lsn).await.unwrap();
            })
        })
    });
    group.finish();
}

criterion_group!(benches, bench_add, bench_conditional_get, bench_enumerate, bench_checkpoint);
criterion_main!(benches);

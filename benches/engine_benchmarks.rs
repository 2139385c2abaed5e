//! Whole-crate throughput benchmark exercised through the public
//! `vstore` surface, as an embedding application would call it --
//! complements the finer-grained façade benchmarks in `vstore-engine`.

use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::runtime::Runtime;
use vstore::{
    InProcessLockManager, IsolationLevel, Key, LexicographicComparator, OperationKind,
    RawKeySerializer, RawValueSerializer, ReadStatus, Replicator, Result, Role, StoreConfig, Value,
    VersionedStore, Vsn, WriteStatus,
};

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

/// End-to-end Add -> Get round trip through a single transaction, the
/// call pattern a typical request handler would use.
fn bench_add_then_get(c: &mut Criterion) {
    let (store, _temp, rt) = setup_store();

    let mut group = c.benchmark_group("vstore");
    group.throughput(Throughput::Elements(1));

    let counter = AtomicU64::new(0);
    group.bench_function("add_then_get", |b| {
        b.iter(|| {
            let i = counter.fetch_add(1, Ordering::SeqCst);
            rt.block_on(async {
                let txn = store.begin_transaction(IsolationLevel::ReadCommitted);
                let key = Key::from(format!("key{i}").as_str());
                store.add(&txn, key.clone(), Value::from("v"), None).await.unwrap();
                let got = store.conditional_get(&txn, &key, None).await.unwrap();
                store.end_transaction(&txn);
                got
            })
        })
    });
    group.finish();
}

criterion_group!(benches, bench_add_then_get);
criterion_main!(benches);

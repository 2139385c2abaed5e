//! End-to-end scenarios and round-trip laws exercised against the
//! assembled `VersionedStore` façade, not any single module in
//! isolation.

mod common;

use common::{open_store, FakeReplicator};
use std::sync::Arc;
use vstore_concurrency::{InProcessLockManager, IsolationLevel};
use vstore_core::{
    ApplyContext, Key, Kind, LexicographicComparator, OperationKind, RawKeySerializer,
    RawValueSerializer, RedoRecord, UndoRecord, Value, Vsn,
};
use vstore_engine::{MergePolicy, StoreConfig, VersionedStore};

#[tokio::test]
async fn add_checkpoint_recover_round_trips() {
    let tmp = tempfile::tempdir().unwrap();
    let replicator = Arc::new(FakeReplicator::at_lsn(9));
    {
        let store = open_store(tmp.path(), replicator.clone());
        let txn = store.begin_transaction(IsolationLevel::ReadCommitted);
        let vsn = store.add(&txn, Key::from("key-17"), Value::from("value"), None).await.unwrap();
        assert_eq!(vsn, Vsn::new(10));
        store.end_transaction(&txn);
        store.checkpoint(Vsn::new(11)).await.unwrap();
    }

    let store = open_store(tmp.path(), replicator);
    let txn = store.begin_transaction(IsolationLevel::ReadCommitted);
    let got = store.conditional_get(&txn, &Key::from("key-17"), None).await.unwrap();
    assert_eq!(got, Some((Vsn::new(10), Value::from("value"))));
    assert_eq!(store.count(), 1);
}

#[tokio::test]
async fn update_then_recover_returns_latest_version() {
    let tmp = tempfile::tempdir().unwrap();
    let replicator = Arc::new(FakeReplicator::at_lsn(9));
    {
        let store = open_store(tmp.path(), replicator.clone());
        let txn = store.begin_transaction(IsolationLevel::ReadCommitted);
        store.add(&txn, Key::from("key-17"), Value::from("value"), None).await.unwrap();
        store.end_transaction(&txn);
        store.checkpoint(Vsn::new(11)).await.unwrap();

        let txn2 = store.begin_transaction(IsolationLevel::ReadCommitted);
        let vsn = store
            .conditional_update(&txn2, Key::from("key-17"), Value::from("v2"), None, None)
            .await
            .unwrap();
        assert_eq!(vsn, Vsn::new(12));
        store.end_transaction(&txn2);
        store.checkpoint(Vsn::new(13)).await.unwrap();
    }

    let store = open_store(tmp.path(), replicator);
    let txn = store.begin_transaction(IsolationLevel::ReadCommitted);
    let got = store.conditional_get(&txn, &Key::from("key-17"), None).await.unwrap();
    assert_eq!(got, Some((Vsn::new(12), Value::from("v2"))));
}

#[tokio::test]
async fn snapshot_reader_isolated_from_concurrent_writes() {
    let tmp = tempfile::tempdir().unwrap();
    let replicator = Arc::new(FakeReplicator::new());
    let store = open_store(tmp.path(), replicator);
    let key = Key::from_bytes(vec![5]);

    let setup = store.begin_transaction(IsolationLevel::ReadCommitted);
    store.add(&setup, key.clone(), Value::from("A"), None).await.unwrap();
    store.end_transaction(&setup);

    let reader = store.begin_transaction(IsolationLevel::Snapshot);
    let first = store.conditional_get(&reader, &key, None).await.unwrap();
    assert_eq!(first, Some((Vsn::new(1), Value::from("A"))));

    let update_txn = store.begin_transaction(IsolationLevel::ReadCommitted);
    store.conditional_update(&update_txn, key.clone(), Value::from("B"), None, None).await.unwrap();
    store.end_transaction(&update_txn);

    let remove_txn = store.begin_transaction(IsolationLevel::ReadCommitted);
    store.conditional_remove(&remove_txn, key.clone(), None, None).await.unwrap();
    store.end_transaction(&remove_txn);

    let still_a = store.conditional_get(&reader, &key, None).await.unwrap();
    assert_eq!(still_a, Some((Vsn::new(1), Value::from("A"))));
    store.end_transaction(&reader);

    let after_close = store.begin_transaction(IsolationLevel::ReadCommitted);
    let gone = store.conditional_get(&after_close, &key, None).await.unwrap();
    assert_eq!(gone, None);
}

#[tokio::test]
async fn idempotent_secondary_replay_skips_checkpointed_vsns() {
    let tmp = tempfile::tempdir().unwrap();
    let replicator = Arc::new(FakeReplicator::new());
    let store = open_store(tmp.path(), replicator);

    let apply = |key: Key, value: Value, vsn: u64| {
        let record = RedoRecord { op: OperationKind::Add, key, value: Some(value), vsn: Vsn::new(vsn) };
        store.apply_redo(&record, ApplyContext::SecondaryRedo)
    };
    apply(Key::from("k1"), Value::from("v1"), 5).unwrap();
    apply(Key::from("k2"), Value::from("v2"), 6).unwrap();
    store.checkpoint(Vsn::new(7)).await.unwrap();

    // Replay re-delivers both earlier records; each is <= the checkpoint
    // LSN under SecondaryRedo, so both must be no-ops.
    apply(Key::from("k1"), Value::from("v1"), 5).unwrap();
    apply(Key::from("k2"), Value::from("v2"), 6).unwrap();
    apply(Key::from("k3"), Value::from("v3"), 8).unwrap();

    assert_eq!(store.count(), 3);
}

#[tokio::test]
async fn undo_restores_pre_transaction_state() {
    let tmp = tempfile::tempdir().unwrap();
    let replicator = Arc::new(FakeReplicator::new());
    let store = open_store(tmp.path(), replicator);
    let key = Key::from("k5");

    let setup = store.begin_transaction(IsolationLevel::ReadCommitted);
    let original_vsn = store.add(&setup, key.clone(), Value::from("original"), None).await.unwrap();
    store.end_transaction(&setup);

    let txn = store.begin_transaction(IsolationLevel::ReadCommitted);
    let remove_vsn = store.conditional_remove(&txn, key.clone(), None, None).await.unwrap();
    let add_vsn = store.add(&txn, key.clone(), Value::from("X"), None).await.unwrap();
    let update_vsn = store.conditional_update(&txn, key.clone(), Value::from("Y"), None, None).await.unwrap();
    store.end_transaction(&txn);

    // Replicator reports false progress; undo in reverse operation order.
    store
        .apply_undo(&UndoRecord {
            op: OperationKind::Update,
            key: key.clone(),
            vsn: update_vsn,
            prior: Some((add_vsn, Kind::Inserted, Some(Value::from("X")))),
        })
        .unwrap();
    store
        .apply_undo(&UndoRecord {
            op: OperationKind::Add,
            key: key.clone(),
            vsn: add_vsn,
            prior: Some((remove_vsn, Kind::Deleted, None)),
        })
        .unwrap();
    store
        .apply_undo(&UndoRecord {
            op: OperationKind::Remove,
            key: key.clone(),
            vsn: remove_vsn,
            prior: Some((original_vsn, Kind::Inserted, Some(Value::from("original")))),
        })
        .unwrap();

    let check = store.begin_transaction(IsolationLevel::ReadCommitted);
    let got = store.conditional_get(&check, &key, None).await.unwrap();
    assert_eq!(got, Some((original_vsn, Value::from("original"))));
}

#[tokio::test]
async fn merge_reclaims_tombstones() {
    let tmp = tempfile::tempdir().unwrap();
    let replicator: Arc<FakeReplicator> = Arc::new(FakeReplicator::new());
    let config = StoreConfig::builder(tmp.path())
        .merge_policy(MergePolicy::InvalidEntries { live_ratio_threshold: 0.9 })
        .sweep_interval(None)
        .build();
    let store = VersionedStore::open(
        config,
        Arc::new(LexicographicComparator),
        Arc::new(InProcessLockManager::new()),
        replicator,
        None,
        Arc::new(RawKeySerializer),
        Arc::new(RawValueSerializer),
    )
    .unwrap();

    for i in 0u32..1000 {
        let txn = store.begin_transaction(IsolationLevel::ReadCommitted);
        store.add(&txn, Key::from_bytes(i.to_be_bytes().to_vec()), Value::from("v"), None).await.unwrap();
        store.end_transaction(&txn);
    }
    store.checkpoint(Vsn::new(1001)).await.unwrap();

    for i in 0u32..500 {
        let txn = store.begin_transaction(IsolationLevel::ReadCommitted);
        store.conditional_remove(&txn, Key::from_bytes(i.to_be_bytes().to_vec()), None, None).await.unwrap();
        store.end_transaction(&txn);
    }
    store.checkpoint(Vsn::new(1502)).await.unwrap();

    assert_eq!(store.count(), 500);
}

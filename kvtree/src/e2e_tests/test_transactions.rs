//! Test explicit transactions.

use crate::FaultKind;
use crate::TreeError;
use crate::e2e_tests::helpers::*;
use crate::storage::PageStore;

#[test]
fn test_abort_leaves_store_untouched() {
    let (store, tree) = memory_tree(256);
    for i in 0..50 {
        tree.put(&numbered_key(i), b"committed").expect("put");
    }
    let pages = snapshot(&store);
    let stats = store.stats();

    tree.start_transaction().expect("start");
    for i in 50..150 {
        tree.put(&numbered_key(i), b"pending").expect("put");
    }
    for i in 0..25 {
        tree.remove(&numbered_key(i)).expect("remove");
    }
    tree.put(&numbered_key(30), b"changed").expect("put");
    assert_eq!(
        tree.get(&numbered_key(120)).expect("get"),
        Some(b"pending".to_vec())
    );
    tree.abort_transaction().expect("abort");

    assert_eq!(store.stats().writes, stats.writes);
    assert_eq!(store.stats().syncs, stats.syncs);
    assert_eq!(snapshot(&store), pages);

    assert_eq!(tree.get(&numbered_key(120)).expect("get"), None);
    assert_eq!(
        tree.get(&numbered_key(3)).expect("get"),
        Some(b"committed".to_vec())
    );
    assert_eq!(
        tree.get(&numbered_key(30)).expect("get"),
        Some(b"committed".to_vec())
    );
    assert_eq!(scan(&tree).len(), 50);
    assert_sound(&tree);
}

#[test]
fn test_tree_grows_normally_after_abort() {
    let (store, tree) = memory_tree(128);
    tree.start_transaction().expect("start");
    for i in 0..60 {
        tree.put(&numbered_key(i), b"discarded").expect("put");
    }
    tree.abort_transaction().expect("abort");
    assert_eq!(store.page_count().expect("count"), 1);

    for i in 0..60 {
        tree.put(&numbered_key(i), b"kept").expect("put");
    }
    assert_sound(&tree);
    assert_eq!(scan(&tree).len(), 60);
}

#[test]
fn test_commit_flushes_once() {
    let (store, tree) = memory_tree(256);
    let syncs = store.stats().syncs;

    tree.start_transaction().expect("start");
    for i in 0..40 {
        tree.put(&numbered_key(i), b"value").expect("put");
    }
    assert_eq!(store.stats().syncs, syncs);
    tree.commit_transaction().expect("commit");

    assert_eq!(store.stats().syncs, syncs + 1);
    assert_eq!(scan(&tree).len(), 40);
    assert_sound(&tree);
}

#[test]
fn test_nested_and_missing_transactions_fault() {
    let (_store, tree) = memory_tree(256);

    let error = tree.commit_transaction().expect_err("nothing to commit");
    assert!(matches!(error, TreeError::NoTransaction));
    assert_eq!(error.kind(), FaultKind::State);

    tree.start_transaction().expect("start");
    let error = tree.start_transaction().expect_err("nested");
    assert_eq!(error.kind(), FaultKind::State);
    assert!(tree.is_transaction_open());

    tree.abort_transaction().expect("abort");
    let error = tree.abort_transaction().expect_err("nothing to abort");
    assert!(matches!(error, TreeError::NoTransaction));
}

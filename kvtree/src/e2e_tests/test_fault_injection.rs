//! Test that device faults abort the open transaction.

use crate::FaultKind;
use crate::btree::BTree;
use crate::config::TreeConfig;
use crate::e2e_tests::helpers::*;
use crate::storage::{FaultConfig, MemoryPageStore, PageStore};

fn small_cache_tree() -> (MemoryPageStore, BTree<MemoryPageStore>) {
    crate::testing::init_tracing();
    let store = MemoryPageStore::with_seed(128, 42);
    let config = TreeConfig::new(128, 1).expect("config");
    let tree = BTree::open(store.clone(), &config).expect("open tree");
    for i in 0..80 {
        tree.put(&numbered_key(i), b"stable").expect("put");
    }
    (store, tree)
}

#[test]
fn test_failed_commit_leaves_store_unchanged() {
    let (store, tree) = small_cache_tree();
    let pages = snapshot(&store);

    store.set_fault_config(FaultConfig::failing_writes());
    let error = tree
        .put(&numbered_key(500), b"lost")
        .expect_err("commit fails");
    assert_eq!(error.kind(), FaultKind::Storage);
    assert!(!tree.is_transaction_open());

    store.set_fault_config(FaultConfig::no_faults());
    assert_eq!(snapshot(&store), pages);
    assert_eq!(tree.get(&numbered_key(500)).expect("get"), None);
    assert_sound(&tree);

    for i in 100..200 {
        tree.put(&numbered_key(i), b"after").expect("put");
    }
    assert_sound(&tree);
    assert_eq!(scan(&tree).len(), 180);
}

#[test]
fn test_read_fault_aborts_explicit_transaction() {
    let (store, tree) = small_cache_tree();
    let pages = snapshot(&store);

    tree.start_transaction().expect("start");
    store.set_fault_config(FaultConfig::failing_reads());
    let error = tree
        .put(&numbered_key(40), b"changed")
        .expect_err("read fails");
    assert_eq!(error.kind(), FaultKind::Storage);
    assert!(!tree.is_transaction_open());

    store.set_fault_config(FaultConfig::no_faults());
    assert_eq!(snapshot(&store), pages);
    assert_eq!(
        tree.get(&numbered_key(40)).expect("get"),
        Some(b"stable".to_vec())
    );
    assert_sound(&tree);
}

#[test]
fn test_read_fault_in_read_only_call_keeps_state() {
    let (store, tree) = small_cache_tree();
    store.set_fault_config(FaultConfig::failing_reads());
    assert!(tree.get(&numbered_key(5)).is_err());
    assert!(tree.integrity_check().is_err());

    store.set_fault_config(FaultConfig::no_faults());
    assert_eq!(
        tree.get(&numbered_key(5)).expect("get"),
        Some(b"stable".to_vec())
    );
    assert!(store.stats().injected_read_errors >= 2);
    assert_eq!(store.page_count().expect("count"), snapshot(&store).len() as u64);
}

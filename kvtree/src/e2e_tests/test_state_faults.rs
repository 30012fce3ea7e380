//! Test faults raised by calls made in the wrong state.

use crate::FaultKind;
use crate::TreeError;
use crate::e2e_tests::helpers::*;

#[test]
fn test_closed_tree_rejects_every_call() {
    let (store, tree) = memory_tree(256);
    tree.put(b"key", b"value").expect("put");
    tree.close().expect("close");
    assert!(store.is_closed());

    let results = [
        tree.put(b"key", b"value").map(|_| ()),
        tree.get(b"key").map(|_| ()),
        tree.contains_key(b"key").map(|_| ()),
        tree.remove(b"key").map(|_| ()),
        tree.length(b"key").map(|_| ()),
        tree.start_transaction(),
        tree.put_blob(b"blob").map(|_| ()),
        tree.iter().map(|_| ()),
        tree.integrity_check().map(|_| ()),
    ];
    for result in results {
        let error = result.expect_err("closed");
        assert!(matches!(error, TreeError::Closed), "{error}");
        assert_eq!(error.kind(), FaultKind::State);
    }
}

#[test]
fn test_close_with_open_transaction_discards_it() {
    let (store, tree) = memory_tree(256);
    tree.put(b"kept", b"1").expect("put");
    let pages = snapshot(&store);

    tree.start_transaction().expect("start");
    tree.put(b"dropped", b"2").expect("put");
    let error = tree.close().expect_err("open transaction");
    assert_eq!(error.kind(), FaultKind::State);

    assert!(store.is_closed());
    assert_eq!(snapshot(&store), pages);
}

#[test]
fn test_invalid_arguments_change_nothing() {
    let (store, tree) = memory_tree(256);
    tree.put(b"key", b"value").expect("put");
    let stats = store.stats();

    let max_value = 256 - 13 - 3 - 3;
    let errors = [
        tree.put(b"", b"value").expect_err("empty key"),
        tree.put(&[b'k'; 200], b"value").expect_err("long key"),
        tree.put(b"key", &vec![0u8; max_value + 1]).expect_err("large value"),
        tree.get(b"").expect_err("empty key"),
        tree.remove(&[b'k'; 118]).expect_err("long key"),
    ];
    for error in errors {
        assert_eq!(error.kind(), FaultKind::Validation, "{error}");
    }

    tree.put(b"key", &vec![0u8; max_value]).expect("largest value");
    assert_eq!(store.stats().writes, stats.writes + 1);
    assert!(!tree.is_transaction_open());
}

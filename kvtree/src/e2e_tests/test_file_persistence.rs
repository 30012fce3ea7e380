//! Test that committed data survives closing and reopening a file.

use crate::btree::{BTree, FaultKind};
use crate::config::TreeConfig;
use crate::e2e_tests::helpers::*;

#[test]
fn test_reopen_sees_committed_data() {
    crate::testing::init_tracing();
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("tree.db");
    let config = TreeConfig::new(512, 16).expect("config");

    {
        let tree = BTree::open_file(&path, &config).expect("create");
        for i in 0..400 {
            tree.put(&numbered_key(i), &numbered_key(i * 2)).expect("put");
        }
        tree.start_transaction().expect("start");
        tree.put(b"uncommitted", b"lost").expect("put");
        tree.abort_transaction().expect("abort");
        tree.close().expect("close");
    }

    let tree = BTree::open_file(&path, &config).expect("reopen");
    assert_sound(&tree);
    assert_eq!(tree.get(b"uncommitted").expect("get"), None);
    for i in (0..400).step_by(37) {
        assert_eq!(
            tree.get(&numbered_key(i)).expect("get"),
            Some(numbered_key(i * 2))
        );
    }

    for i in 0..200 {
        tree.remove(&numbered_key(i)).expect("remove");
    }
    drop(tree);

    let tree = BTree::open_file(&path, &config).expect("reopen again");
    assert_sound(&tree);
    let keys: Vec<Vec<u8>> = (200..400).map(numbered_key).collect();
    assert_eq!(scan_keys(&tree), keys);
}

#[test]
fn test_reopen_continues_allocation() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("tree.db");
    let config = TreeConfig::new(256, 4).expect("config");

    let tree = BTree::open_file(&path, &config).expect("create");
    for i in 0..100 {
        tree.put(&numbered_key(i), b"first").expect("put");
    }
    drop(tree);

    let tree = BTree::open_file(&path, &config).expect("reopen");
    for i in 100..300 {
        tree.put(&numbered_key(i), b"second").expect("put");
    }
    assert_sound(&tree);
    assert_eq!(scan(&tree).len(), 300);
}

#[test]
fn test_reopen_with_other_page_size_is_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("tree.db");

    let tree = BTree::open_file(&path, &TreeConfig::new(512, 4).expect("config")).expect("create");
    for i in 0..40 {
        let key = format!("{i:040}");
        tree.put(key.as_bytes(), b"value").expect("put");
    }
    assert_sound(&tree);
    drop(tree);

    let error = BTree::open_file(&path, &TreeConfig::new(128, 4).expect("config"))
        .expect_err("root does not decode at the smaller page size");
    assert_eq!(error.kind(), FaultKind::Integrity);
}

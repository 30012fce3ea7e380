//! Test basic put/get/remove semantics.

use crate::e2e_tests::helpers::*;

#[test]
fn test_put_then_get_returns_value() {
    let (_store, tree) = memory_tree(4096);

    assert!(!tree.put(b"alpha", b"one").expect("put"));
    assert!(!tree.put(b"beta", b"").expect("put"));

    assert_eq!(tree.get(b"alpha").expect("get"), Some(b"one".to_vec()));
    assert_eq!(tree.get(b"beta").expect("get"), Some(Vec::new()));
    assert_eq!(tree.length(b"beta").expect("length"), Some(0));
    assert_eq!(tree.get(b"gamma").expect("get"), None);
    assert_eq!(tree.length(b"gamma").expect("length"), None);
}

#[test]
fn test_put_existing_key_reports_existed() {
    let (_store, tree) = memory_tree(4096);

    assert!(!tree.put(b"key", b"first").expect("put"));
    assert!(tree.put(b"key", b"second, and longer").expect("put"));
    assert_eq!(
        tree.get(b"key").expect("get"),
        Some(b"second, and longer".to_vec())
    );
    assert_eq!(scan_keys(&tree), vec![b"key".to_vec()]);
}

#[test]
fn test_remove_then_get_is_absent() {
    let (_store, tree) = memory_tree(4096);
    tree.put(b"key", b"value").expect("put");

    assert!(tree.remove(b"key").expect("remove"));
    assert!(!tree.contains_key(b"key").expect("contains"));
    assert_eq!(tree.get(b"key").expect("get"), None);
    assert!(!tree.remove(b"key").expect("remove again"));
}

#[test]
fn test_idempotent_remove_touches_no_pages() {
    let (store, tree) = memory_tree(256);
    for i in 0..40 {
        tree.put(&numbered_key(i), &[7u8; 20]).expect("put");
    }
    tree.remove(&numbered_key(10)).expect("remove");

    let pages = snapshot(&store);
    let stats = store.stats();
    assert!(!tree.remove(&numbered_key(10)).expect("remove again"));
    assert!(!tree.remove(&numbered_key(1000)).expect("remove missing"));

    assert_eq!(store.stats().writes, stats.writes);
    assert_eq!(store.stats().syncs, stats.syncs);
    assert_eq!(snapshot(&store), pages);
}

#[test]
fn test_large_values_replace_across_splits() {
    let (_store, tree) = memory_tree(256);
    for i in 0..30 {
        tree.put(&numbered_key(i), &[1u8; 10]).expect("put");
    }
    for i in 0..30 {
        let value = vec![2u8; 200];
        assert!(tree.put(&numbered_key(i), &value).expect("replace"));
    }
    for i in 0..30 {
        assert_eq!(tree.length(&numbered_key(i)).expect("length"), Some(200));
    }
    assert_sound(&tree);
}

#[test]
fn test_key_length_boundary() {
    let (_store, tree) = memory_tree(4096);
    let max = tree.max_key_length();
    assert_eq!(max, 256);

    let longest = vec![b'k'; max - 1];
    tree.put(&longest, b"v").expect("longest key");
    assert_eq!(tree.get(&longest).expect("get"), Some(b"v".to_vec()));

    let error = tree.put(&vec![b'k'; max], b"v").expect_err("too long");
    assert_eq!(error.kind(), crate::FaultKind::Validation);
}

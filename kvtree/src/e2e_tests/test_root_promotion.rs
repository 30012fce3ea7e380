//! Test how page 0 changes from a leaf to an index page.

use crate::e2e_tests::helpers::*;
use crate::storage::PageStore;

#[test]
fn test_small_tree_keeps_root_leaf() {
    let (store, tree) = memory_tree(4096);
    for i in 0..3 {
        tree.put(&numbered_key(i), b"value").expect("put");
    }

    assert_eq!(store.page(0).expect("root")[0], b'D');
    assert_eq!(store.page_count().expect("count"), 1);
    assert_sound(&tree);
}

#[test]
fn test_sequential_keys_promote_root_to_index() {
    let (store, tree) = memory_tree(4096);
    for i in 0..1000 {
        tree.put(&numbered_key(i), &numbered_key(i * 3)).expect("put");
    }

    let root = store.page(0).expect("root");
    assert_eq!(root[0], b'I');
    let separators = u16::from_be_bytes([root[1], root[2]]);
    assert!(separators >= 1);
    assert!(tree.integrity_check().expect("integrity check"));

    for i in [0, 1, 499, 998, 999] {
        assert_eq!(
            tree.get(&numbered_key(i)).expect("get"),
            Some(numbered_key(i * 3))
        );
    }
    assert_eq!(scan(&tree).len(), 1000);
}

#[test]
fn test_deep_tree_with_small_pages() {
    let (store, tree) = memory_tree(128);
    for i in 0..500 {
        tree.put(&numbered_key(i), &[0u8; 4]).expect("put");
    }

    assert_eq!(store.page(0).expect("root")[0], b'I');
    assert_sound(&tree);
    let keys: Vec<Vec<u8>> = (0..500).map(numbered_key).collect();
    assert_eq!(scan_keys(&tree), keys);
}

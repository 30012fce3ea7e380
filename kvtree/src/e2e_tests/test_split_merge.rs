//! Test that splits and merges keep the tree sound.

use crate::e2e_tests::helpers::*;

#[test]
fn test_insert_then_delete_in_random_order() {
    let (_store, tree) = memory_tree(256);
    let count = 300;
    for i in shuffled(count, 1) {
        tree.put(&numbered_key(i), &[i.to_le_bytes()[0]; 24]).expect("put");
    }
    assert_sound(&tree);
    assert_eq!(scan(&tree).len(), 300);

    for (n, i) in shuffled(count, 2).into_iter().enumerate() {
        assert!(tree.remove(&numbered_key(i)).expect("remove"), "key {i}");
        if n % 25 == 0 {
            assert_sound(&tree);
        }
    }

    assert_sound(&tree);
    assert!(scan(&tree).is_empty());
    for i in 0..count {
        assert!(!tree.contains_key(&numbered_key(i)).expect("contains"));
    }
}

#[test]
fn test_tree_is_reusable_after_emptying() {
    let (_store, tree) = memory_tree(128);
    for round in 0..3u64 {
        for i in shuffled(120, round) {
            tree.put(&numbered_key(i), &round.to_be_bytes()).expect("put");
        }
        assert_sound(&tree);
        for i in shuffled(120, round + 100) {
            tree.remove(&numbered_key(i)).expect("remove");
        }
        assert_sound(&tree);
        assert!(scan(&tree).is_empty());
    }
}

#[test]
fn test_variable_key_lengths() {
    let (_store, tree) = memory_tree(512);
    let keys: Vec<Vec<u8>> = shuffled(250, 5)
        .into_iter()
        .map(|i| {
            let mut key = numbered_key(i);
            key.extend(std::iter::repeat_n(b'~', usize::from((i % 60).to_le_bytes()[0])));
            key
        })
        .collect();

    for key in &keys {
        tree.put(key, &key[..key.len().min(16)]).expect("put");
    }
    assert_sound(&tree);

    for key in keys.iter().step_by(2) {
        assert!(tree.remove(key).expect("remove"));
    }
    assert_sound(&tree);

    let mut expected: Vec<Vec<u8>> = keys.iter().skip(1).step_by(2).cloned().collect();
    expected.sort();
    assert_eq!(scan_keys(&tree), expected);
}

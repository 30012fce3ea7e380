//! Test ordered and prefix-bounded scans.

use crate::e2e_tests::helpers::*;

#[test]
fn test_scan_is_strictly_ascending() {
    let (_store, tree) = memory_tree(256);
    for i in shuffled(400, 11) {
        tree.put(&numbered_key(i * 7), &numbered_key(i)).expect("put");
    }

    let keys = scan_keys(&tree);
    assert_eq!(keys.len(), 400);
    assert!(keys.windows(2).all(|pair| pair[0] < pair[1]));
}

#[test]
fn test_prefix_scan_is_suffix_of_full_scan() {
    let (_store, tree) = memory_tree(256);
    let words = [
        "apple", "apricot", "banana", "blueberry", "cherry", "date", "elderberry", "fig",
        "grape", "kiwi", "lemon", "lime", "mango", "melon", "nectarine", "orange", "papaya",
        "peach", "pear", "plum", "quince", "raspberry", "strawberry", "tangerine",
    ];
    for word in words {
        tree.put(word.as_bytes(), &[0u8; 30]).expect("put");
    }
    let all = scan_keys(&tree);

    for prefix in ["a", "b", "blue", "c", "lim", "m", "pe", "q", "t", "z"] {
        let found: Vec<Vec<u8>> = tree
            .iter_prefix(prefix.as_bytes())
            .expect("iter")
            .map(|entry| entry.expect("entry").key)
            .collect();
        let expected: Vec<Vec<u8>> = all
            .iter()
            .filter(|key| key.as_slice() >= prefix.as_bytes())
            .cloned()
            .collect();
        assert_eq!(found, expected, "prefix {prefix:?}");
    }
}

#[test]
fn test_prefix_scan_after_deletes() {
    let (_store, tree) = memory_tree(128);
    for i in 0..200 {
        tree.put(&numbered_key(i), b"x").expect("put");
    }
    for i in (0..200).filter(|i| i % 3 != 0) {
        tree.remove(&numbered_key(i)).expect("remove");
    }

    let found: Vec<Vec<u8>> = tree
        .iter_prefix(&numbered_key(100))
        .expect("iter")
        .map(|entry| entry.expect("entry").key)
        .collect();
    let expected: Vec<Vec<u8>> = (100..200)
        .filter(|i| i % 3 == 0)
        .map(numbered_key)
        .collect();
    assert_eq!(found, expected);
    assert_sound(&tree);
}

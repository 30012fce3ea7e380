//! Random operations with keys close to the length limit.
//!
//! Long separators make index pages split, merge and shift after only a few
//! entries, so every operation is followed by a full audit.

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::e2e_tests::helpers::*;

fn long_key_pool(rng: &mut StdRng, count: usize, longest: usize) -> Vec<Vec<u8>> {
    (0..count)
        .map(|_| {
            let len = rng.random_range(1..=longest);
            (0..len).map(|_| rng.random_range(b'a'..=b'd')).collect()
        })
        .collect()
}

fn run_long_key_ops(page_size: usize, seed: u64, ops: usize) {
    let (_store, tree) = memory_tree(page_size);
    let mut model: BTreeMap<Vec<u8>, Vec<u8>> = BTreeMap::new();
    let mut rng = StdRng::seed_from_u64(seed);
    let pool = long_key_pool(&mut rng, 120, tree.max_key_length() - 1);

    for step in 0..ops {
        let key = &pool[rng.random_range(0..pool.len())];
        if rng.random_bool(0.6) {
            let len = rng.random_range(0..=page_size / 3);
            let value: Vec<u8> = (0..len).map(|_| rng.random()).collect();
            let existed = tree
                .put(key, &value)
                .unwrap_or_else(|e| panic!("step {step}: put of {} byte key: {e}", key.len()));
            assert_eq!(existed, model.insert(key.clone(), value).is_some(), "step {step}");
        } else {
            let removed = tree
                .remove(key)
                .unwrap_or_else(|e| panic!("step {step}: remove of {} byte key: {e}", key.len()));
            assert_eq!(removed, model.remove(key).is_some(), "step {step}");
        }
        assert_sound(&tree);
    }

    let expected: Vec<(Vec<u8>, Vec<u8>)> = model.into_iter().collect();
    assert_eq!(scan(&tree), expected);
}

#[test]
fn test_long_keys_small_pages() {
    for seed in 0..5 {
        run_long_key_ops(128, seed, 400);
    }
}

#[test]
fn test_long_keys_medium_pages() {
    for seed in 0..5 {
        run_long_key_ops(256, seed, 400);
    }
}

#[test]
fn test_long_keys_large_pages() {
    for seed in 0..5 {
        run_long_key_ops(512, seed, 400);
    }
}

#[test]
fn test_long_keys_drain_to_empty() {
    let (_store, tree) = memory_tree(128);
    let mut rng = StdRng::seed_from_u64(42);
    let mut pool = long_key_pool(&mut rng, 150, tree.max_key_length() - 1);
    pool.sort();
    pool.dedup();

    for key in &pool {
        tree.put(key, b"v").expect("put");
        assert_sound(&tree);
    }
    assert_eq!(scan_keys(&tree), pool);

    let count = u64::try_from(pool.len()).expect("count fits");
    for i in shuffled(count, 3) {
        let key = &pool[usize::try_from(i).expect("index fits")];
        assert!(tree.remove(key).expect("remove"));
        assert_sound(&tree);
    }
    assert!(scan(&tree).is_empty());
}

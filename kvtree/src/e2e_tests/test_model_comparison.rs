//! Compare random operation sequences against an in-memory ordered map.

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::e2e_tests::helpers::*;

fn run_random_ops(page_size: usize, seed: u64, ops: usize) {
    let (_store, tree) = memory_tree(page_size);
    let mut model: BTreeMap<Vec<u8>, Vec<u8>> = BTreeMap::new();
    let mut rng = StdRng::seed_from_u64(seed);

    for step in 0..ops {
        let key = numbered_key(rng.random_range(0..250));
        if rng.random_bool(0.6) {
            let len = rng.random_range(0..40);
            let value: Vec<u8> = (0..len).map(|_| rng.random()).collect();
            let existed = tree.put(&key, &value).expect("put");
            assert_eq!(existed, model.insert(key, value).is_some(), "step {step}");
        } else {
            let removed = tree.remove(&key).expect("remove");
            assert_eq!(removed, model.remove(&key).is_some(), "step {step}");
        }

        if step % 200 == 0 {
            assert_sound(&tree);
        }
    }

    assert_sound(&tree);
    let expected: Vec<(Vec<u8>, Vec<u8>)> = model.into_iter().collect();
    assert_eq!(scan(&tree), expected);
}

#[test]
fn test_random_ops_small_pages() {
    run_random_ops(128, 7, 3000);
}

#[test]
fn test_random_ops_medium_pages() {
    run_random_ops(512, 8, 3000);
}

#[test]
fn test_random_ops_transactions() {
    let (_store, tree) = memory_tree(256);
    let mut model: BTreeMap<Vec<u8>, Vec<u8>> = BTreeMap::new();
    let mut rng = StdRng::seed_from_u64(9);

    for _ in 0..40 {
        let mut pending = model.clone();
        tree.start_transaction().expect("start");
        for _ in 0..30 {
            let key = numbered_key(rng.random_range(0..150));
            if rng.random_bool(0.7) {
                tree.put(&key, &key).expect("put");
                pending.insert(key.clone(), key);
            } else {
                tree.remove(&key).expect("remove");
                pending.remove(&key);
            }
        }
        if rng.random_bool(0.5) {
            tree.commit_transaction().expect("commit");
            model = pending;
        } else {
            tree.abort_transaction().expect("abort");
        }

        let expected: Vec<(Vec<u8>, Vec<u8>)> = model.clone().into_iter().collect();
        assert_eq!(scan(&tree), expected);
    }
    assert_sound(&tree);
}

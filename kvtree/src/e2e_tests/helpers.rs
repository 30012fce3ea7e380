//! Common helpers for end-to-end tests.

use crate::btree::BTree;
use crate::storage::{MemoryPageStore, PageStore};

use crate::testing::new_memory_tree;
pub use crate::testing::{numbered_key, shuffled};

/// Open a memory-backed tree, panicking on failure.
#[must_use]
pub fn memory_tree(page_size: usize) -> (MemoryPageStore, BTree<MemoryPageStore>) {
    #[allow(clippy::expect_used)]
    let opened = new_memory_tree(page_size).expect("Failed to open test tree");
    opened
}

/// Every key/value pair in scan order.
#[must_use]
pub fn scan<S: PageStore>(tree: &BTree<S>) -> Vec<(Vec<u8>, Vec<u8>)> {
    #[allow(clippy::expect_used)]
    let entries = tree
        .iter()
        .expect("Failed to start scan")
        .map(|entry| {
            let entry = entry.expect("Scan failed");
            (entry.key, entry.value)
        })
        .collect();
    entries
}

/// Every key in scan order.
#[must_use]
pub fn scan_keys<S: PageStore>(tree: &BTree<S>) -> Vec<Vec<u8>> {
    scan(tree).into_iter().map(|(key, _)| key).collect()
}

/// Assert that the tree passes a full integrity audit.
pub fn assert_sound<S: PageStore>(tree: &BTree<S>) {
    #[allow(clippy::expect_used)]
    let report = tree.integrity_report().expect("Integrity audit failed to run");
    assert_eq!(report, None, "tree failed integrity audit");
}

/// Snapshot of every page in the store.
#[must_use]
pub fn snapshot(store: &MemoryPageStore) -> Vec<Vec<u8>> {
    (0..)
        .map_while(|index| store.page(index))
        .collect()
}

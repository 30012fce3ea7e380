use std::sync::Once;

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use crate::btree::{BTree, TreeError};
use crate::config::TreeConfig;
use crate::storage::MemoryPageStore;

static TRACING: Once = Once::new();

/// Install a `tracing` subscriber for the test process.
///
/// Honors `RUST_LOG`; defaults to warnings only.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "kvtree=warn".into());
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// Open a tree over a fresh in-memory store.
///
/// The store handle is returned alongside so tests can inspect pages and
/// statistics or inject faults.
pub fn new_memory_tree(
    page_size: usize,
) -> Result<(MemoryPageStore, BTree<MemoryPageStore>), TreeError> {
    init_tracing();
    let store = MemoryPageStore::new(page_size);
    let tree = BTree::open(store.clone(), &TreeConfig::default())?;
    Ok((store, tree))
}

/// Fixed-width big-endian key for `i`, so numeric and byte order agree.
#[must_use]
pub fn numbered_key(i: u64) -> Vec<u8> {
    i.to_be_bytes().to_vec()
}

/// `0..count` in a reproducible shuffled order.
#[must_use]
pub fn shuffled(count: u64, seed: u64) -> Vec<u64> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut values: Vec<u64> = (0..count).collect();
    values.shuffle(&mut rng);
    values
}

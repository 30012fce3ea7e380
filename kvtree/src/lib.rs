//! An ordered key/value store kept in a single paged file.
//!
//! Life of a mutation:
//! 1. The caller's key and value are validated against the page size.
//! 2. A transaction is opened, unless the caller already holds one.
//! 3. The tree descends from the root page to the owning leaf.
//! 4. The leaf is rewritten, splitting or merging pages up the descent path.
//! 5. Every touched page is staged in the transaction log and flushed in
//!    ascending page order on commit.
//!
//! ```
//! use kvtree::{BTree, TreeConfig};
//! use kvtree::storage::MemoryPageStore;
//!
//! let tree = BTree::open(MemoryPageStore::new(4096), &TreeConfig::default())?;
//! tree.put(b"b", b"2")?;
//! tree.put(b"a", b"1")?;
//!
//! let keys: Vec<Vec<u8>> = tree.iter()?.map(|entry| entry.map(|e| e.key)).collect::<Result<_, _>>()?;
//! assert_eq!(keys, vec![b"a".to_vec(), b"b".to_vec()]);
//! # Ok::<(), kvtree::TreeError>(())
//! ```

pub mod btree;
pub mod config;
pub mod storage;

mod e2e_tests;
#[cfg(test)]
mod testing;

pub use btree::{BTree, Cursor, Entry, FaultKind, TreeError, Violation};
pub use config::{ConfigError, TreeConfig};

//! Forward scans over the leaf chain.

use std::sync::{Arc, Mutex};

use crate::btree::data_page::DataPage;
use crate::btree::element::DataElement;
use crate::btree::error::TreeError;
use crate::btree::tree::TreeCore;
use crate::storage::{NO_PAGE, PageIndex, PageStore};

/// One key/value pair yielded by a [`Cursor`].
pub type Entry = DataElement;

/// Ascending iterator over tree entries.
///
/// A cursor is fail-fast: once the tree is mutated through `put` or `remove`,
/// the next call yields [`TreeError::ConcurrentModification`]. After yielding
/// an error or running out of entries the cursor is fused.
pub struct Cursor<S: PageStore> {
    core: Arc<Mutex<TreeCore<S>>>,
    generation: u64,
    elements: std::vec::IntoIter<DataElement>,
    next_page: PageIndex,
    finished: bool,
}

impl<S: PageStore> Cursor<S> {
    /// Start at position `start` of `leaf`.
    pub(crate) fn new(
        core: Arc<Mutex<TreeCore<S>>>,
        generation: u64,
        leaf: DataPage,
        start: usize,
    ) -> Self {
        let next_page = leaf.next;
        let mut elements = leaf.elements;
        let skipped = start.min(elements.len());
        elements.drain(..skipped);
        Self {
            core,
            generation,
            elements: elements.into_iter(),
            next_page,
            finished: false,
        }
    }

    fn advance(&mut self) -> Result<Option<Entry>, TreeError> {
        #[allow(clippy::expect_used)] // Mutex poisoning indicates unrecoverable state
        let mut core = self.core.lock().expect("lock poisoned");
        if core.generation() != self.generation {
            return Err(TreeError::ConcurrentModification);
        }
        if core.is_closed() {
            return Err(TreeError::Closed);
        }

        loop {
            if let Some(entry) = self.elements.next() {
                return Ok(Some(entry));
            }
            if self.next_page == NO_PAGE {
                return Ok(None);
            }
            let leaf = core.load_data_page(self.next_page)?;
            tracing::trace!("cursor moved to leaf {}", leaf.index);
            self.next_page = leaf.next;
            self.elements = leaf.elements.into_iter();
        }
    }
}

impl<S: PageStore> Iterator for Cursor<S> {
    type Item = Result<Entry, TreeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.advance() {
            Ok(Some(entry)) => Some(Ok(entry)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}

impl<S: PageStore> std::iter::FusedIterator for Cursor<S> {}

impl<S: PageStore> std::fmt::Debug for Cursor<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cursor")
            .field("generation", &self.generation)
            .field("buffered", &self.elements.len())
            .field("next_page", &self.next_page)
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use crate::btree::error::{FaultKind, TreeError};
    use crate::btree::tree::BTree;
    use crate::config::TreeConfig;
    use crate::storage::MemoryPageStore;

    fn tree_with(keys: &[&str]) -> BTree<MemoryPageStore> {
        let tree =
            BTree::open(MemoryPageStore::new(128), &TreeConfig::default()).expect("open tree");
        for key in keys {
            tree.put(key.as_bytes(), key.as_bytes()).expect("put");
        }
        tree
    }

    fn collect_keys(cursor: impl Iterator<Item = Result<super::Entry, TreeError>>) -> Vec<String> {
        cursor
            .map(|entry| String::from_utf8(entry.expect("entry").key).expect("utf8"))
            .collect()
    }

    #[test]
    fn test_empty_tree_yields_nothing() {
        let tree = tree_with(&[]);
        assert_eq!(tree.iter().expect("iter").count(), 0);
        assert_eq!(tree.iter_prefix(b"a").expect("iter").count(), 0);
    }

    #[test]
    fn test_scan_crosses_leaves() {
        let keys: Vec<String> = (0..40).map(|i| format!("key{i:03}")).collect();
        let refs: Vec<&str> = keys.iter().map(String::as_str).collect();
        let tree = tree_with(&refs);

        assert_eq!(collect_keys(tree.iter().expect("iter")), keys);
    }

    #[test]
    fn test_prefix_starts_at_first_key_not_less() {
        let keys: Vec<String> = (0..40).map(|i| format!("key{i:03}")).collect();
        let refs: Vec<&str> = keys.iter().map(String::as_str).collect();
        let tree = tree_with(&refs);

        let found = collect_keys(tree.iter_prefix(b"key020a").expect("iter"));
        assert_eq!(found, keys[21..]);

        let found = collect_keys(tree.iter_prefix(b"key010").expect("iter"));
        assert_eq!(found, keys[10..]);

        assert_eq!(tree.iter_prefix(b"zzz").expect("iter").count(), 0);
        assert_eq!(collect_keys(tree.iter_prefix(b"a").expect("iter")), keys);
    }

    #[test]
    fn test_mutation_invalidates_cursor() {
        let tree = tree_with(&["a", "b", "c"]);
        let mut cursor = tree.iter().expect("iter");
        assert!(cursor.next().expect("first").is_ok());

        tree.put(b"d", b"d").expect("put");
        let error = cursor.next().expect("fault").expect_err("modified");
        assert_eq!(error.kind(), FaultKind::ConcurrentModification);
        assert!(cursor.next().is_none());
    }

    #[test]
    fn test_removal_of_absent_key_still_invalidates() {
        let tree = tree_with(&["a"]);
        let mut cursor = tree.iter().expect("iter");
        assert!(!tree.remove(b"zz").expect("remove"));
        assert!(matches!(
            cursor.next(),
            Some(Err(TreeError::ConcurrentModification))
        ));
    }

    #[test]
    fn test_closed_tree_faults_cursor() {
        let tree = tree_with(&["a", "b"]);
        let mut cursor = tree.iter().expect("iter");
        tree.close().expect("close");
        let error = cursor.next().expect("fault").expect_err("closed");
        assert!(matches!(error, TreeError::Closed));
        assert_eq!(error.kind(), FaultKind::State);
    }

    #[test]
    fn test_cursor_outlives_handle() {
        let tree = tree_with(&["a"]);
        let mut cursor = tree.iter().expect("iter");
        drop(tree);
        assert!(matches!(cursor.next(), Some(Err(TreeError::Closed))));
    }
}

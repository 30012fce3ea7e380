//! The tree facade.
//!
//! [`BTree`] is a handle over shared tree state. Every public operation takes
//! the tree's lock for its whole duration, so at most one operation runs at a
//! time. Mutations run inside a transaction: the caller's explicit one, or an
//! implicit one that commits on success. Any fault inside a mutation aborts
//! the open transaction before the error is returned.
//!
//! Dropping the handle closes the tree.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::btree::cursor::Cursor;
use crate::btree::data_page::{DataPage, Removal};
use crate::btree::element::DataElement;
use crate::btree::error::TreeError;
use crate::btree::index_page::IndexPage;
use crate::btree::page::Page;
use crate::btree::validator::{Validator, Violation};
use crate::config::{MAX_PAGE_SIZE, MIN_PAGE_SIZE, TreeConfig, max_element_size, max_key_length};
use crate::storage::{
    FilePageStore, LogError, MAX_PAGE_INDEX, NO_PAGE, PageBuffer, PageIndex, PageStore, PageTag,
    ROOT_PAGE, TransactionLog,
};

/// Tree state shared between the handle and its cursors.
pub struct TreeCore<S> {
    /// `None` once the tree is closed.
    log: Option<TransactionLog<S>>,
    page_size: usize,
    max_key_length: usize,
    next_free_page: PageIndex,
    /// Allocation counter at transaction start, restored on abort.
    alloc_mark: PageIndex,
    /// Bumped by every put and remove.
    generation: u64,
}

impl<S: PageStore> TreeCore<S> {
    pub(crate) const fn page_size(&self) -> usize {
        self.page_size
    }

    pub(crate) const fn max_element_size(&self) -> usize {
        max_element_size(self.page_size)
    }

    pub(crate) const fn generation(&self) -> u64 {
        self.generation
    }

    pub(crate) const fn is_closed(&self) -> bool {
        self.log.is_none()
    }

    #[cfg(test)]
    pub(crate) const fn next_free_page(&self) -> PageIndex {
        self.next_free_page
    }

    fn log(&mut self) -> Result<&mut TransactionLog<S>, TreeError> {
        self.log.as_mut().ok_or(TreeError::Closed)
    }

    fn is_transaction_open(&self) -> bool {
        self.log.as_ref().is_some_and(TransactionLog::is_started)
    }

    /// Read and decode one page.
    pub(crate) fn load_page(&mut self, index: PageIndex) -> Result<Page, TreeError> {
        let mut buffer = PageBuffer::new(self.page_size);
        self.log()?.read(index, buffer.as_bytes_mut())?;
        Page::decode(index, &buffer)
    }

    pub(crate) fn load_data_page(&mut self, index: PageIndex) -> Result<DataPage, TreeError> {
        match self.load_page(index)? {
            Page::Data(page) => Ok(page),
            Page::Index(_) => Err(TreeError::corrupt(index, "expected a data page")),
        }
    }

    pub(crate) fn load_index_page(&mut self, index: PageIndex) -> Result<IndexPage, TreeError> {
        match self.load_page(index)? {
            Page::Index(page) => Ok(page),
            Page::Data(_) => Err(TreeError::corrupt(index, "expected an index page")),
        }
    }

    pub(crate) fn write_data_page(&mut self, page: &DataPage) -> Result<(), TreeError> {
        let buffer = page.encode(self.page_size)?;
        self.log()?.write(page.index, buffer.as_bytes());
        Ok(())
    }

    pub(crate) fn write_index_page(&mut self, page: &IndexPage) -> Result<(), TreeError> {
        let buffer = page.encode(self.page_size)?;
        self.log()?.write(page.index, buffer.as_bytes());
        Ok(())
    }

    /// Overwrite a page with the terminated tag.
    pub(crate) fn terminate(&mut self, index: PageIndex) -> Result<(), TreeError> {
        let buffer = PageBuffer::tagged(self.page_size, PageTag::Terminated);
        self.log()?.write(index, buffer.as_bytes());
        Ok(())
    }

    /// Reserve the next unused page index.
    pub(crate) fn allocate_page(&mut self) -> Result<PageIndex, TreeError> {
        self.allocate_pages(1)
    }

    fn allocate_pages(&mut self, count: u64) -> Result<PageIndex, TreeError> {
        let start = self.next_free_page;
        let end = start.saturating_add(count);
        if end > MAX_PAGE_INDEX + 1 {
            return Err(TreeError::corrupt(start, "page index space exhausted"));
        }
        self.next_free_page = end;
        Ok(start)
    }

    fn begin(&mut self) -> Result<(), TreeError> {
        self.log()?.start().map_err(|e| match e {
            LogError::AlreadyStarted => TreeError::TransactionOpen,
            other => TreeError::Log(other),
        })?;
        self.alloc_mark = self.next_free_page;
        Ok(())
    }

    fn commit(&mut self) -> Result<(), TreeError> {
        match self.log()?.commit() {
            Ok(()) => Ok(()),
            Err(LogError::NotStarted) => Err(TreeError::NoTransaction),
            Err(e) => {
                // Pages allocated by the failed transaction never reached the store.
                self.next_free_page = self.alloc_mark;
                Err(TreeError::Log(e))
            }
        }
    }

    fn abort(&mut self) -> Result<(), TreeError> {
        self.log()?.abort().map_err(|e| match e {
            LogError::NotStarted => TreeError::NoTransaction,
            other => TreeError::Log(other),
        })?;
        self.next_free_page = self.alloc_mark;
        Ok(())
    }

    /// Run a mutation inside the open transaction, or an implicit one.
    fn mutate<T>(
        &mut self,
        op: impl FnOnce(&mut Self) -> Result<T, TreeError>,
    ) -> Result<T, TreeError> {
        let implicit = !self.log()?.is_started();
        if implicit {
            self.begin()?;
        }
        self.generation += 1;

        let result = op(self).and_then(|value| {
            if implicit {
                self.commit()?;
            }
            Ok(value)
        });

        if let Err(e) = &result
            && self.is_transaction_open()
        {
            tracing::debug!("aborting transaction after fault: {e}");
            if let Err(abort_error) = self.abort() {
                tracing::warn!("abort after fault failed: {abort_error}");
            }
        }
        result
    }

    fn check_key(&self, key: &[u8]) -> Result<(), TreeError> {
        if key.is_empty() {
            return Err(TreeError::EmptyKey);
        }
        if key.len() >= self.max_key_length {
            return Err(TreeError::KeyTooLong {
                length: key.len(),
                max: self.max_key_length,
            });
        }
        Ok(())
    }

    /// Walk from the root to the leaf owning `key`.
    ///
    /// Returns the index pages on the way (root first) and the leaf.
    pub(crate) fn descend(&mut self, key: &[u8]) -> Result<(Vec<IndexPage>, DataPage), TreeError> {
        let mut path = Vec::new();
        let mut page = self.load_page(ROOT_PAGE)?;
        loop {
            match page {
                Page::Index(index_page) => {
                    let child = index_page.find_child(key);
                    path.push(index_page);
                    page = self.load_page(child)?;
                }
                Page::Data(leaf) => return Ok((path, leaf)),
            }
        }
    }

    /// Index pages from the root down to the parent of the leaf owning `key`.
    pub(crate) fn find_parent_path(&mut self, key: &[u8]) -> Result<Vec<IndexPage>, TreeError> {
        Ok(self.descend(key)?.0)
    }

    /// The leftmost leaf.
    pub(crate) fn first_leaf(&mut self) -> Result<DataPage, TreeError> {
        let mut page = self.load_page(ROOT_PAGE)?;
        loop {
            match page {
                Page::Index(index_page) => page = self.load_page(index_page.first_child)?,
                Page::Data(leaf) => return Ok(leaf),
            }
        }
    }

    fn lookup(&mut self, key: &[u8]) -> Result<Option<DataElement>, TreeError> {
        self.check_key(key)?;
        let (_, mut leaf) = self.descend(key)?;
        Ok(leaf
            .search(key)
            .ok()
            .map(|pos| leaf.elements.swap_remove(pos)))
    }

    fn insert_key(&mut self, element: DataElement) -> Result<(), TreeError> {
        let (path, leaf) = self.descend(&element.key)?;
        self.insert_into_leaf(leaf, &path, element)
    }

    fn remove_key(&mut self, key: &[u8]) -> Result<Removal, TreeError> {
        let mut path = Vec::new();
        let mut slots = Vec::new();
        let mut page = self.load_page(ROOT_PAGE)?;
        let leaf = loop {
            match page {
                Page::Index(index_page) => {
                    let (slot, child) = index_page.route(key);
                    path.push(index_page);
                    slots.push(slot);
                    page = self.load_page(child)?;
                }
                Page::Data(leaf) => break leaf,
            }
        };

        let mut state = self.remove_from_leaf(leaf, key)?;
        while state.needs_parent() {
            let (Some(mut page), Some(slot)) = (path.pop(), slots.pop()) else {
                break;
            };
            state = self.restructure(&mut page, &mut path, slot, state)?;
        }
        Ok(state)
    }

    fn create_root(&mut self) -> Result<(), TreeError> {
        self.begin()?;
        let root = DataPage::empty(self.allocate_page()?);
        self.write_data_page(&root)?;
        self.commit()
    }

    /// Check that page 0 reads as a root at this page size.
    ///
    /// Catches stores reopened with a page size they were not written with.
    fn check_root(&mut self, page_count: u64) -> Result<(), TreeError> {
        let in_store = |child: PageIndex| child != ROOT_PAGE && child < page_count;
        match self.load_page(ROOT_PAGE)? {
            Page::Data(leaf) if leaf.prev != NO_PAGE || leaf.next != NO_PAGE => Err(
                TreeError::corrupt(ROOT_PAGE, "root leaf is linked to other leaves"),
            ),
            Page::Data(_) => Ok(()),
            Page::Index(root)
                if in_store(root.first_child)
                    && root.separators.iter().all(|separator| in_store(separator.child)) =>
            {
                Ok(())
            }
            Page::Index(_) => Err(TreeError::corrupt(
                ROOT_PAGE,
                format!("root references a page outside the {page_count} stored pages"),
            )),
        }
    }

    fn close(&mut self) -> Result<(), TreeError> {
        match self.log.take() {
            Some(mut log) => Ok(log.close()?),
            None => Ok(()),
        }
    }
}

/// A disk-backed ordered key/value tree.
///
/// # Example
///
/// ```
/// use kvtree::{BTree, TreeConfig};
/// use kvtree::storage::MemoryPageStore;
///
/// let tree = BTree::open(MemoryPageStore::new(4096), &TreeConfig::default())?;
/// assert!(!tree.put(b"apple", b"red")?);
/// assert_eq!(tree.get(b"apple")?, Some(b"red".to_vec()));
/// assert!(tree.remove(b"apple")?);
/// # Ok::<(), kvtree::TreeError>(())
/// ```
pub struct BTree<S: PageStore> {
    core: Arc<Mutex<TreeCore<S>>>,
    page_size: usize,
    max_key_length: usize,
}

impl BTree<FilePageStore> {
    /// Open the tree stored in the file at `path`, creating the file if needed.
    ///
    /// New files use `config.page_size`. The page size is not recorded in the
    /// file, so an existing file must be opened with the page size it was
    /// created with. A mismatch is reported as an integrity fault when the
    /// root page does not decode, and may otherwise go unnoticed until a
    /// later read.
    pub fn open_file(path: &std::path::Path, config: &TreeConfig) -> Result<Self, TreeError> {
        let store = FilePageStore::open_or_create(path, config.page_size)?;
        Self::open(store, config)
    }
}

impl<S: PageStore> BTree<S> {
    /// Open a tree over `store`.
    ///
    /// An empty store is initialized with an empty root leaf at page 0.
    pub fn open(store: S, config: &TreeConfig) -> Result<Self, TreeError> {
        let page_size = store.page_size();
        if !(MIN_PAGE_SIZE..=MAX_PAGE_SIZE).contains(&page_size) {
            return Err(TreeError::UnsupportedPageSize(page_size));
        }
        let page_count = store.page_count()?;
        let max_key_length = max_key_length(page_size);

        let mut core = TreeCore {
            log: Some(TransactionLog::new(store, config.cache_pages)),
            page_size,
            max_key_length,
            next_free_page: page_count,
            alloc_mark: page_count,
            generation: 0,
        };

        if page_count == 0 {
            core.create_root()?;
            tracing::debug!("created tree (page size {page_size})");
        } else {
            core.check_root(page_count)?;
            tracing::debug!("opened tree with {page_count} pages (page size {page_size})");
        }

        Ok(Self {
            core: Arc::new(Mutex::new(core)),
            page_size,
            max_key_length,
        })
    }

    #[allow(clippy::expect_used)] // Mutex poisoning indicates unrecoverable state
    fn lock(&self) -> MutexGuard<'_, TreeCore<S>> {
        self.core.lock().expect("lock poisoned")
    }

    /// Page size of the underlying store.
    #[must_use]
    pub const fn page_size(&self) -> usize {
        self.page_size
    }

    /// Keys must be non-empty and strictly shorter than this.
    #[must_use]
    pub const fn max_key_length(&self) -> usize {
        self.max_key_length
    }

    /// Store `value` under `key`, replacing any previous value.
    ///
    /// Returns whether the key existed before.
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<bool, TreeError> {
        let mut core = self.lock();
        core.log()?;
        core.check_key(key)?;
        let size = DataElement::encoded_size(key.len(), value.len());
        let max = core.max_element_size();
        if size > max {
            return Err(TreeError::ElementTooLarge { size, max });
        }

        core.mutate(|core| {
            let existed = core.remove_key(key)?.removed();
            core.insert_key(DataElement::new(key.to_vec(), value.to_vec()))?;
            Ok(existed)
        })
    }

    /// The value stored under `key`.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, TreeError> {
        let mut core = self.lock();
        Ok(core.lookup(key)?.map(|element| element.value))
    }

    /// Copy the value stored under `key` into `buf`.
    ///
    /// Returns the value length, or `None` if the key is absent.
    pub fn get_into(&self, key: &[u8], buf: &mut [u8]) -> Result<Option<usize>, TreeError> {
        let mut core = self.lock();
        let Some(element) = core.lookup(key)? else {
            return Ok(None);
        };
        let len = element.value.len();
        if buf.len() < len {
            return Err(TreeError::BufferTooSmall {
                size: buf.len(),
                required: len,
            });
        }
        buf[..len].copy_from_slice(&element.value);
        Ok(Some(len))
    }

    /// Whether `key` is present.
    pub fn contains_key(&self, key: &[u8]) -> Result<bool, TreeError> {
        Ok(self.lock().lookup(key)?.is_some())
    }

    /// Length of the value stored under `key`.
    pub fn length(&self, key: &[u8]) -> Result<Option<usize>, TreeError> {
        Ok(self.lock().lookup(key)?.map(|element| element.value.len()))
    }

    /// Remove `key`. Returns whether it was present.
    pub fn remove(&self, key: &[u8]) -> Result<bool, TreeError> {
        let mut core = self.lock();
        core.log()?;
        core.check_key(key)?;
        core.mutate(|core| Ok(core.remove_key(key)?.removed()))
    }

    /// Open an explicit transaction.
    pub fn start_transaction(&self) -> Result<(), TreeError> {
        self.lock().begin()
    }

    /// Flush the open transaction to the store.
    pub fn commit_transaction(&self) -> Result<(), TreeError> {
        self.lock().commit()
    }

    /// Discard the open transaction.
    pub fn abort_transaction(&self) -> Result<(), TreeError> {
        self.lock().abort()
    }

    /// Whether an explicit transaction is open.
    #[must_use]
    pub fn is_transaction_open(&self) -> bool {
        self.lock().is_transaction_open()
    }

    /// Write `data` to a fresh run of pages outside the tree.
    ///
    /// The last page is zero padded. Returns the first page index.
    pub fn put_blob(&self, data: &[u8]) -> Result<PageIndex, TreeError> {
        let mut core = self.lock();
        if core.log()?.is_started() {
            return Err(TreeError::TransactionOpen);
        }

        let page_size = core.page_size;
        let pages = data.len().div_ceil(page_size) as u64;
        let start = core.allocate_pages(pages)?;

        let whole = data.len() - data.len() % page_size;
        if whole > 0 {
            core.log()?.write_direct(start, &data[..whole])?;
        }
        if whole < data.len() {
            let mut tail = vec![0u8; page_size];
            tail[..data.len() - whole].copy_from_slice(&data[whole..]);
            core.log()?.write_direct(start + (whole / page_size) as u64, &tail)?;
        }

        tracing::trace!("wrote blob of {} bytes at page {start}", data.len());
        Ok(start)
    }

    /// Fill `buf` from the blob starting at page `start`.
    pub fn get_blob(&self, start: PageIndex, buf: &mut [u8]) -> Result<(), TreeError> {
        let mut core = self.lock();
        if core.log()?.is_started() {
            return Err(TreeError::TransactionOpen);
        }
        core.log()?.read_direct(start, buf)?;
        Ok(())
    }

    /// Iterate over all entries in ascending key order.
    pub fn iter(&self) -> Result<Cursor<S>, TreeError> {
        let mut core = self.lock();
        let leaf = core.first_leaf()?;
        let generation = core.generation();
        drop(core);
        Ok(Cursor::new(self.shared(), generation, leaf, 0))
    }

    /// Iterate over entries whose key is at least `prefix`, in ascending order.
    pub fn iter_prefix(&self, prefix: &[u8]) -> Result<Cursor<S>, TreeError> {
        let mut core = self.lock();
        let (_, leaf) = core.descend(prefix)?;
        let start = leaf
            .elements
            .partition_point(|element| element.key.as_slice() < prefix);
        let generation = core.generation();
        drop(core);
        Ok(Cursor::new(self.shared(), generation, leaf, start))
    }

    #[allow(clippy::disallowed_methods)] // Arc::clone is safe and expected
    fn shared(&self) -> Arc<Mutex<TreeCore<S>>> {
        Arc::clone(&self.core)
    }

    /// Audit the whole tree. Returns whether it is structurally sound.
    pub fn integrity_check(&self) -> Result<bool, TreeError> {
        Ok(self.integrity_report()?.is_none())
    }

    /// Audit the whole tree, returning the first violation found.
    pub fn integrity_report(&self) -> Result<Option<Violation>, TreeError> {
        let mut core = self.lock();
        core.log()?;
        let violation = Validator::new(&mut core).run()?;
        if let Some(violation) = &violation {
            tracing::warn!("integrity check failed: {violation}");
        }
        Ok(violation)
    }

    /// Close the tree and its store.
    ///
    /// Closing with an open transaction discards it and reports an error.
    /// Closing an already closed tree does nothing.
    pub fn close(&self) -> Result<(), TreeError> {
        self.lock().close()
    }
}

impl<S: PageStore> Drop for BTree<S> {
    fn drop(&mut self) {
        let Ok(mut core) = self.core.lock() else {
            return;
        };
        if core.is_transaction_open() {
            tracing::warn!("tree dropped with an open transaction, discarding it");
        }
        if let Err(e) = core.close() {
            tracing::warn!("closing tree on drop failed: {e}");
        }
    }
}

impl<S: PageStore> std::fmt::Debug for BTree<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BTree")
            .field("page_size", &self.page_size)
            .field("max_key_length", &self.max_key_length)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::btree::element::IndexElement;
    use crate::btree::error::FaultKind;
    use crate::storage::MemoryPageStore;

    fn new_tree(page_size: usize) -> (MemoryPageStore, BTree<MemoryPageStore>) {
        let store = MemoryPageStore::new(page_size);
        let tree = BTree::open(store.clone(), &TreeConfig::default()).expect("open tree");
        (store, tree)
    }

    #[test]
    fn test_open_writes_empty_root_leaf() {
        let (store, tree) = new_tree(256);
        assert_eq!(store.page_count().expect("count"), 1);
        let root = store.page(0).expect("root");
        assert_eq!(root[0], b'D');
        assert!(root[1..].iter().all(|&b| b == 0));
        assert_eq!(tree.page_size(), 256);
        assert_eq!(tree.max_key_length(), 118);
    }

    #[test]
    fn test_open_rejects_root_outside_store() {
        let mut store = MemoryPageStore::new(128);
        let root = IndexPage {
            index: ROOT_PAGE,
            first_child: 1,
            separators: vec![IndexElement::new(b"m".to_vec(), 9)],
        };
        store
            .write(ROOT_PAGE, root.encode(128).expect("encode").as_bytes())
            .expect("write root");
        store
            .write(1, DataPage::empty(1).encode(128).expect("encode").as_bytes())
            .expect("write leaf");

        let error = BTree::open(store, &TreeConfig::default()).expect_err("root out of range");
        assert_eq!(error.kind(), FaultKind::Integrity);
    }

    #[test]
    fn test_open_rejects_unsupported_page_size() {
        let result = BTree::open(MemoryPageStore::new(64), &TreeConfig::default());
        assert!(matches!(result, Err(TreeError::UnsupportedPageSize(64))));
    }

    #[test]
    fn test_put_get_replace() {
        let (_store, tree) = new_tree(256);
        assert!(!tree.put(b"k", b"one").expect("put"));
        assert!(tree.put(b"k", b"two").expect("put"));
        assert_eq!(tree.get(b"k").expect("get"), Some(b"two".to_vec()));
        assert_eq!(tree.length(b"k").expect("length"), Some(3));
        assert!(tree.contains_key(b"k").expect("contains"));
        assert_eq!(tree.get(b"missing").expect("get"), None);
    }

    #[test]
    fn test_get_into() {
        let (_store, tree) = new_tree(256);
        tree.put(b"k", b"value").expect("put");

        let mut buf = [0u8; 8];
        assert_eq!(tree.get_into(b"k", &mut buf).expect("get"), Some(5));
        assert_eq!(&buf[..5], b"value");

        let mut small = [0u8; 2];
        let error = tree.get_into(b"k", &mut small).expect_err("too small");
        assert!(matches!(
            error,
            TreeError::BufferTooSmall {
                size: 2,
                required: 5
            }
        ));
        assert_eq!(error.kind(), FaultKind::Validation);
    }

    #[test]
    fn test_key_and_element_limits() {
        let (store, tree) = new_tree(256);
        let writes = store.stats().writes;

        assert!(matches!(tree.put(b"", b"v"), Err(TreeError::EmptyKey)));
        assert!(matches!(
            tree.put(&[1u8; 118], b"v"),
            Err(TreeError::KeyTooLong {
                length: 118,
                max: 118
            })
        ));
        assert!(matches!(
            tree.put(b"k", &[0u8; 240]),
            Err(TreeError::ElementTooLarge { size: 244, max: 243 })
        ));
        tree.put(b"k", &[0u8; 239]).expect("largest element fits");
        assert!(matches!(tree.get(&[1u8; 200]), Err(TreeError::KeyTooLong { .. })));

        assert_eq!(store.stats().writes, writes + 1);
        assert!(!tree.is_transaction_open());
    }

    #[test]
    fn test_remove_absent_writes_nothing() {
        let (store, tree) = new_tree(256);
        tree.put(b"a", b"1").expect("put");
        let before = store.stats();
        assert!(!tree.remove(b"b").expect("remove"));
        assert_eq!(store.stats().writes, before.writes);
        assert_eq!(store.stats().syncs, before.syncs);
    }

    #[test]
    fn test_remove_last_key_keeps_root_leaf() {
        let (store, tree) = new_tree(256);
        tree.put(b"a", b"1").expect("put");
        assert!(tree.remove(b"a").expect("remove"));
        assert_eq!(tree.get(b"a").expect("get"), None);
        assert_eq!(store.page(0).expect("root")[0], b'D');
        assert!(tree.integrity_check().expect("check"));
    }

    #[test]
    fn test_transaction_state_errors() {
        let (_store, tree) = new_tree(256);
        assert!(matches!(
            tree.commit_transaction(),
            Err(TreeError::NoTransaction)
        ));
        assert!(matches!(
            tree.abort_transaction(),
            Err(TreeError::NoTransaction)
        ));

        tree.start_transaction().expect("start");
        assert!(tree.is_transaction_open());
        let error = tree.start_transaction().expect_err("nested");
        assert!(matches!(error, TreeError::TransactionOpen));
        assert_eq!(error.kind(), FaultKind::State);
        tree.commit_transaction().expect("commit");
        assert!(!tree.is_transaction_open());
    }

    #[test]
    fn test_abort_restores_allocation() {
        let (_store, tree) = new_tree(128);
        tree.start_transaction().expect("start");
        for i in 0u8..20 {
            tree.put(&[b'k', i], &[i; 16]).expect("put");
        }
        assert!(tree.lock().next_free_page() > 1);
        tree.abort_transaction().expect("abort");
        assert_eq!(tree.lock().next_free_page(), 1);
        assert_eq!(tree.get(&[b'k', 3]).expect("get"), None);
    }

    #[test]
    fn test_closed_tree_rejects_operations() {
        let (store, tree) = new_tree(256);
        tree.close().expect("close");
        assert!(store.is_closed());
        assert!(matches!(tree.put(b"k", b"v"), Err(TreeError::Closed)));
        assert!(matches!(tree.get(b"k"), Err(TreeError::Closed)));
        assert!(matches!(tree.start_transaction(), Err(TreeError::Closed)));
        assert!(matches!(tree.iter(), Err(TreeError::Closed)));
        tree.close().expect("second close is a no-op");
    }

    #[test]
    fn test_close_with_open_transaction_is_fault() {
        let (store, tree) = new_tree(256);
        tree.start_transaction().expect("start");
        tree.put(b"k", b"v").expect("put");
        let error = tree.close().expect_err("open transaction");
        assert_eq!(error.kind(), FaultKind::State);
        assert!(store.is_closed());
        assert_eq!(store.stats().writes, 1);
    }

    #[test]
    fn test_drop_closes_store() {
        let (store, tree) = new_tree(256);
        drop(tree);
        assert!(store.is_closed());
    }
}

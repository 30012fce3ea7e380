//! Single-level transaction buffer over a page store.
//!
//! Writes are staged in a pending buffer ordered by page index and mirrored
//! into a bounded LRU cache of page images. Reads consult the pending buffer,
//! then the cache, then the device. Commit flushes the pending buffer in
//! ascending page order; abort discards it and evicts the pages it touched
//! from the cache so no aborted image can be read back.
//!
//! # Invariants
//!
//! - At most one transaction is open at a time
//! - The device sees no tree page write until `commit`
//! - Direct (blob) writes never interleave with pending tree writes
//!
//! No pre-image is kept: a failure halfway through `commit` can leave a
//! partially applied set of pages on the device.

use std::collections::BTreeMap;
use std::num::NonZeroUsize;

use lru::LruCache;

use crate::storage::io::{PageStore, StoreError, check_whole_pages};
use crate::storage::page::PageIndex;

/// Errors raised by the transaction log.
#[derive(Debug)]
pub enum LogError {
    /// `start` while a transaction is open.
    AlreadyStarted,
    /// `commit`/`abort` without an open transaction.
    NotStarted,
    /// Direct write attempted while tree writes are pending.
    PendingWrites(usize),
    /// The log was closed while a transaction was still open.
    ClosedWithOpenTransaction,
    /// Device error.
    Store(StoreError),
}

impl std::fmt::Display for LogError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AlreadyStarted => write!(f, "transaction already started"),
            Self::NotStarted => write!(f, "transaction not started"),
            Self::PendingWrites(count) => {
                write!(f, "{count} uncommitted page writes exist")
            }
            Self::ClosedWithOpenTransaction => {
                write!(f, "changes not committed, transaction aborted on close")
            }
            Self::Store(e) => write!(f, "store error: {e}"),
        }
    }
}

impl std::error::Error for LogError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Store(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StoreError> for LogError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

/// Buffered, cached access to a page store.
pub struct TransactionLog<S> {
    store: S,
    pending: BTreeMap<PageIndex, Box<[u8]>>,
    cache: LruCache<PageIndex, Box<[u8]>>,
    started: bool,
}

impl<S: PageStore> TransactionLog<S> {
    /// Wrap `store` with a cache holding up to `cache_pages` page images.
    pub fn new(store: S, cache_pages: NonZeroUsize) -> Self {
        Self {
            store,
            pending: BTreeMap::new(),
            cache: LruCache::new(cache_pages),
            started: false,
        }
    }

    /// Page size of the underlying device.
    #[must_use]
    pub fn page_size(&self) -> usize {
        self.store.page_size()
    }

    /// Number of pages on the device (pending pages excluded).
    pub fn page_count(&self) -> Result<u64, LogError> {
        Ok(self.store.page_count()?)
    }

    /// Whether a transaction is open.
    #[must_use]
    pub const fn is_started(&self) -> bool {
        self.started
    }

    /// Number of pages staged in the open transaction.
    #[must_use]
    pub fn pending_pages(&self) -> usize {
        self.pending.len()
    }

    /// Open a transaction.
    pub fn start(&mut self) -> Result<(), LogError> {
        if self.started {
            return Err(LogError::AlreadyStarted);
        }
        self.started = true;
        Ok(())
    }

    /// Flush the pending buffer in ascending page order and close the transaction.
    ///
    /// On failure the transaction is still closed; the pages that were staged
    /// are evicted from the cache since the device state is no longer known.
    pub fn commit(&mut self) -> Result<(), LogError> {
        if !self.started {
            return Err(LogError::NotStarted);
        }
        self.started = false;

        let pending = std::mem::take(&mut self.pending);
        let count = pending.len();
        let result = Self::flush(&mut self.store, &pending);

        if let Err(e) = result {
            for index in pending.keys() {
                self.cache.pop(index);
            }
            tracing::warn!("commit of {count} pages failed: {e}");
            return Err(e.into());
        }

        tracing::trace!("committed {count} pages");
        Ok(())
    }

    fn flush(store: &mut S, pending: &BTreeMap<PageIndex, Box<[u8]>>) -> Result<(), StoreError> {
        if pending.is_empty() {
            return Ok(());
        }
        for (&index, page) in pending {
            store.write(index, page)?;
        }
        store.sync()
    }

    /// Discard the pending buffer without touching the device.
    pub fn abort(&mut self) -> Result<(), LogError> {
        if !self.started {
            return Err(LogError::NotStarted);
        }
        for index in self.pending.keys() {
            self.cache.pop(index);
        }
        tracing::trace!("aborted transaction, discarded {} pages", self.pending.len());
        self.pending.clear();
        self.started = false;
        Ok(())
    }

    /// Stage one page image.
    pub fn write(&mut self, index: PageIndex, page: &[u8]) {
        let image: Box<[u8]> = page.into();
        self.cache.put(index, image.clone());
        self.pending.insert(index, image);
    }

    /// Read one page image into `buf`.
    pub fn read(&mut self, index: PageIndex, buf: &mut [u8]) -> Result<(), LogError> {
        if let Some(page) = self.pending.get(&index) {
            buf.copy_from_slice(&page[..buf.len()]);
            return Ok(());
        }
        if let Some(page) = self.cache.get(&index) {
            buf.copy_from_slice(&page[..buf.len()]);
            return Ok(());
        }

        self.store.read(index, buf)?;
        self.cache.put(index, Box::from(&*buf));
        Ok(())
    }

    /// Write whole pages straight to the device, bypassing buffer and cache.
    pub fn write_direct(&mut self, index: PageIndex, data: &[u8]) -> Result<(), LogError> {
        if !self.pending.is_empty() {
            return Err(LogError::PendingWrites(self.pending.len()));
        }
        check_whole_pages(data.len(), self.page_size())?;
        self.store.write(index, data)?;
        Ok(())
    }

    /// Read `buf.len()` bytes straight from the device starting at page `index`.
    pub fn read_direct(&mut self, index: PageIndex, buf: &mut [u8]) -> Result<(), LogError> {
        self.store.read(index, buf)?;
        Ok(())
    }

    /// Drop all buffered state and close the device.
    ///
    /// Closing with an open transaction discards it and reports
    /// `LogError::ClosedWithOpenTransaction` after the device is closed.
    pub fn close(&mut self) -> Result<(), LogError> {
        let was_started = self.started;
        self.pending.clear();
        self.cache.clear();
        self.started = false;

        self.store.close()?;

        if was_started {
            return Err(LogError::ClosedWithOpenTransaction);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::{FaultConfig, MemoryPageStore};

    const PAGE: usize = 64;

    fn new_log(store: &MemoryPageStore) -> TransactionLog<MemoryPageStore> {
        TransactionLog::new(store.clone(), NonZeroUsize::new(4).expect("non-zero"))
    }

    #[test]
    fn test_start_twice_fails() {
        let store = MemoryPageStore::new(PAGE);
        let mut log = new_log(&store);
        log.start().expect("start");
        assert!(matches!(log.start(), Err(LogError::AlreadyStarted)));
        assert!(matches!(
            new_log(&store).commit(),
            Err(LogError::NotStarted)
        ));
    }

    #[test]
    fn test_pending_writes_visible_before_commit() {
        let store = MemoryPageStore::new(PAGE);
        let mut log = new_log(&store);

        log.start().expect("start");
        log.write(3, &[5u8; PAGE]);

        let mut buf = [0u8; PAGE];
        log.read(3, &mut buf).expect("read pending");
        assert_eq!(buf, [5u8; PAGE]);
        assert_eq!(store.stats().writes, 0);
        assert_eq!(store.page_count().expect("count"), 0);
    }

    #[test]
    fn test_commit_flushes_in_ascending_order() {
        let store = MemoryPageStore::new(PAGE);
        let mut log = new_log(&store);

        log.start().expect("start");
        log.write(2, &[2u8; PAGE]);
        log.write(0, &[0xAu8; PAGE]);
        log.write(1, &[1u8; PAGE]);
        log.commit().expect("commit");

        assert!(!log.is_started());
        assert_eq!(log.pending_pages(), 0);
        assert_eq!(store.stats().writes, 3);
        assert_eq!(store.stats().syncs, 1);
        assert_eq!(store.page(0), Some(vec![0xAu8; PAGE]));
        assert_eq!(store.page(2), Some(vec![2u8; PAGE]));
    }

    #[test]
    fn test_empty_commit_touches_nothing() {
        let store = MemoryPageStore::new(PAGE);
        let mut log = new_log(&store);
        log.start().expect("start");
        log.commit().expect("commit");
        assert_eq!(store.stats(), Default::default());
    }

    #[test]
    fn test_abort_discards_and_evicts_cache() {
        let store = MemoryPageStore::new(PAGE);
        let mut log = new_log(&store);

        log.start().expect("start");
        log.write(0, &[1u8; PAGE]);
        log.commit().expect("commit");

        log.start().expect("start");
        log.write(0, &[2u8; PAGE]);
        log.abort().expect("abort");

        let mut buf = [0u8; PAGE];
        log.read(0, &mut buf).expect("read");
        assert_eq!(buf, [1u8; PAGE]);
        assert_eq!(store.stats().writes, 1);
    }

    #[test]
    fn test_read_populates_cache() {
        let mut store = MemoryPageStore::new(PAGE);
        store.write(0, &[7u8; PAGE]).expect("seed");
        let mut log = new_log(&store);

        let mut buf = [0u8; PAGE];
        log.read(0, &mut buf).expect("first read");
        log.read(0, &mut buf).expect("cached read");
        assert_eq!(store.stats().reads, 1);
    }

    #[test]
    fn test_write_direct_rules() {
        let store = MemoryPageStore::new(PAGE);
        let mut log = new_log(&store);

        assert!(matches!(
            log.write_direct(0, &[0u8; PAGE + 1]),
            Err(LogError::Store(StoreError::Misaligned { .. }))
        ));

        log.start().expect("start");
        log.write(0, &[1u8; PAGE]);
        assert!(matches!(
            log.write_direct(1, &[0u8; PAGE]),
            Err(LogError::PendingWrites(1))
        ));
        log.abort().expect("abort");

        log.write_direct(1, &[3u8; 2 * PAGE]).expect("direct write");
        let mut buf = vec![0u8; PAGE + 10];
        log.read_direct(1, &mut buf).expect("direct read");
        assert!(buf.iter().all(|&b| b == 3));
    }

    #[test]
    fn test_failed_commit_closes_transaction() {
        let store = MemoryPageStore::new(PAGE);
        let mut log = new_log(&store);

        log.start().expect("start");
        log.write(0, &[1u8; PAGE]);
        store.set_fault_config(FaultConfig::failing_writes());
        assert!(matches!(log.commit(), Err(LogError::Store(_))));
        assert!(!log.is_started());

        store.set_fault_config(FaultConfig::no_faults());
        let mut buf = [0u8; PAGE];
        assert!(matches!(
            log.read(0, &mut buf),
            Err(LogError::Store(StoreError::PageOutOfBounds { .. }))
        ));
    }

    #[test]
    fn test_close_with_open_transaction() {
        let store = MemoryPageStore::new(PAGE);
        let mut log = new_log(&store);
        log.start().expect("start");
        log.write(0, &[1u8; PAGE]);
        assert!(matches!(
            log.close(),
            Err(LogError::ClosedWithOpenTransaction)
        ));
        assert!(store.is_closed());
        assert_eq!(store.stats().writes, 0);
    }
}

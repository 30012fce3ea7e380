//! In-memory page store for deterministic testing.
//!
//! The store is a cheap, cloneable handle onto shared state, so a test can
//! keep one handle for inspection and fault control while the tree owns
//! another. Fault injection is rate based and driven by a seeded RNG:
//! - Page-level read errors
//! - Page-level write errors

use std::sync::{Arc, Mutex, MutexGuard};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::storage::io::{PageStore, StoreError, check_whole_pages};
use crate::storage::page::PageIndex;

/// Configuration for fault injection.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FaultConfig {
    /// Probability of a read error (0.0 - 1.0).
    pub read_error_rate: f64,
    /// Probability of a write error (0.0 - 1.0).
    pub write_error_rate: f64,
}

impl FaultConfig {
    /// No faults (for baseline testing).
    #[must_use]
    pub fn no_faults() -> Self {
        Self::default()
    }

    /// Every read fails.
    #[must_use]
    pub const fn failing_reads() -> Self {
        Self {
            read_error_rate: 1.0,
            write_error_rate: 0.0,
        }
    }

    /// Every write fails.
    #[must_use]
    pub const fn failing_writes() -> Self {
        Self {
            read_error_rate: 0.0,
            write_error_rate: 1.0,
        }
    }
}

/// Statistics about store operations.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MemoryStoreStats {
    /// Number of read calls that reached the device.
    pub reads: u64,
    /// Number of write calls that reached the device.
    pub writes: u64,
    /// Number of syncs.
    pub syncs: u64,
    /// Number of injected read errors.
    pub injected_read_errors: u64,
    /// Number of injected write errors.
    pub injected_write_errors: u64,
}

struct MemoryState {
    pages: Vec<Box<[u8]>>,
    closed: bool,
    fault_config: FaultConfig,
    rng: StdRng,
    stats: MemoryStoreStats,
}

/// In-memory page store.
///
/// # Thread Safety
///
/// Handles share state behind a mutex; clones observe each other's writes.
#[derive(Clone)]
pub struct MemoryPageStore {
    page_size: usize,
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryPageStore {
    /// Default seed for the fault-injection RNG.
    pub const DEFAULT_SEED: u64 = 0x6b76_7472_6565;

    /// Create an empty store with no faults.
    #[must_use]
    pub fn new(page_size: usize) -> Self {
        Self::with_seed(page_size, Self::DEFAULT_SEED)
    }

    /// Create an empty store whose fault decisions derive from `seed`.
    #[must_use]
    pub fn with_seed(page_size: usize, seed: u64) -> Self {
        Self {
            page_size,
            state: Arc::new(Mutex::new(MemoryState {
                pages: Vec::new(),
                closed: false,
                fault_config: FaultConfig::no_faults(),
                rng: StdRng::seed_from_u64(seed),
                stats: MemoryStoreStats::default(),
            })),
        }
    }

    #[allow(clippy::expect_used)] // Mutex poisoning indicates unrecoverable state
    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().expect("lock poisoned")
    }

    /// Replace the fault configuration.
    pub fn set_fault_config(&self, config: FaultConfig) {
        self.lock().fault_config = config;
    }

    /// Snapshot of the operation counters.
    #[must_use]
    pub fn stats(&self) -> MemoryStoreStats {
        self.lock().stats
    }

    /// Copy of a stored page, bypassing fault injection and statistics.
    #[must_use]
    pub fn page(&self, index: PageIndex) -> Option<Vec<u8>> {
        let state = self.lock();
        let slot = usize::try_from(index).ok()?;
        state.pages.get(slot).map(|page| page.to_vec())
    }

    /// Whether `close` has been called on any handle.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }
}

impl MemoryState {
    fn should_inject(&mut self, rate: f64) -> bool {
        rate > 0.0 && self.rng.random::<f64>() < rate
    }
}

impl std::fmt::Debug for MemoryPageStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("MemoryPageStore")
            .field("page_size", &self.page_size)
            .field("page_count", &state.pages.len())
            .field("stats", &state.stats)
            .finish_non_exhaustive()
    }
}

#[allow(clippy::cast_possible_truncation)] // page indices stay far below usize::MAX in memory
impl PageStore for MemoryPageStore {
    fn page_size(&self) -> usize {
        self.page_size
    }

    fn page_count(&self) -> Result<u64, StoreError> {
        let state = self.lock();
        if state.closed {
            return Err(StoreError::Closed);
        }
        Ok(state.pages.len() as u64)
    }

    fn read(&mut self, index: PageIndex, buf: &mut [u8]) -> Result<(), StoreError> {
        let page_size = self.page_size;
        let mut state = self.lock();
        if state.closed {
            return Err(StoreError::Closed);
        }

        state.stats.reads += 1;
        let rate = state.fault_config.read_error_rate;
        if state.should_inject(rate) {
            state.stats.injected_read_errors += 1;
            return Err(StoreError::InjectedFault(format!("read of page {index}")));
        }

        let page_count = state.pages.len() as u64;
        let first = index as usize;
        let spanned = buf.len().div_ceil(page_size);
        if first + spanned > state.pages.len() {
            return Err(StoreError::PageOutOfBounds { index, page_count });
        }

        for (chunk, page) in buf.chunks_mut(page_size).zip(&state.pages[first..]) {
            chunk.copy_from_slice(&page[..chunk.len()]);
        }
        Ok(())
    }

    fn write(&mut self, index: PageIndex, buf: &[u8]) -> Result<(), StoreError> {
        check_whole_pages(buf.len(), self.page_size)?;

        let page_size = self.page_size;
        let mut state = self.lock();
        if state.closed {
            return Err(StoreError::Closed);
        }

        state.stats.writes += 1;
        let rate = state.fault_config.write_error_rate;
        if state.should_inject(rate) {
            state.stats.injected_write_errors += 1;
            return Err(StoreError::InjectedFault(format!("write of page {index}")));
        }

        let first = index as usize;
        let end = first + buf.len() / page_size;
        if state.pages.len() < end {
            state
                .pages
                .resize_with(end, || vec![0u8; page_size].into_boxed_slice());
        }
        for (page, chunk) in state.pages[first..end].iter_mut().zip(buf.chunks(page_size)) {
            page.copy_from_slice(chunk);
        }
        Ok(())
    }

    fn sync(&mut self) -> Result<(), StoreError> {
        let mut state = self.lock();
        if state.closed {
            return Err(StoreError::Closed);
        }
        state.stats.syncs += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<(), StoreError> {
        let mut state = self.lock();
        if state.closed {
            return Err(StoreError::Closed);
        }
        state.closed = true;
        Ok(())
    }
}

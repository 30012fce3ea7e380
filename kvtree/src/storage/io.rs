//! Page device abstraction.
//!
//! The tree never touches files directly. It talks to a `PageStore`: a
//! fixed-page-size, randomly addressable device. Production code uses
//! [`FilePageStore`](crate::storage::FilePageStore); tests use the in-memory
//! [`MemoryPageStore`](crate::storage::MemoryPageStore), which can inject
//! faults.

use crate::storage::page::PageIndex;

/// Errors that can occur during page device operations.
#[derive(Debug)]
pub enum StoreError {
    /// I/O error.
    Io(std::io::Error),
    /// Page out of bounds.
    PageOutOfBounds { index: PageIndex, page_count: u64 },
    /// A transfer length that is not a whole number of pages where one is required.
    Misaligned { len: usize, page_size: usize },
    /// The device was already closed.
    Closed,
    /// Injected fault for simulation.
    InjectedFault(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::PageOutOfBounds { index, page_count } => {
                write!(f, "page {index} out of bounds (page count: {page_count})")
            }
            Self::Misaligned { len, page_size } => {
                write!(f, "length {len} is not a multiple of the page size {page_size}")
            }
            Self::Closed => write!(f, "page store is closed"),
            Self::InjectedFault(msg) => write!(f, "injected fault: {msg}"),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

/// Abstraction over a fixed-size random-access page device.
///
/// # Implementation Notes
///
/// Implementations must ensure:
/// - `read` returns the last written content for every page it covers
/// - `write` past the current end extends the device; `page_count` grows to
///   cover the highest page written
/// - transfers start on a page boundary and may span several consecutive
///   pages; `write` buffers are whole pages, `read` buffers may end mid-page
pub trait PageStore {
    /// Size of one page in bytes.
    fn page_size(&self) -> usize;

    /// Number of pages currently held by the device.
    fn page_count(&self) -> Result<u64, StoreError>;

    /// Read `buf.len()` bytes starting at the first byte of page `index`.
    fn read(&mut self, index: PageIndex, buf: &mut [u8]) -> Result<(), StoreError>;

    /// Write whole pages starting at page `index`.
    fn write(&mut self, index: PageIndex, buf: &[u8]) -> Result<(), StoreError>;

    /// Make all previous writes durable.
    fn sync(&mut self) -> Result<(), StoreError>;

    /// Release the device. Further calls fail with `StoreError::Closed`.
    fn close(&mut self) -> Result<(), StoreError>;
}

/// Reject transfers that do not cover whole pages.
pub const fn check_whole_pages(len: usize, page_size: usize) -> Result<(), StoreError> {
    if len % page_size == 0 {
        Ok(())
    } else {
        Err(StoreError::Misaligned { len, page_size })
    }
}

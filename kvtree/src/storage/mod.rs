//! Page storage layer.
//!
//! Everything below the tree: the page buffer codec, the page device
//! abstraction and its two implementations, and the transaction log that
//! buffers and caches page writes.
//!
//! # Usage
//!
//! ```
//! use std::num::NonZeroUsize;
//! use kvtree::storage::{MemoryPageStore, PageStore, TransactionLog};
//!
//! let store = MemoryPageStore::new(128);
//! let mut log = TransactionLog::new(store.clone(), NonZeroUsize::MIN);
//!
//! log.start()?;
//! log.write(0, &[b'D'; 128]);
//! log.commit()?;
//!
//! assert_eq!(store.page_count()?, 1);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod file;
mod io;
mod memory;
mod page;
mod transaction_log;

pub use file::FilePageStore;
pub use io::{PageStore, StoreError};
pub use memory::{FaultConfig, MemoryPageStore, MemoryStoreStats};
pub use page::{
    MAX_PAGE_INDEX, NO_PAGE, PAGE_INDEX_SIZE, PageBuffer, PageError, PageIndex, PageReader,
    PageTag, PageWriter, ROOT_PAGE,
};
pub use transaction_log::{LogError, TransactionLog};

//! File-backed page store.
//!
//! Page `i` lives at byte offset `i * page_size`. The file length is always
//! a whole number of pages.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::storage::io::{PageStore, StoreError, check_whole_pages};
use crate::storage::page::PageIndex;

/// A page store over a single file.
#[derive(Debug)]
pub struct FilePageStore {
    file: Option<File>,
    page_size: usize,
    page_count: u64,
}

impl FilePageStore {
    /// Create a new, empty store at the given path.
    ///
    /// Returns an error if the file already exists.
    pub fn create(path: &Path, page_size: usize) -> Result<Self, StoreError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)?;

        tracing::debug!("created page file {} (page size {page_size})", path.display());

        Ok(Self {
            file: Some(file),
            page_size,
            page_count: 0,
        })
    }

    /// Open an existing store.
    ///
    /// The file length must be a whole number of pages.
    pub fn open(path: &Path, page_size: usize) -> Result<Self, StoreError> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;

        let len = file.metadata()?.len();
        let page_size_u64 = page_size as u64;
        if len % page_size_u64 != 0 {
            return Err(StoreError::Misaligned {
                len: usize::try_from(len).unwrap_or(usize::MAX),
                page_size,
            });
        }

        let page_count = len / page_size_u64;
        tracing::debug!("opened page file {} ({page_count} pages)", path.display());

        Ok(Self {
            file: Some(file),
            page_size,
            page_count,
        })
    }

    /// Open an existing store or create a new one if it doesn't exist.
    pub fn open_or_create(path: &Path, page_size: usize) -> Result<Self, StoreError> {
        if path.exists() {
            Self::open(path, page_size)
        } else {
            Self::create(path, page_size)
        }
    }

    fn file_mut(&mut self) -> Result<&mut File, StoreError> {
        self.file.as_mut().ok_or(StoreError::Closed)
    }

    fn pages_spanned(&self, len: usize) -> u64 {
        len.div_ceil(self.page_size) as u64
    }
}

impl PageStore for FilePageStore {
    fn page_size(&self) -> usize {
        self.page_size
    }

    fn page_count(&self) -> Result<u64, StoreError> {
        if self.file.is_none() {
            return Err(StoreError::Closed);
        }
        Ok(self.page_count)
    }

    fn read(&mut self, index: PageIndex, buf: &mut [u8]) -> Result<(), StoreError> {
        let page_count = self.page_count;
        if index + self.pages_spanned(buf.len()) > page_count {
            return Err(StoreError::PageOutOfBounds { index, page_count });
        }

        let offset = index * self.page_size as u64;
        let file = self.file_mut()?;
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(buf)?;
        Ok(())
    }

    fn write(&mut self, index: PageIndex, buf: &[u8]) -> Result<(), StoreError> {
        check_whole_pages(buf.len(), self.page_size)?;

        let offset = index * self.page_size as u64;
        let end = index + self.pages_spanned(buf.len());
        let file = self.file_mut()?;
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(buf)?;

        self.page_count = self.page_count.max(end);
        Ok(())
    }

    fn sync(&mut self) -> Result<(), StoreError> {
        self.file_mut()?.sync_all()?;
        Ok(())
    }

    fn close(&mut self) -> Result<(), StoreError> {
        let file = self.file.take().ok_or(StoreError::Closed)?;
        file.sync_all()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_create_write_read() {
        let dir = tempdir().expect("create temp dir");
        let path = dir.path().join("pages.db");
        let mut store = FilePageStore::create(&path, 128).expect("create");
        assert_eq!(store.page_count().expect("count"), 0);

        let page = [7u8; 128];
        store.write(2, &page).expect("write");
        assert_eq!(store.page_count().expect("count"), 3);

        let mut buf = [0u8; 128];
        store.read(2, &mut buf).expect("read");
        assert_eq!(buf, page);

        // The gap before page 2 reads back as zeros.
        store.read(0, &mut buf).expect("read gap");
        assert!(buf.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_create_fails_if_exists() {
        let dir = tempdir().expect("create temp dir");
        let path = dir.path().join("pages.db");
        let _store = FilePageStore::create(&path, 128).expect("create");
        assert!(matches!(
            FilePageStore::create(&path, 128),
            Err(StoreError::Io(_))
        ));
    }

    #[test]
    fn test_reopen_preserves_pages() {
        let dir = tempdir().expect("create temp dir");
        let path = dir.path().join("pages.db");
        {
            let mut store = FilePageStore::create(&path, 128).expect("create");
            store.write(0, &[1u8; 256]).expect("write two pages");
            store.close().expect("close");
        }

        let mut store = FilePageStore::open(&path, 128).expect("open");
        assert_eq!(store.page_count().expect("count"), 2);
        let mut buf = [0u8; 200];
        store.read(0, &mut buf).expect("read across pages");
        assert!(buf.iter().all(|&b| b == 1));
    }

    #[test]
    fn test_out_of_bounds_and_misaligned() {
        let dir = tempdir().expect("create temp dir");
        let path = dir.path().join("pages.db");
        let mut store = FilePageStore::create(&path, 128).expect("create");

        let mut buf = [0u8; 128];
        assert!(matches!(
            store.read(0, &mut buf),
            Err(StoreError::PageOutOfBounds {
                index: 0,
                page_count: 0
            })
        ));
        assert!(matches!(
            store.write(0, &[0u8; 100]),
            Err(StoreError::Misaligned { len: 100, .. })
        ));
    }

    #[test]
    fn test_closed_store_rejects_io() {
        let dir = tempdir().expect("create temp dir");
        let path = dir.path().join("pages.db");
        let mut store = FilePageStore::create(&path, 128).expect("create");
        store.close().expect("close");

        assert!(matches!(store.page_count(), Err(StoreError::Closed)));
        assert!(matches!(store.close(), Err(StoreError::Closed)));
    }
}

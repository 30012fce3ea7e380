//! Tagged page dispatch.

use crate::btree::data_page::DataPage;
use crate::btree::error::TreeError;
use crate::btree::index_page::IndexPage;
use crate::storage::{PageBuffer, PageIndex, PageTag};

/// A live tree page, decoded according to its tag byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Page {
    Index(IndexPage),
    Data(DataPage),
}

impl Page {
    /// Decode page `index` from its raw bytes.
    ///
    /// Terminated pages and unknown tags are integrity faults.
    pub fn decode(index: PageIndex, buffer: &PageBuffer) -> Result<Self, TreeError> {
        let corrupt = |e: crate::storage::PageError| TreeError::corrupt(index, e.to_string());
        match PageTag::try_from(buffer.tag_byte()) {
            Ok(PageTag::Index) => IndexPage::decode(index, buffer)
                .map(Self::Index)
                .map_err(corrupt),
            Ok(PageTag::Data) => DataPage::decode(index, buffer)
                .map(Self::Data)
                .map_err(corrupt),
            Ok(PageTag::Terminated) => Err(TreeError::TerminatedPage(index)),
            Err(tag) => Err(TreeError::BadPageTag { page: index, tag }),
        }
    }

    #[must_use]
    pub const fn index(&self) -> PageIndex {
        match self {
            Self::Index(page) => page.index,
            Self::Data(page) => page.index,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_dispatches_on_tag() {
        let buffer = DataPage::empty(3).encode(64).expect("encode");
        assert!(matches!(Page::decode(3, &buffer), Ok(Page::Data(_))));

        let buffer = IndexPage::new(0, 1).encode(64).expect("encode");
        let page = Page::decode(0, &buffer).expect("decode");
        assert_eq!(page.index(), 0);
        assert!(matches!(page, Page::Index(_)));
    }

    #[test]
    fn test_decode_rejects_terminated_and_unknown() {
        let buffer = PageBuffer::tagged(64, PageTag::Terminated);
        assert!(matches!(
            Page::decode(5, &buffer),
            Err(TreeError::TerminatedPage(5))
        ));

        let buffer = PageBuffer::new(64);
        assert!(matches!(
            Page::decode(6, &buffer),
            Err(TreeError::BadPageTag { page: 6, tag: 0 })
        ));
    }

    #[test]
    fn test_decode_reports_truncated_body_as_corrupt() {
        let mut buffer = PageBuffer::new(16);
        buffer.as_bytes_mut()[0] = b'D';
        buffer.as_bytes_mut()[12] = 5;
        assert!(matches!(
            Page::decode(2, &buffer),
            Err(TreeError::Corrupt { page: 2, .. })
        ));
    }
}

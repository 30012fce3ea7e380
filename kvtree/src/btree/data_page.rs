//! Leaf pages.
//!
//! Page layout:
//! - tag: 1 byte (`'D'`)
//! - previous leaf: 5 bytes (0 if none)
//! - next leaf: 5 bytes (0 if none)
//! - element count: 2 bytes
//! - elements: see [`DataElement`]
//!
//! Leaves form a doubly-linked chain in key order for range scans.

use std::ops::Range;

use crate::btree::element::{DataElement, IndexElement};
use crate::btree::error::TreeError;
use crate::btree::index_page::IndexPage;
use crate::btree::tree::TreeCore;
use crate::storage::{
    NO_PAGE, PAGE_INDEX_SIZE, PageBuffer, PageError, PageIndex, PageStore, PageTag,
};

/// A decoded leaf page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPage {
    pub index: PageIndex,
    pub prev: PageIndex,
    pub next: PageIndex,
    /// Elements in ascending key order.
    pub elements: Vec<DataElement>,
}

impl DataPage {
    /// Tag, two chain links and the element count.
    pub const HEADER_SIZE: usize = 1 + 2 * PAGE_INDEX_SIZE + 2;

    /// An unlinked leaf with no elements.
    #[must_use]
    pub const fn empty(index: PageIndex) -> Self {
        Self {
            index,
            prev: NO_PAGE,
            next: NO_PAGE,
            elements: Vec::new(),
        }
    }

    /// Bytes this page occupies when encoded.
    #[must_use]
    pub fn used_size(&self) -> usize {
        Self::HEADER_SIZE + self.elements.iter().map(DataElement::size).sum::<usize>()
    }

    /// Position of `key`, or the position it would be inserted at.
    pub fn search(&self, key: &[u8]) -> Result<usize, usize> {
        self.elements
            .binary_search_by(|element| element.key.as_slice().cmp(key))
    }

    /// The element stored under `key`.
    #[must_use]
    pub fn get(&self, key: &[u8]) -> Option<&DataElement> {
        self.search(key).ok().map(|pos| &self.elements[pos])
    }

    pub(crate) fn decode(index: PageIndex, buffer: &PageBuffer) -> Result<Self, PageError> {
        let mut reader = buffer.body();
        let prev = reader.read_page_index()?;
        let next = reader.read_page_index()?;
        let count = reader.read_u16()?;

        let mut elements = Vec::with_capacity(usize::from(count));
        for _ in 0..count {
            elements.push(DataElement::read(&mut reader)?);
        }

        Ok(Self {
            index,
            prev,
            next,
            elements,
        })
    }

    pub(crate) fn encode(&self, page_size: usize) -> Result<PageBuffer, PageError> {
        let count = u16::try_from(self.elements.len()).map_err(|_| PageError::Overflow {
            offset: Self::HEADER_SIZE,
            len: self.elements.len(),
        })?;

        let mut buffer = PageBuffer::new(page_size);
        let mut writer = buffer.writer(PageTag::Data);
        writer.write_page_index(self.prev)?;
        writer.write_page_index(self.next)?;
        writer.write_u16(count)?;
        for element in &self.elements {
            element.write(&mut writer)?;
        }
        Ok(buffer)
    }
}

/// Split an overfull run of elements into runs that each fit in a page.
///
/// Two elements become two singleton runs. Otherwise the first and last
/// elements seed the outer runs and elements move from the middle run into
/// whichever outer run is smaller while it stays within `max_size`. The
/// result is two or three non-empty runs covering `0..sizes.len()` in order.
pub fn partition(sizes: &[usize], max_size: usize) -> Vec<Range<usize>> {
    let n = sizes.len();
    if n <= 2 {
        return (0..n).map(|i| i..i + 1).collect();
    }

    let mut left_count = 1;
    let mut right_count = 1;
    let mut left_size = sizes[0];
    let mut right_size = sizes[n - 1];

    while left_count + right_count < n {
        let next_left = sizes[left_count];
        let next_right = sizes[n - right_count - 1];

        let mut move_left = left_size + next_left <= max_size;
        let mut move_right = right_size + next_right <= max_size;
        if move_left && move_right {
            if left_size > right_size {
                move_left = false;
            } else if left_size < right_size {
                move_right = false;
            }
        }
        if !move_left && !move_right {
            break;
        }

        if move_left {
            left_size += next_left;
            left_count += 1;
        }
        if move_right && left_count + right_count < n {
            right_size += next_right;
            right_count += 1;
        }
    }

    let middle = left_count..n - right_count;
    let mut runs = vec![0..left_count];
    if !middle.is_empty() {
        runs.push(middle);
    }
    runs.push(n - right_count..n);
    runs
}

impl<S: PageStore> TreeCore<S> {
    /// Insert `element` into `leaf`, splitting it if it overflows.
    ///
    /// `ancestors` is the descent path from the root to the leaf's parent;
    /// it is empty when the leaf is the root.
    pub(crate) fn insert_into_leaf(
        &mut self,
        mut leaf: DataPage,
        ancestors: &[IndexPage],
        element: DataElement,
    ) -> Result<(), TreeError> {
        let size = element.size();
        match leaf.search(&element.key) {
            Ok(pos) => leaf.elements[pos] = element,
            Err(pos) => leaf.elements.insert(pos, element),
        }

        if leaf.used_size() <= self.page_size() {
            return self.write_data_page(&leaf);
        }

        let sizes: Vec<usize> = leaf.elements.iter().map(DataElement::size).collect();
        let runs = partition(&sizes, self.max_element_size());
        tracing::debug!(
            "leaf {} overflowed inserting {size} bytes, splitting into {} pages",
            leaf.index,
            runs.len()
        );

        if ancestors.is_empty() {
            self.split_root_leaf(leaf, &runs)
        } else {
            self.split_leaf(leaf, &runs)
        }
    }

    /// The root leaf holds the whole tree: move its runs to new leaves and
    /// turn page 0 into an index over them.
    fn split_root_leaf(&mut self, leaf: DataPage, runs: &[Range<usize>]) -> Result<(), TreeError> {
        let mut elements = leaf.elements.into_iter();
        let mut pages = Vec::with_capacity(runs.len());
        for run in runs {
            let mut page = DataPage::empty(self.allocate_page()?);
            page.elements = elements.by_ref().take(run.len()).collect();
            pages.push(page);
        }
        link_chain(&mut pages, NO_PAGE, NO_PAGE);

        for page in &pages {
            self.write_data_page(page)?;
        }

        let mut root = IndexPage::new(leaf.index, pages[0].index);
        for page in &pages[1..] {
            root.separators
                .push(IndexElement::new(first_key(page)?, page.index));
        }
        self.write_index_page(&root)?;

        tracing::debug!("root leaf split, root is now an index page");
        Ok(())
    }

    /// Split a non-root leaf in place: the first run keeps the page index,
    /// the others go to new pages spliced into the chain after it.
    fn split_leaf(&mut self, leaf: DataPage, runs: &[Range<usize>]) -> Result<(), TreeError> {
        let old_next = leaf.next;
        let mut elements = leaf.elements.into_iter();
        let mut pages = Vec::with_capacity(runs.len());
        for (i, run) in runs.iter().enumerate() {
            let index = if i == 0 {
                leaf.index
            } else {
                self.allocate_page()?
            };
            let mut page = DataPage::empty(index);
            page.elements = elements.by_ref().take(run.len()).collect();
            pages.push(page);
        }
        link_chain(&mut pages, leaf.prev, old_next);

        for page in &pages {
            self.write_data_page(page)?;
        }

        if old_next != NO_PAGE {
            let mut next = self.load_data_page(old_next)?;
            next.prev = pages[pages.len() - 1].index;
            self.write_data_page(&next)?;
        }

        for page in &pages[1..] {
            let key = first_key(page)?;
            let mut path = self.find_parent_path(&key)?;
            let Some(mut parent) = path.pop() else {
                return Err(TreeError::corrupt(page.index, "split leaf has no parent"));
            };
            self.insert_separator(&mut parent, &mut path, IndexElement::new(key, page.index))?;
        }
        Ok(())
    }

    /// Remove `key` from `leaf`.
    ///
    /// An emptied leaf is written empty and unlinked from the chain; the
    /// caller is responsible for terminating it and detaching its separator.
    pub(crate) fn remove_from_leaf(
        &mut self,
        mut leaf: DataPage,
        key: &[u8],
    ) -> Result<Removal, TreeError> {
        let Ok(pos) = leaf.search(key) else {
            return Ok(Removal::NotFound);
        };
        leaf.elements.remove(pos);
        self.write_data_page(&leaf)?;

        if !leaf.elements.is_empty() {
            return Ok(Removal::Removed);
        }

        if leaf.prev != NO_PAGE {
            let mut prev = self.load_data_page(leaf.prev)?;
            prev.next = leaf.next;
            self.write_data_page(&prev)?;
        }
        if leaf.next != NO_PAGE {
            let mut next = self.load_data_page(leaf.next)?;
            next.prev = leaf.prev;
            self.write_data_page(&next)?;
        }

        Ok(Removal::LeafEmptied)
    }
}

/// Outcome of removing a key from a subtree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    /// The key was not present.
    NotFound,
    /// The key was removed; no structural change is pending.
    Removed,
    /// The key was removed and its leaf is now empty.
    LeafEmptied,
    /// Two index pages below were merged; the parent lost a separator.
    Merged,
}

impl Removal {
    /// Whether the key existed.
    #[must_use]
    pub const fn removed(self) -> bool {
        !matches!(self, Self::NotFound)
    }

    /// Whether the parent page must restructure in response.
    #[must_use]
    pub const fn needs_parent(self) -> bool {
        matches!(self, Self::LeafEmptied | Self::Merged)
    }
}

fn link_chain(pages: &mut [DataPage], prev: PageIndex, next: PageIndex) {
    let indices: Vec<PageIndex> = pages.iter().map(|page| page.index).collect();
    for (i, page) in pages.iter_mut().enumerate() {
        page.prev = if i == 0 { prev } else { indices[i - 1] };
        page.next = indices.get(i + 1).copied().unwrap_or(next);
    }
}

fn first_key(page: &DataPage) -> Result<Vec<u8>, TreeError> {
    page.elements
        .first()
        .map(|element| element.key.clone())
        .ok_or_else(|| TreeError::corrupt(page.index, "leaf produced by a split is empty"))
}

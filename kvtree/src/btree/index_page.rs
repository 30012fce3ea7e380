//! Internal routing pages.
//!
//! Page layout:
//! - tag: 1 byte (`'I'`)
//! - separator count: 2 bytes
//! - first child: 5 bytes
//! - separators: see [`IndexElement`]
//!
//! The first child owns every key below the first separator; the child of
//! separator `i` owns keys in `[key_i, key_{i+1})`.
//!
//! Parents are never stored on disk. Operations that may propagate upward
//! take the descent path (`ancestors`, root first, parent last) and mutate
//! those in-memory copies as they rewrite the corresponding pages.
//!
//! An insert rewrites only the index pages a split actually changes; the
//! untouched ancestors on the path are left as they are on disk.

use crate::btree::data_page::Removal;
use crate::btree::element::IndexElement;
use crate::btree::error::TreeError;
use crate::btree::page::Page;
use crate::btree::tree::TreeCore;
use crate::storage::{PAGE_INDEX_SIZE, PageBuffer, PageError, PageIndex, PageStore, PageTag, ROOT_PAGE};

/// Where a child hangs off its index page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildSlot {
    /// The first-child reference.
    First,
    /// The child of the separator at this position.
    Separator(usize),
}

/// A decoded index page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexPage {
    pub index: PageIndex,
    pub first_child: PageIndex,
    /// Separators in ascending key order.
    pub separators: Vec<IndexElement>,
}

impl IndexPage {
    /// Tag, separator count and first-child reference.
    pub const HEADER_SIZE: usize = 1 + 2 + PAGE_INDEX_SIZE;

    /// An index page with a single child and no separators.
    #[must_use]
    pub const fn new(index: PageIndex, first_child: PageIndex) -> Self {
        Self {
            index,
            first_child,
            separators: Vec::new(),
        }
    }

    #[must_use]
    pub const fn is_root(&self) -> bool {
        self.index == ROOT_PAGE
    }

    /// Bytes this page occupies when encoded.
    #[must_use]
    pub fn used_size(&self) -> usize {
        Self::HEADER_SIZE + self.separators.iter().map(IndexElement::size).sum::<usize>()
    }

    /// The child owning `key` and where it hangs.
    #[must_use]
    pub fn route(&self, key: &[u8]) -> (ChildSlot, PageIndex) {
        let pos = self
            .separators
            .partition_point(|separator| separator.key.as_slice() <= key);
        if pos == 0 {
            (ChildSlot::First, self.first_child)
        } else {
            (ChildSlot::Separator(pos - 1), self.separators[pos - 1].child)
        }
    }

    /// The child owning `key`.
    #[must_use]
    pub fn find_child(&self, key: &[u8]) -> PageIndex {
        self.route(key).1
    }

    /// Where `child` hangs off this page, if it does.
    #[must_use]
    pub fn slot_of(&self, child: PageIndex) -> Option<ChildSlot> {
        if self.first_child == child {
            return Some(ChildSlot::First);
        }
        self.separators
            .iter()
            .position(|separator| separator.child == child)
            .map(ChildSlot::Separator)
    }

    /// Position of the separator that moves up when this page splits.
    ///
    /// Picks the position that minimizes the larger of the two remaining
    /// halves, leaving at least one separator on each side.
    fn split_point(&self) -> Option<usize> {
        let count = self.separators.len();
        if count < 3 {
            return None;
        }
        let mut prefix = Vec::with_capacity(count + 1);
        let mut total = 0;
        prefix.push(total);
        for separator in &self.separators {
            total += separator.size();
            prefix.push(total);
        }

        (1..count - 1).min_by_key(|&middle| prefix[middle].max(total - prefix[middle + 1]))
    }

    pub(crate) fn decode(index: PageIndex, buffer: &PageBuffer) -> Result<Self, PageError> {
        let mut reader = buffer.body();
        let count = reader.read_u16()?;
        let first_child = reader.read_page_index()?;

        let mut separators = Vec::with_capacity(usize::from(count));
        for _ in 0..count {
            separators.push(IndexElement::read(&mut reader)?);
        }

        Ok(Self {
            index,
            first_child,
            separators,
        })
    }

    pub(crate) fn encode(&self, page_size: usize) -> Result<PageBuffer, PageError> {
        let count = u16::try_from(self.separators.len()).map_err(|_| PageError::Overflow {
            offset: 1,
            len: self.separators.len(),
        })?;

        let mut buffer = PageBuffer::new(page_size);
        let mut writer = buffer.writer(PageTag::Index);
        writer.write_u16(count)?;
        writer.write_page_index(self.first_child)?;
        for separator in &self.separators {
            separator.write(&mut writer)?;
        }
        Ok(buffer)
    }
}

/// Which sibling an underfull index page rebalances against.
#[derive(Debug, Clone, Copy)]
enum Neighbor {
    /// The left sibling; the page itself is the parent's separator `slot`.
    Left { slot: usize },
    /// The right sibling; the page is the parent's first child.
    Right,
}

impl<S: PageStore> TreeCore<S> {
    /// Insert a separator into `page`, splitting upward as needed.
    ///
    /// Returns whether `page` split.
    pub(crate) fn insert_separator(
        &mut self,
        page: &mut IndexPage,
        ancestors: &mut [IndexPage],
        element: IndexElement,
    ) -> Result<bool, TreeError> {
        let pos = page
            .separators
            .partition_point(|separator| separator.key <= element.key);
        page.separators.insert(pos, element);
        self.store_index_page(page, ancestors)
    }

    /// Write `page`, splitting it first if it no longer fits.
    ///
    /// The root splits into two new children and keeps its index. Any other
    /// page keeps its left half and pushes the middle separator to its parent.
    fn store_index_page(
        &mut self,
        page: &mut IndexPage,
        ancestors: &mut [IndexPage],
    ) -> Result<bool, TreeError> {
        if page.used_size() <= self.page_size() {
            self.write_index_page(page)?;
            return Ok(false);
        }

        let middle = page.split_point().ok_or_else(|| {
            TreeError::corrupt(page.index, "index page overflows with fewer than three separators")
        })?;
        let right_separators = page.separators.split_off(middle + 1);
        let pivot = page
            .separators
            .pop()
            .ok_or_else(|| TreeError::corrupt(page.index, "split point out of range"))?;
        let right_size = IndexPage::HEADER_SIZE
            + right_separators.iter().map(IndexElement::size).sum::<usize>();
        if page.used_size() > self.page_size() || right_size > self.page_size() {
            return Err(TreeError::corrupt(
                page.index,
                format!(
                    "split halves of {} and {right_size} bytes exceed the page size",
                    page.used_size()
                ),
            ));
        }

        if page.is_root() {
            let left = IndexPage {
                index: self.allocate_page()?,
                first_child: page.first_child,
                separators: std::mem::take(&mut page.separators),
            };
            let right = IndexPage {
                index: self.allocate_page()?,
                first_child: pivot.child,
                separators: right_separators,
            };
            self.write_index_page(&left)?;
            self.write_index_page(&right)?;

            page.first_child = left.index;
            page.separators.push(IndexElement::new(pivot.key, right.index));
            self.write_index_page(page)?;

            tracing::debug!("root index split into pages {} and {}", left.index, right.index);
            return Ok(true);
        }

        let right = IndexPage {
            index: self.allocate_page()?,
            first_child: pivot.child,
            separators: right_separators,
        };
        self.write_index_page(&right)?;
        self.write_index_page(page)?;
        tracing::debug!("index page {} split, new sibling {}", page.index, right.index);

        let Some((parent, upper)) = ancestors.split_last_mut() else {
            return Err(TreeError::corrupt(page.index, "non-root index page has no parent"));
        };
        self.insert_separator(parent, upper, IndexElement::new(pivot.key, right.index))?;
        Ok(true)
    }

    /// React to a structural change reported by the child at `slot`.
    pub(crate) fn restructure(
        &mut self,
        page: &mut IndexPage,
        ancestors: &mut [IndexPage],
        slot: ChildSlot,
        state: Removal,
    ) -> Result<Removal, TreeError> {
        if state == Removal::LeafEmptied {
            if page.is_root() && page.separators.is_empty() {
                // The root may wrap a single, now empty, leaf.
                return Ok(Removal::Removed);
            }
            self.detach_child(page, slot)?;
        }

        if page.used_size() > self.page_size() / 2
            || (page.is_root() && !page.separators.is_empty())
        {
            return Ok(Removal::Removed);
        }

        if page.is_root() {
            self.collapse_root(page)?;
            return Ok(Removal::Removed);
        }

        self.rebalance(page, ancestors)
    }

    /// Terminate the emptied child at `slot` and drop its reference.
    fn detach_child(&mut self, page: &mut IndexPage, slot: ChildSlot) -> Result<(), TreeError> {
        let child = match slot {
            ChildSlot::First => {
                if page.separators.is_empty() {
                    return Err(TreeError::corrupt(
                        page.index,
                        "cannot detach the only child of an index page",
                    ));
                }
                let child = page.first_child;
                page.first_child = page.separators.remove(0).child;
                child
            }
            ChildSlot::Separator(i) if i < page.separators.len() => page.separators.remove(i).child,
            ChildSlot::Separator(i) => {
                return Err(TreeError::corrupt(page.index, format!("no separator at {i}")));
            }
        };

        self.terminate(child)?;
        self.write_index_page(page)
    }

    /// Pull the grandchildren of a single-child root up into the root.
    fn collapse_root(&mut self, root: &mut IndexPage) -> Result<(), TreeError> {
        if let Page::Index(child) = self.load_page(root.first_child)? {
            root.first_child = child.first_child;
            root.separators = child.separators;
            self.terminate(child.index)?;
            self.write_index_page(root)?;
            tracing::debug!("root collapsed, absorbed page {}", child.index);
        }
        Ok(())
    }

    /// Fix an underfull non-root page by borrowing from or merging with a sibling.
    fn rebalance(
        &mut self,
        page: &mut IndexPage,
        ancestors: &mut [IndexPage],
    ) -> Result<Removal, TreeError> {
        let Some(parent) = ancestors.last() else {
            return Err(TreeError::corrupt(page.index, "non-root index page has no parent"));
        };

        let (neighbor_index, side) = match parent.slot_of(page.index) {
            Some(ChildSlot::First) => match parent.separators.first() {
                Some(separator) => (separator.child, Neighbor::Right),
                None => return Ok(Removal::Removed),
            },
            Some(ChildSlot::Separator(0)) => (parent.first_child, Neighbor::Left { slot: 0 }),
            Some(ChildSlot::Separator(i)) => {
                (parent.separators[i - 1].child, Neighbor::Left { slot: i })
            }
            None => {
                // A split higher up moved this page under a new parent.
                tracing::debug!("page {} no longer under page {}, not rebalancing", page.index, parent.index);
                return Ok(Removal::Removed);
            }
        };

        let mut neighbor = self.load_index_page(neighbor_index)?;

        if neighbor.separators.len() > 1 && neighbor.used_size() > self.page_size() / 2 {
            let shifted = match side {
                Neighbor::Left { .. } => self.shift_from_left(page, &mut neighbor, ancestors)?,
                Neighbor::Right => self.shift_from_right(page, &mut neighbor, ancestors)?,
            };
            if shifted {
                return Ok(Removal::Removed);
            }
        }

        match side {
            Neighbor::Left { slot } => self.merge_into_left(page, neighbor, ancestors, slot)?,
            Neighbor::Right => self.merge_from_right(page, neighbor, ancestors)?,
        }
        Ok(Removal::Merged)
    }

    /// Move the tail of the left sibling's separators into `page`.
    fn shift_from_left(
        &mut self,
        page: &mut IndexPage,
        neighbor: &mut IndexPage,
        ancestors: &mut [IndexPage],
    ) -> Result<bool, TreeError> {
        let boundary = IndexElement::new(self.find_smallest_key(page.first_child)?, page.first_child);
        let page_size = self.page_size();

        let mut left_size = neighbor.used_size();
        let mut right_size = page.used_size() + boundary.size();
        let mut best = None;
        let mut best_diff = usize::MAX;
        for i in (1..neighbor.separators.len()).rev() {
            let size = neighbor.separators[i].size();
            left_size -= size;
            right_size += size;
            let diff = left_size.abs_diff(right_size);
            if diff < best_diff && left_size <= page_size && right_size <= page_size {
                best_diff = diff;
                best = Some(i);
            }
        }
        let Some(middle) = best else {
            return Ok(false);
        };

        let mut moved = neighbor.separators.split_off(middle).into_iter();
        let Some(pivot) = moved.next() else {
            return Err(TreeError::corrupt(neighbor.index, "empty separator run"));
        };
        let count = moved.len() + 1;
        let existing = std::mem::take(&mut page.separators);
        page.first_child = pivot.child;
        page.separators = moved.chain(std::iter::once(boundary)).chain(existing).collect();

        self.write_index_page(page)?;
        self.write_index_page(neighbor)?;
        self.reseat_separator(page, ancestors)?;

        tracing::debug!("moved {count} children from page {} to {}", neighbor.index, page.index);
        Ok(true)
    }

    /// Move the head of the right sibling's separators into `page`.
    fn shift_from_right(
        &mut self,
        page: &mut IndexPage,
        neighbor: &mut IndexPage,
        ancestors: &mut [IndexPage],
    ) -> Result<bool, TreeError> {
        let boundary = IndexElement::new(
            self.find_smallest_key(neighbor.first_child)?,
            neighbor.first_child,
        );
        let page_size = self.page_size();

        let mut left_size = page.used_size() + boundary.size();
        let mut right_size = neighbor.used_size();
        let mut best = None;
        let mut best_diff = usize::MAX;
        for i in 0..neighbor.separators.len() - 1 {
            let size = neighbor.separators[i].size();
            left_size += size;
            right_size -= size;
            let diff = left_size.abs_diff(right_size);
            if diff < best_diff && left_size <= page_size && right_size <= page_size {
                best_diff = diff;
                best = Some(i);
            }
        }
        let Some(middle) = best else {
            return Ok(false);
        };

        let rest = neighbor.separators.split_off(middle + 1);
        let mut moved = std::mem::replace(&mut neighbor.separators, rest);
        let Some(pivot) = moved.pop() else {
            return Err(TreeError::corrupt(neighbor.index, "empty separator run"));
        };
        let count = moved.len() + 1;
        neighbor.first_child = pivot.child;
        page.separators.push(boundary);
        page.separators.append(&mut moved);

        self.write_index_page(neighbor)?;
        self.write_index_page(page)?;
        self.reseat_separator(neighbor, ancestors)?;

        tracing::debug!("moved {count} children from page {} to {}", neighbor.index, page.index);
        Ok(true)
    }

    /// Replace the parent's separator for `child` with the child's current smallest key.
    fn reseat_separator(
        &mut self,
        child: &IndexPage,
        ancestors: &mut [IndexPage],
    ) -> Result<(), TreeError> {
        let key = self.find_smallest_key(child.first_child)?;
        let Some((parent, upper)) = ancestors.split_last_mut() else {
            return Err(TreeError::corrupt(child.index, "non-root index page has no parent"));
        };
        let Some(ChildSlot::Separator(i)) = parent.slot_of(child.index) else {
            return Err(TreeError::corrupt(
                parent.index,
                format!("no separator references page {}", child.index),
            ));
        };
        parent.separators.remove(i);
        self.insert_separator(parent, upper, IndexElement::new(key, child.index))?;
        Ok(())
    }

    /// Fold `page` into its left sibling and terminate it.
    fn merge_into_left(
        &mut self,
        page: &mut IndexPage,
        mut neighbor: IndexPage,
        ancestors: &mut [IndexPage],
        slot: usize,
    ) -> Result<(), TreeError> {
        self.drop_parent_separator(ancestors, slot)?;

        let key = self.find_smallest_key(page.first_child)?;
        neighbor
            .separators
            .push(IndexElement::new(key, page.first_child));
        neighbor.separators.append(&mut page.separators);
        self.store_index_page(&mut neighbor, ancestors)?;

        self.terminate(page.index)?;
        tracing::debug!("merged index page {} into {}", page.index, neighbor.index);
        Ok(())
    }

    /// Fold the right sibling into `page` and terminate the sibling.
    fn merge_from_right(
        &mut self,
        page: &mut IndexPage,
        mut neighbor: IndexPage,
        ancestors: &mut [IndexPage],
    ) -> Result<(), TreeError> {
        self.drop_parent_separator(ancestors, 0)?;

        let key = self.find_smallest_key(neighbor.first_child)?;
        page.separators
            .push(IndexElement::new(key, neighbor.first_child));
        page.separators.append(&mut neighbor.separators);
        self.store_index_page(page, ancestors)?;

        self.terminate(neighbor.index)?;
        tracing::debug!("merged index page {} into {}", neighbor.index, page.index);
        Ok(())
    }

    fn drop_parent_separator(
        &mut self,
        ancestors: &mut [IndexPage],
        slot: usize,
    ) -> Result<(), TreeError> {
        let Some(parent) = ancestors.last_mut() else {
            return Err(TreeError::corrupt(ROOT_PAGE, "merge without a parent page"));
        };
        if slot >= parent.separators.len() {
            return Err(TreeError::corrupt(parent.index, format!("no separator at {slot}")));
        }
        parent.separators.remove(slot);
        self.write_index_page(parent)
    }

    /// The smallest key stored under page `start`.
    pub(crate) fn find_smallest_key(&mut self, start: PageIndex) -> Result<Vec<u8>, TreeError> {
        let mut index = start;
        loop {
            match self.load_page(index)? {
                Page::Index(page) => index = page.first_child,
                Page::Data(leaf) => {
                    let page = leaf.index;
                    return leaf
                        .elements
                        .into_iter()
                        .next()
                        .map(|element| element.key)
                        .ok_or_else(|| TreeError::corrupt(page, "leftmost leaf of a subtree is empty"));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page_with(keys: &[&str]) -> IndexPage {
        IndexPage {
            index: 1,
            first_child: 10,
            separators: keys
                .iter()
                .zip(11..)
                .map(|(key, child)| IndexElement::new(key.as_bytes().to_vec(), child))
                .collect(),
        }
    }

    #[test]
    fn test_layout_round_trip() {
        let page = page_with(&["m"]);
        assert_eq!(page.used_size(), 8 + 7);

        let buffer = page.encode(32).expect("encode");
        assert_eq!(
            &buffer.as_bytes()[..15],
            &[b'I', 0, 1, 0, 0, 0, 0, 10, 0, b'm', 0, 0, 0, 0, 11]
        );
        assert_eq!(IndexPage::decode(1, &buffer).expect("decode"), page);
    }

    #[test]
    fn test_route() {
        let page = page_with(&["d", "h"]);
        assert_eq!(page.route(b"a"), (ChildSlot::First, 10));
        assert_eq!(page.route(b"d"), (ChildSlot::Separator(0), 11));
        assert_eq!(page.route(b"g"), (ChildSlot::Separator(0), 11));
        assert_eq!(page.route(b"h"), (ChildSlot::Separator(1), 12));
        assert_eq!(page.route(b"zz"), (ChildSlot::Separator(1), 12));
        assert_eq!(IndexPage::new(0, 5).find_child(b"x"), 5);
    }

    #[test]
    fn test_slot_of() {
        let page = page_with(&["d", "h"]);
        assert_eq!(page.slot_of(10), Some(ChildSlot::First));
        assert_eq!(page.slot_of(12), Some(ChildSlot::Separator(1)));
        assert_eq!(page.slot_of(99), None);
    }

    #[test]
    fn test_split_point_keeps_both_sides_non_empty() {
        let page = page_with(&["a", "b", "c", "d", "e", "f"]);
        let middle = page.split_point().expect("splittable");
        assert_eq!(middle, 2);

        let page = page_with(&["a", "b", "c"]);
        assert_eq!(page.split_point(), Some(1));

        assert_eq!(page_with(&["a", "b"]).split_point(), None);
    }

    /// Both halves left after moving the separator at `middle` up.
    fn split_at(page: &IndexPage, middle: usize) -> (IndexPage, IndexPage) {
        let left = IndexPage {
            index: page.index,
            first_child: page.first_child,
            separators: page.separators[..middle].to_vec(),
        };
        let right = IndexPage {
            index: 2,
            first_child: page.separators[middle].child,
            separators: page.separators[middle + 1..].to_vec(),
        };
        (left, right)
    }

    fn page_with_key_lengths(lengths: &[usize]) -> IndexPage {
        IndexPage {
            index: 1,
            first_child: 10,
            separators: lengths
                .iter()
                .zip(0u8..)
                .map(|(&len, i)| IndexElement::new(vec![b'a' + i; len], 11 + u64::from(i)))
                .collect(),
        }
    }

    #[test]
    fn test_split_halves_fit_with_long_separators() {
        let page = page_with_key_lengths(&[24, 44, 53, 4, 24]);
        assert!(page.used_size() > 128);

        let middle = page.split_point().expect("splittable");
        assert_eq!(middle, 2);
        let (left, right) = split_at(&page, middle);
        assert!(left.used_size() <= 128, "left half is {} bytes", left.used_size());
        assert!(right.used_size() <= 128, "right half is {} bytes", right.used_size());
        left.encode(128).expect("left half encodes");
        right.encode(128).expect("right half encodes");
    }

    #[test]
    fn test_split_halves_fit_after_any_overflowing_insert() {
        use rand::rngs::StdRng;
        use rand::{Rng, SeedableRng};

        let page_size = 128;
        let longest = crate::config::max_key_length(page_size) - 1;
        for seed in 0..500 {
            let mut rng = StdRng::seed_from_u64(seed);
            let mut lengths = Vec::new();
            let mut page = page_with_key_lengths(&lengths);
            while page.used_size() <= page_size {
                lengths.push(rng.random_range(1..=longest));
                page = page_with_key_lengths(&lengths);
            }

            let middle = page.split_point().expect("splittable");
            let (left, right) = split_at(&page, middle);
            assert!(!left.separators.is_empty() && !right.separators.is_empty(), "seed {seed}");
            assert!(left.used_size() <= page_size, "seed {seed}: left {lengths:?}");
            assert!(right.used_size() <= page_size, "seed {seed}: right {lengths:?}");
        }
    }
}

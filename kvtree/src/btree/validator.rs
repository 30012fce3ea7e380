//! Full structural audit of a tree.
//!
//! The audit runs in three passes:
//!
//! 1. A walk from the root marks every reachable page as used and every
//!    child reference as referenced, rejecting pages seen twice, non-root
//!    index pages without separators and repeated separator keys.
//! 2. A scan over every allocated page compares its tag with the marks from
//!    the walk: live pages must be reachable and referenced, terminated pages
//!    must be neither.
//! 3. An in-order walk checks key order across leaves and separators and
//!    verifies that the leaf links form a single chain.
//!
//! Storage failures abort the audit with an error; everything else is
//! reported as the first [`Violation`] found.

use std::collections::HashSet;

use crate::btree::error::TreeError;
use crate::btree::page::Page;
use crate::btree::tree::TreeCore;
use crate::storage::{NO_PAGE, PageIndex, PageStore, ROOT_PAGE};

/// The first structural problem found by an integrity check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    /// A page was reached twice while walking down from the root.
    PageVisitedTwice(PageIndex),
    /// Two child references point at the same page.
    PageReferencedTwice(PageIndex),
    /// A non-root index page has a single child.
    IndexPageWithoutSeparators(PageIndex),
    /// The same separator key appears twice in the tree.
    DuplicateIndexKey { page: PageIndex, key: Vec<u8> },
    /// A terminated page is reachable from the root.
    TerminatedPageReachable(PageIndex),
    /// A live page is not reachable from the root.
    LivePageUnreachable(PageIndex),
    /// A live page is not referenced by any index page.
    LivePageUnreferenced(PageIndex),
    /// A terminated page is still referenced by an index page.
    TerminatedPageReferenced(PageIndex),
    /// A page could not be decoded.
    CorruptPage { page: PageIndex, reason: String },
    /// A leaf key is out of order with its predecessor.
    DataOrder {
        page: PageIndex,
        key: Vec<u8>,
        previous: Vec<u8>,
    },
    /// A separator key is not greater than every key to its left.
    IndexOrder {
        page: PageIndex,
        key: Vec<u8>,
        previous: Vec<u8>,
    },
    /// Two leaves carry the same previous or next link.
    LinkReferencedTwice { page: PageIndex, link: PageIndex },
    /// A leaf's links disagree with the in-order leaf sequence.
    LinkMismatch { page: PageIndex, link: PageIndex },
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PageVisitedTwice(page) => write!(f, "page {page} visited twice"),
            Self::PageReferencedTwice(page) => write!(f, "page {page} referenced twice"),
            Self::IndexPageWithoutSeparators(page) => {
                write!(f, "index page {page} has only one child")
            }
            Self::DuplicateIndexKey { page, key } => {
                write!(f, "index page {page} repeats key {}", hex(key))
            }
            Self::TerminatedPageReachable(page) => {
                write!(f, "terminated page {page} is reachable")
            }
            Self::LivePageUnreachable(page) => write!(f, "page {page} is never used"),
            Self::LivePageUnreferenced(page) => write!(f, "page {page} is never referenced"),
            Self::TerminatedPageReferenced(page) => {
                write!(f, "terminated page {page} is referenced")
            }
            Self::CorruptPage { page, reason } => write!(f, "page {page} is corrupt: {reason}"),
            Self::DataOrder {
                page,
                key,
                previous,
            } => write!(
                f,
                "data page {page} out of order: key {} after {}",
                hex(key),
                hex(previous)
            ),
            Self::IndexOrder {
                page,
                key,
                previous,
            } => write!(
                f,
                "index page {page} out of order: key {} after {}",
                hex(key),
                hex(previous)
            ),
            Self::LinkReferencedTwice { page, link } => {
                write!(f, "data page {page} links to {link}, already linked")
            }
            Self::LinkMismatch { page, link } => {
                write!(f, "data page {page} has inconsistent link {link}")
            }
        }
    }
}

fn hex(bytes: &[u8]) -> String {
    use std::fmt::Write;
    bytes.iter().fold(String::new(), |mut out, b| {
        let _ = write!(out, "{b:02x}");
        out
    })
}

/// Pages and keys seen by the walk from the root.
#[derive(Default)]
struct Marks {
    used: HashSet<PageIndex>,
    referenced: HashSet<PageIndex>,
    keys: HashSet<Vec<u8>>,
}

enum Step {
    Visit(PageIndex),
    /// Check a separator key against everything to its left, then visit its child.
    Separator {
        page: PageIndex,
        key: Vec<u8>,
        child: PageIndex,
    },
}

/// Audit state for one integrity check.
pub struct Validator<'a, S> {
    core: &'a mut TreeCore<S>,
}

impl<'a, S: PageStore> Validator<'a, S> {
    pub(crate) const fn new(core: &'a mut TreeCore<S>) -> Self {
        Self { core }
    }

    pub(crate) fn run(mut self) -> Result<Option<Violation>, TreeError> {
        let mut marks = Marks::default();
        if let Some(violation) = self.walk(ROOT_PAGE, &mut marks)? {
            return Ok(Some(violation));
        }
        if let Some(violation) = self.scan(&marks)? {
            return Ok(Some(violation));
        }
        self.check_order()
    }

    /// Load a page, turning decode faults into violations.
    fn load(&mut self, index: PageIndex) -> Result<Result<Page, Violation>, TreeError> {
        match self.core.load_page(index) {
            Ok(page) => Ok(Ok(page)),
            Err(TreeError::TerminatedPage(page)) => Ok(Err(Violation::TerminatedPageReachable(page))),
            Err(TreeError::BadPageTag { page, tag }) => Ok(Err(Violation::CorruptPage {
                page,
                reason: format!("bad tag 0x{tag:02x}"),
            })),
            Err(TreeError::Corrupt { page, reason }) => {
                Ok(Err(Violation::CorruptPage { page, reason }))
            }
            Err(e) => Err(e),
        }
    }

    /// Pass 1: reachability, duplicate references and separator keys.
    fn walk(
        &mut self,
        root: PageIndex,
        marks: &mut Marks,
    ) -> Result<Option<Violation>, TreeError> {
        let mut stack = vec![root];
        while let Some(index) = stack.pop() {
            let page = match self.load(index)? {
                Ok(page) => page,
                Err(violation) => return Ok(Some(violation)),
            };
            if !marks.used.insert(index) {
                return Ok(Some(Violation::PageVisitedTwice(index)));
            }

            let Page::Index(page) = page else {
                continue;
            };
            if !page.is_root() && page.separators.is_empty() {
                return Ok(Some(Violation::IndexPageWithoutSeparators(index)));
            }

            if !marks.referenced.insert(page.first_child) {
                return Ok(Some(Violation::PageReferencedTwice(page.first_child)));
            }
            for separator in &page.separators {
                if !marks.referenced.insert(separator.child) {
                    return Ok(Some(Violation::PageReferencedTwice(separator.child)));
                }
                if !marks.keys.insert(separator.key.clone()) {
                    return Ok(Some(Violation::DuplicateIndexKey {
                        page: index,
                        key: separator.key.clone(),
                    }));
                }
            }

            // Children pushed in reverse so they are visited left to right.
            stack.extend(page.separators.iter().rev().map(|separator| separator.child));
            stack.push(page.first_child);
        }
        Ok(None)
    }

    /// Pass 2: every allocated page is either live and reachable, or terminated and forgotten.
    fn scan(&mut self, marks: &Marks) -> Result<Option<Violation>, TreeError> {
        let end = marks.used.iter().max().map_or(0, |&max| max + 1);
        for index in 0..end {
            let terminated = match self.core.load_page(index) {
                Ok(_) => false,
                Err(TreeError::TerminatedPage(_)) => true,
                Err(TreeError::BadPageTag { page, tag }) => {
                    return Ok(Some(Violation::CorruptPage {
                        page,
                        reason: format!("bad tag 0x{tag:02x}"),
                    }));
                }
                Err(TreeError::Corrupt { page, reason }) => {
                    return Ok(Some(Violation::CorruptPage { page, reason }));
                }
                Err(e) => return Err(e),
            };

            let used = marks.used.contains(&index);
            let referenced = marks.referenced.contains(&index);
            let violation = match (terminated, used, referenced) {
                (true, true, _) => Some(Violation::TerminatedPageReachable(index)),
                (false, false, _) => Some(Violation::LivePageUnreachable(index)),
                (false, true, false) if index != ROOT_PAGE => {
                    Some(Violation::LivePageUnreferenced(index))
                }
                (true, false, true) => Some(Violation::TerminatedPageReferenced(index)),
                _ => None,
            };
            if violation.is_some() {
                return Ok(violation);
            }
        }
        Ok(None)
    }

    /// Pass 3: key order and leaf links, visiting leaves left to right.
    fn check_order(&mut self) -> Result<Option<Violation>, TreeError> {
        let mut stack = vec![Step::Visit(ROOT_PAGE)];
        // Last key seen, or the separator key that led into the current subtree.
        let mut last: Vec<u8> = Vec::new();
        let mut prev_links = HashSet::new();
        let mut next_links = HashSet::new();
        // Index and next link of the previous leaf in key order.
        let mut previous_leaf: Option<(PageIndex, PageIndex)> = None;

        while let Some(step) = stack.pop() {
            let index = match step {
                Step::Separator { page, key, child } => {
                    if key <= last {
                        return Ok(Some(Violation::IndexOrder {
                            page,
                            key,
                            previous: last,
                        }));
                    }
                    last = key;
                    child
                }
                Step::Visit(index) => index,
            };

            let leaf = match self.load(index)? {
                Ok(Page::Index(page)) => {
                    for separator in page.separators.into_iter().rev() {
                        stack.push(Step::Separator {
                            page: index,
                            key: separator.key,
                            child: separator.child,
                        });
                    }
                    stack.push(Step::Visit(page.first_child));
                    continue;
                }
                Ok(Page::Data(leaf)) => leaf,
                Err(violation) => return Ok(Some(violation)),
            };

            if leaf.prev != NO_PAGE && !prev_links.insert(leaf.prev) {
                return Ok(Some(Violation::LinkReferencedTwice {
                    page: index,
                    link: leaf.prev,
                }));
            }
            if leaf.next != NO_PAGE && !next_links.insert(leaf.next) {
                return Ok(Some(Violation::LinkReferencedTwice {
                    page: index,
                    link: leaf.next,
                }));
            }

            let (expected_prev, violation) = match previous_leaf {
                Some((page, next)) if next != index => (page, Some((page, next))),
                Some((page, _)) => (page, None),
                None => (NO_PAGE, None),
            };
            if let Some((page, link)) = violation {
                return Ok(Some(Violation::LinkMismatch { page, link }));
            }
            if leaf.prev != expected_prev {
                return Ok(Some(Violation::LinkMismatch {
                    page: index,
                    link: leaf.prev,
                }));
            }

            for (i, element) in leaf.elements.iter().enumerate() {
                let out_of_order = if i == 0 {
                    element.key < last
                } else {
                    element.key <= last
                };
                if out_of_order {
                    return Ok(Some(Violation::DataOrder {
                        page: index,
                        key: element.key.clone(),
                        previous: last,
                    }));
                }
                last.clone_from(&element.key);
            }

            previous_leaf = Some((index, leaf.next));
        }

        if let Some((page, next)) = previous_leaf
            && next != NO_PAGE
        {
            return Ok(Some(Violation::LinkMismatch { page, link: next }));
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::btree::data_page::DataPage;
    use crate::btree::element::{DataElement, IndexElement};
    use crate::btree::error::FaultKind;
    use crate::btree::index_page::IndexPage;
    use crate::btree::tree::BTree;
    use crate::config::TreeConfig;
    use crate::storage::{FaultConfig, MemoryPageStore, PageBuffer, PageTag};

    const PAGE_SIZE: usize = 128;

    fn leaf(index: PageIndex, prev: PageIndex, next: PageIndex, keys: &[&str]) -> PageBuffer {
        let page = DataPage {
            index,
            prev,
            next,
            elements: keys
                .iter()
                .map(|key| DataElement::new(key.as_bytes().to_vec(), b"v".to_vec()))
                .collect(),
        };
        page.encode(PAGE_SIZE).expect("encode leaf")
    }

    fn index(index: PageIndex, first_child: PageIndex, separators: &[(&str, PageIndex)]) -> PageBuffer {
        let mut page = IndexPage::new(index, first_child);
        page.separators = separators
            .iter()
            .map(|(key, child)| IndexElement::new(key.as_bytes().to_vec(), *child))
            .collect();
        page.encode(PAGE_SIZE).expect("encode index")
    }

    fn audit(pages: Vec<PageBuffer>) -> Option<Violation> {
        let mut store = MemoryPageStore::new(PAGE_SIZE);
        for (i, page) in pages.iter().enumerate() {
            store.write(i as PageIndex, page.as_bytes()).expect("write page");
        }
        let tree = BTree::open(store, &TreeConfig::default()).expect("open tree");
        tree.integrity_report().expect("audit")
    }

    fn two_leaves() -> Vec<PageBuffer> {
        vec![
            index(0, 1, &[("m", 2)]),
            leaf(1, 0, 2, &["a", "b"]),
            leaf(2, 1, 0, &["m", "z"]),
        ]
    }

    #[test]
    fn test_well_formed_tree_passes() {
        assert_eq!(audit(two_leaves()), None);
    }

    #[test]
    fn test_empty_root_leaf_passes() {
        assert_eq!(audit(vec![leaf(0, 0, 0, &[])]), None);
    }

    #[test]
    fn test_key_below_separator() {
        let mut pages = two_leaves();
        pages[2] = leaf(2, 1, 0, &["c", "z"]);
        assert!(matches!(
            audit(pages),
            Some(Violation::DataOrder { page: 2, .. })
        ));
    }

    #[test]
    fn test_unsorted_leaf() {
        let mut pages = two_leaves();
        pages[1] = leaf(1, 0, 2, &["b", "a"]);
        assert!(matches!(
            audit(pages),
            Some(Violation::DataOrder { page: 1, .. })
        ));
    }

    #[test]
    fn test_separator_not_above_left_subtree() {
        let pages = vec![
            index(0, 1, &[("b", 2)]),
            leaf(1, 0, 2, &["a", "c"]),
            leaf(2, 1, 0, &["d"]),
        ];
        assert!(matches!(
            audit(pages),
            Some(Violation::IndexOrder { page: 0, .. })
        ));
    }

    #[test]
    fn test_last_leaf_must_end_chain() {
        let mut pages = two_leaves();
        pages[2] = leaf(2, 1, 1, &["m", "z"]);
        assert_eq!(
            audit(pages),
            Some(Violation::LinkMismatch { page: 2, link: 1 })
        );
    }

    #[test]
    fn test_broken_prev_link() {
        let mut pages = two_leaves();
        pages[2] = leaf(2, 0, 0, &["m", "z"]);
        assert_eq!(
            audit(pages),
            Some(Violation::LinkMismatch { page: 2, link: 0 })
        );
    }

    #[test]
    fn test_index_page_without_separators() {
        let pages = vec![
            index(0, 1, &[("m", 2)]),
            index(1, 3, &[]),
            leaf(2, 3, 0, &["m"]),
            leaf(3, 0, 2, &["a"]),
        ];
        assert_eq!(
            audit(pages),
            Some(Violation::IndexPageWithoutSeparators(1))
        );
    }

    #[test]
    fn test_unreferenced_terminated_page_passes() {
        let pages = vec![
            index(0, 1, &[("m", 3)]),
            leaf(1, 0, 3, &["a"]),
            PageBuffer::tagged(PAGE_SIZE, PageTag::Terminated),
            leaf(3, 1, 0, &["m"]),
        ];
        assert_eq!(audit(pages), None);
    }

    #[test]
    fn test_live_page_outside_tree() {
        let pages = vec![
            index(0, 1, &[("m", 2), ("x", 4)]),
            leaf(1, 0, 2, &["a", "b"]),
            leaf(2, 1, 4, &["m"]),
            leaf(3, 0, 0, &["q"]),
            leaf(4, 2, 0, &["x"]),
        ];
        assert_eq!(audit(pages), Some(Violation::LivePageUnreachable(3)));
    }

    #[test]
    fn test_reachable_terminated_page() {
        let mut pages = two_leaves();
        pages[2] = PageBuffer::tagged(PAGE_SIZE, PageTag::Terminated);
        assert_eq!(audit(pages), Some(Violation::TerminatedPageReachable(2)));
    }

    #[test]
    fn test_child_referenced_twice() {
        let mut pages = two_leaves();
        pages[0] = index(0, 1, &[("m", 1)]);
        assert_eq!(audit(pages), Some(Violation::PageReferencedTwice(1)));
    }

    #[test]
    fn test_duplicate_separator_key() {
        let pages = vec![
            index(0, 1, &[("m", 2)]),
            index(1, 3, &[("c", 4)]),
            index(2, 5, &[("c", 6)]),
            leaf(3, 0, 4, &["a"]),
            leaf(4, 3, 5, &["c"]),
            leaf(5, 4, 6, &["m"]),
            leaf(6, 5, 0, &["n"]),
        ];
        assert_eq!(
            audit(pages),
            Some(Violation::DuplicateIndexKey {
                page: 2,
                key: b"c".to_vec()
            })
        );
    }

    #[test]
    fn test_bad_tag_is_reported() {
        let mut pages = two_leaves();
        pages[1] = PageBuffer::new(PAGE_SIZE);
        assert!(matches!(
            audit(pages),
            Some(Violation::CorruptPage { page: 1, .. })
        ));
    }

    #[test]
    fn test_storage_failure_is_an_error() {
        let store = MemoryPageStore::new(PAGE_SIZE);
        let config = TreeConfig::new(PAGE_SIZE, 1).expect("config");
        let tree = BTree::open(store.clone(), &config).expect("open tree");
        for i in 0u8..20 {
            tree.put(&[b'k', i], &[i; 16]).expect("put");
        }

        store.set_fault_config(FaultConfig::failing_reads());
        let error = tree.integrity_report().expect_err("read failure");
        assert_eq!(error.kind(), FaultKind::Storage);
    }

    #[test]
    fn test_display() {
        let violation = Violation::DuplicateIndexKey {
            page: 4,
            key: vec![0xab, 0x01],
        };
        assert_eq!(violation.to_string(), "index page 4 repeats key ab01");
    }
}

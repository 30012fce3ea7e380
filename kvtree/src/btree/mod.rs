//! Disk-backed B+tree.
//!
//! Page 0 is always the root. A small tree is a single leaf; once the root
//! leaf overflows it becomes an index page and the leaves move elsewhere.
//!
//! # Layout
//!
//! - Index pages (`'I'`) route keys to children by separator keys.
//! - Data pages (`'D'`) hold sorted key/value pairs and link to their
//!   neighbors for ordered scans.
//! - Terminated pages (`'X'`) are released pages. They are never reused.
//!
//! All page writes go through the [`TransactionLog`](crate::storage::TransactionLog),
//! so a mutation either lands completely at commit or not at all.

mod cursor;
mod data_page;
mod element;
mod error;
mod index_page;
mod page;
mod tree;
mod validator;

pub use cursor::{Cursor, Entry};
pub use data_page::{DataPage, Removal};
pub use element::{DataElement, IndexElement};
pub use error::{FaultKind, TreeError};
pub use index_page::{ChildSlot, IndexPage};
pub use page::Page;
pub use tree::BTree;
pub use validator::Violation;

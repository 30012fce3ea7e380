//! Errors raised by the tree facade and its pages.

use crate::storage::{LogError, PageError, PageIndex, StoreError};

/// Broad classification of a [`TreeError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultKind {
    /// The caller supplied an argument the tree cannot accept.
    Validation,
    /// The tree or its transaction is in the wrong state for the call.
    State,
    /// Stored pages do not form a valid tree.
    Integrity,
    /// A cursor was used after the tree changed underneath it.
    ConcurrentModification,
    /// The page device failed.
    Storage,
}

/// Errors raised by tree operations.
#[derive(Debug)]
pub enum TreeError {
    /// Key is empty.
    EmptyKey,
    /// Key is not strictly shorter than the maximum key length.
    KeyTooLong { length: usize, max: usize },
    /// Encoded element does not fit in an empty leaf.
    ElementTooLarge { size: usize, max: usize },
    /// Caller-supplied buffer cannot hold the value.
    BufferTooSmall { size: usize, required: usize },
    /// The page store uses a page size the tree cannot address.
    UnsupportedPageSize(usize),
    /// The tree has been closed.
    Closed,
    /// A transaction is already open.
    TransactionOpen,
    /// No transaction is open.
    NoTransaction,
    /// A terminated page was reached through a live reference.
    TerminatedPage(PageIndex),
    /// A page carries an unknown tag byte.
    BadPageTag { page: PageIndex, tag: u8 },
    /// A page decoded but violates a structural rule.
    Corrupt { page: PageIndex, reason: String },
    /// The tree was mutated while a cursor was active.
    ConcurrentModification,
    /// Transaction log error.
    Log(LogError),
    /// Page encoding error.
    Page(PageError),
}

impl TreeError {
    /// Classify this error.
    #[must_use]
    pub const fn kind(&self) -> FaultKind {
        match self {
            Self::EmptyKey
            | Self::KeyTooLong { .. }
            | Self::ElementTooLarge { .. }
            | Self::BufferTooSmall { .. }
            | Self::UnsupportedPageSize(_) => FaultKind::Validation,
            Self::Closed | Self::TransactionOpen | Self::NoTransaction => FaultKind::State,
            Self::TerminatedPage(_)
            | Self::BadPageTag { .. }
            | Self::Corrupt { .. }
            | Self::Page(_) => FaultKind::Integrity,
            Self::ConcurrentModification => FaultKind::ConcurrentModification,
            Self::Log(e) => match e {
                LogError::AlreadyStarted
                | LogError::NotStarted
                | LogError::PendingWrites(_)
                | LogError::ClosedWithOpenTransaction
                | LogError::Store(StoreError::Closed) => FaultKind::State,
                LogError::Store(_) => FaultKind::Storage,
            },
        }
    }

    pub(crate) fn corrupt(page: PageIndex, reason: impl Into<String>) -> Self {
        Self::Corrupt {
            page,
            reason: reason.into(),
        }
    }
}

impl std::fmt::Display for TreeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyKey => write!(f, "key must not be empty"),
            Self::KeyTooLong { length, max } => {
                write!(f, "key length {length} must be less than {max}")
            }
            Self::ElementTooLarge { size, max } => {
                write!(f, "element size {size} exceeds maximum {max}")
            }
            Self::BufferTooSmall { size, required } => {
                write!(f, "buffer too small: size {size}, required {required}")
            }
            Self::UnsupportedPageSize(size) => write!(f, "unsupported page size {size}"),
            Self::Closed => write!(f, "tree is closed"),
            Self::TransactionOpen => write!(f, "a transaction is open"),
            Self::NoTransaction => write!(f, "no transaction is open"),
            Self::TerminatedPage(page) => write!(f, "terminated page {page} was loaded"),
            Self::BadPageTag { page, tag } => {
                write!(f, "bad page tag 0x{tag:02x} on page {page}")
            }
            Self::Corrupt { page, reason } => write!(f, "page {page} is corrupt: {reason}"),
            Self::ConcurrentModification => write!(f, "tree was modified during iteration"),
            Self::Log(e) => write!(f, "transaction log error: {e}"),
            Self::Page(e) => write!(f, "page encoding error: {e}"),
        }
    }
}

impl std::error::Error for TreeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Log(e) => Some(e),
            Self::Page(e) => Some(e),
            _ => None,
        }
    }
}

impl From<LogError> for TreeError {
    fn from(e: LogError) -> Self {
        Self::Log(e)
    }
}

impl From<StoreError> for TreeError {
    fn from(e: StoreError) -> Self {
        Self::Log(LogError::Store(e))
    }
}

impl From<PageError> for TreeError {
    fn from(e: PageError) -> Self {
        Self::Page(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fault_kinds() {
        assert_eq!(
            TreeError::KeyTooLong { length: 300, max: 256 }.kind(),
            FaultKind::Validation
        );
        assert_eq!(TreeError::Closed.kind(), FaultKind::State);
        assert_eq!(TreeError::TerminatedPage(3).kind(), FaultKind::Integrity);
        assert_eq!(
            TreeError::BadPageTag { page: 1, tag: 0 }.kind(),
            FaultKind::Integrity
        );
        assert_eq!(
            TreeError::ConcurrentModification.kind(),
            FaultKind::ConcurrentModification
        );
        assert_eq!(
            TreeError::from(LogError::AlreadyStarted).kind(),
            FaultKind::State
        );
        assert_eq!(
            TreeError::from(LogError::Store(StoreError::InjectedFault("x".into()))).kind(),
            FaultKind::Storage
        );
    }

    #[test]
    fn test_display_and_source() {
        let error = TreeError::BadPageTag { page: 7, tag: b'Q' };
        assert_eq!(error.to_string(), "bad page tag 0x51 on page 7");

        let error = TreeError::from(LogError::NotStarted);
        assert!(std::error::Error::source(&error).is_some());
    }
}

//! Tree configuration.
//!
//! Configuration is plain data with defaults, optionally loaded from
//! environment variables.
//!
//! # Environment Variables
//!
//! - `KVTREE_PAGE_SIZE`: page size in bytes for newly created stores (default: `4096`)
//! - `KVTREE_CACHE_PAGES`: number of committed page images kept in the read cache (default: `100`)
//!
//! # Invariants
//!
//! - `page_size` is within `[MIN_PAGE_SIZE, MAX_PAGE_SIZE]`
//! - `cache_pages` is at least 1

use std::num::NonZeroUsize;

use crate::btree::{DataPage, IndexElement, IndexPage};

/// Smallest supported page size.
pub const MIN_PAGE_SIZE: usize = 128;

/// Largest supported page size. Element value lengths are stored in 2 bytes.
pub const MAX_PAGE_SIZE: usize = 65_536;

/// Upper bound on key length imposed by the 1-byte key length encoding.
pub const KEY_LENGTH_LIMIT: usize = 256;

/// Tree configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeConfig {
    /// Page size in bytes.
    pub page_size: usize,
    /// Capacity of the committed-page cache, in pages.
    pub cache_pages: NonZeroUsize,
}

/// Error returned when loading or validating configuration fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A value is outside its allowed range or does not parse.
    InvalidValue { name: String, message: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidValue { name, message } => {
                write!(f, "invalid value for {name}: {message}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            page_size: Self::DEFAULT_PAGE_SIZE,
            cache_pages: Self::DEFAULT_CACHE_PAGES,
        }
    }
}

impl TreeConfig {
    /// Default page size.
    pub const DEFAULT_PAGE_SIZE: usize = 4096;
    /// Default cache capacity.
    pub const DEFAULT_CACHE_PAGES: NonZeroUsize = NonZeroUsize::MIN.saturating_add(99);

    /// Environment variable holding the page size.
    pub const PAGE_SIZE_VAR: &'static str = "KVTREE_PAGE_SIZE";
    /// Environment variable holding the cache capacity.
    pub const CACHE_PAGES_VAR: &'static str = "KVTREE_CACHE_PAGES";

    /// Build a validated configuration.
    pub fn new(page_size: usize, cache_pages: usize) -> Result<Self, ConfigError> {
        let page_size = validate_page_size(Self::PAGE_SIZE_VAR, page_size)?;
        let cache_pages =
            NonZeroUsize::new(cache_pages).ok_or_else(|| ConfigError::InvalidValue {
                name: Self::CACHE_PAGES_VAR.to_string(),
                message: "must be at least 1".to_string(),
            })?;

        Ok(Self {
            page_size,
            cache_pages,
        })
    }

    /// Load configuration from environment variables, using defaults for unset ones.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set but does not parse or is out of range.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let page_size = load_usize(&lookup, Self::PAGE_SIZE_VAR, Self::DEFAULT_PAGE_SIZE)?;
        let cache_pages = load_usize(
            &lookup,
            Self::CACHE_PAGES_VAR,
            Self::DEFAULT_CACHE_PAGES.get(),
        )?;
        Self::new(page_size, cache_pages)
    }

    /// Largest permitted key length plus one for this page size.
    ///
    /// Keys must be strictly shorter than this. Two maximal separators always
    /// fit in one index page, and the 1-byte length encoding caps it at 256.
    #[must_use]
    pub const fn max_key_length(&self) -> usize {
        max_key_length(self.page_size)
    }
}

/// Key length bound derived from a page size.
#[must_use]
pub const fn max_key_length(page_size: usize) -> usize {
    let derived = (page_size - IndexPage::HEADER_SIZE) / 2 - IndexElement::HEADER_SIZE;
    if derived < KEY_LENGTH_LIMIT {
        derived
    } else {
        KEY_LENGTH_LIMIT
    }
}

/// Largest encoded element (key + value + framing) a leaf can hold.
#[must_use]
pub const fn max_element_size(page_size: usize) -> usize {
    page_size - DataPage::HEADER_SIZE
}

/// Check that a page size is supported.
pub fn validate_page_size(name: &str, page_size: usize) -> Result<usize, ConfigError> {
    if (MIN_PAGE_SIZE..=MAX_PAGE_SIZE).contains(&page_size) {
        Ok(page_size)
    } else {
        Err(ConfigError::InvalidValue {
            name: name.to_string(),
            message: format!(
                "{page_size} is outside the supported range {MIN_PAGE_SIZE}..={MAX_PAGE_SIZE}"
            ),
        })
    }
}

fn load_usize(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    default: usize,
) -> Result<usize, ConfigError> {
    match lookup(name) {
        Some(value) => value
            .trim()
            .parse::<usize>()
            .map_err(|_| ConfigError::InvalidValue {
                name: name.to_string(),
                message: format!("'{value}' is not a valid number"),
            }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = TreeConfig::default();
        assert_eq!(config.page_size, 4096);
        assert_eq!(config.cache_pages.get(), 100);
    }

    #[test]
    fn test_max_key_length() {
        // (4096 - 8) / 2 - 6 = 2038, clamped by the 1-byte length prefix.
        assert_eq!(max_key_length(4096), 256);
        assert_eq!(max_key_length(512), 246);
        assert_eq!(max_key_length(MIN_PAGE_SIZE), 54);
        assert_eq!(max_element_size(4096), 4083);
    }

    #[test]
    fn test_from_lookup_defaults() {
        let config = TreeConfig::from_lookup(|_| None).expect("defaults");
        assert_eq!(config, TreeConfig::default());
    }

    #[test]
    fn test_from_lookup_overrides() {
        let config = TreeConfig::from_lookup(|name| match name {
            "KVTREE_PAGE_SIZE" => Some("1024".to_string()),
            "KVTREE_CACHE_PAGES" => Some(" 8 ".to_string()),
            _ => None,
        })
        .expect("valid");
        assert_eq!(config.page_size, 1024);
        assert_eq!(config.cache_pages.get(), 8);
    }

    #[test]
    fn test_invalid_values() {
        let error = TreeConfig::from_lookup(|name| {
            (name == "KVTREE_PAGE_SIZE").then(|| "big".to_string())
        })
        .expect_err("should fail");
        assert_eq!(
            error.to_string(),
            "invalid value for KVTREE_PAGE_SIZE: 'big' is not a valid number"
        );

        assert!(TreeConfig::new(64, 10).is_err());
        assert!(TreeConfig::new(4096, 0).is_err());
        assert!(TreeConfig::new(MAX_PAGE_SIZE + 1, 10).is_err());
    }
}

//! Cache key derivation.
//!
//! One key per resource type and filter value. The key space is small and
//! finite, which is why the server caches have no capacity-based eviction.

use std::fmt;

pub use inkshop_api_types::ResourceType;

const PRODUCTS_PREFIX: &str = "products";

/// Key of a server-side listing cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Products listing, optionally narrowed to one category.
    ///
    /// `products_all` when unfiltered, `products_<category>` otherwise.
    pub fn products(category: Option<&str>) -> Self {
        match normalize_category(category) {
            Some(category) => Self(format!("{PRODUCTS_PREFIX}_{category}")),
            None => Self(format!("{PRODUCTS_PREFIX}_all")),
        }
    }

    /// Unfiltered listing key for a resource type.
    pub fn listing(resource: ResourceType) -> Self {
        match resource {
            ResourceType::Products => Self::products(None),
            other => Self(other.as_str().to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lower-case and trim a category filter; blank filters count as absent.
pub fn normalize_category(raw: Option<&str>) -> Option<String> {
    raw.map(|value| value.trim().to_lowercase())
        .filter(|value| !value.is_empty())
}

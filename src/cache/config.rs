//! Cache configuration.
//!
//! Per-resource TTLs for the listing caches, resolved from `[cache]` in `inkshop.toml`.

use std::time::Duration;

use super::keys::ResourceType;

pub(crate) const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Listing cache policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// When false every listing request goes straight to the store and nothing is cached.
    pub enabled: bool,
    pub products_ttl: Duration,
    pub artists_ttl: Duration,
    pub gallery_ttl: Duration,
    pub categories_ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            products_ttl: DEFAULT_TTL,
            artists_ttl: DEFAULT_TTL,
            gallery_ttl: DEFAULT_TTL,
            categories_ttl: DEFAULT_TTL,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            enabled: settings.enabled,
            products_ttl: settings.products_ttl,
            artists_ttl: settings.artists_ttl,
            gallery_ttl: settings.gallery_ttl,
            categories_ttl: settings.categories_ttl,
        }
    }
}

impl CacheConfig {
    /// TTL applied to listings of `resource`. The wildcard has no listing and gets the default.
    pub fn ttl_for(&self, resource: ResourceType) -> Duration {
        match resource {
            ResourceType::Products => self.products_ttl,
            ResourceType::Artists => self.artists_ttl,
            ResourceType::Gallery => self.gallery_ttl,
            ResourceType::Categories => self.categories_ttl,
            ResourceType::All => DEFAULT_TTL,
        }
    }

    /// Same TTL for every resource type; handy in tests.
    pub fn uniform(ttl: Duration) -> Self {
        Self {
            enabled: true,
            products_ttl: ttl,
            artists_ttl: ttl,
            gallery_ttl: ttl,
            categories_ttl: ttl,
        }
    }
}

//! Inkshop catalog cache.
//!
//! Server side of the two-tier cache:
//!
//! - **Listing store**: per-key payloads with a fetch instant and a TTL check
//! - **Invalidation registry**: last-invalidation instant per resource type
//! - **Loader**: read-through policy composing the two
//! - **Trigger**: authenticated invalidation plus downstream regeneration
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! enabled = true
//! products_ttl_ms = 86400000
//! # ... see config.rs for all options
//! ```

mod clock;
mod config;
mod error;
mod keys;
mod loader;
pub(crate) mod lock;
mod planner;
mod registry;
mod store;
mod trigger;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock, format_instant};
pub use config::CacheConfig;
pub use error::{CacheError, RegenerationError};
pub use keys::{CacheKey, ResourceType, normalize_category};
pub use loader::{CachedLoader, LoadOutcome, LoadRequest, Loaded, MissReason};
pub use planner::RevalidationPlan;
pub use registry::TimestampRegistry;
pub use store::{CacheEntry, ResourceCache};
pub use trigger::{CacheTrigger, Invalidation, NoopRegenerator, RegenerationHook};

pub(crate) use loader::{METRIC_CACHE_FETCH_MS, METRIC_CACHE_HIT_TOTAL, METRIC_CACHE_MISS_TOTAL};
pub(crate) use trigger::{
    METRIC_CACHE_INVALIDATION_TOTAL, METRIC_CACHE_REGENERATION_FAILURE_TOTAL,
};

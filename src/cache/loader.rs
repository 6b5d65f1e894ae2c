//! Read-through listing loader.
//!
//! Composes the store's TTL with the invalidation registry: an entry is served
//! only while `now - fetched_at < ttl` and no invalidation is newer than
//! `fetched_at`. Everything else falls through to the remote fetch, whose result
//! replaces the entry.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use metrics::{counter, histogram};
use tracing::debug;

use super::clock::SharedClock;
use super::keys::{CacheKey, ResourceType};
use super::registry::TimestampRegistry;
use super::store::{CacheEntry, ResourceCache};

pub(crate) const METRIC_CACHE_HIT_TOTAL: &str = "inkshop_cache_hit_total";
pub(crate) const METRIC_CACHE_MISS_TOTAL: &str = "inkshop_cache_miss_total";
pub(crate) const METRIC_CACHE_FETCH_MS: &str = "inkshop_cache_fetch_ms";

/// One listing lookup.
#[derive(Debug, Clone)]
pub struct LoadRequest {
    pub resource: ResourceType,
    pub key: CacheKey,
    pub ttl: Duration,
    /// Drop the entry first and treat the request as a miss (`nocache=true`).
    pub bypass: bool,
    /// Upstream change marker; an entry fetched before it is stale.
    pub upstream_marker: Option<u64>,
}

impl LoadRequest {
    pub fn new(resource: ResourceType, key: CacheKey, ttl: Duration) -> Self {
        Self {
            resource,
            key,
            ttl,
            bypass: false,
            upstream_marker: None,
        }
    }

    pub fn with_bypass(mut self, bypass: bool) -> Self {
        self.bypass = bypass;
        self
    }

    pub fn with_upstream_marker(mut self, marker: Option<u64>) -> Self {
        self.upstream_marker = marker;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissReason {
    Absent,
    Expired,
    Invalidated,
    UpstreamChanged,
    Bypassed,
    Disabled,
}

impl MissReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            MissReason::Absent => "absent",
            MissReason::Expired => "expired",
            MissReason::Invalidated => "invalidated",
            MissReason::UpstreamChanged => "upstream_changed",
            MissReason::Bypassed => "bypassed",
            MissReason::Disabled => "disabled",
        }
    }
}

impl fmt::Display for MissReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Hit,
    Miss(MissReason),
}

impl LoadOutcome {
    pub fn is_hit(&self) -> bool {
        matches!(self, LoadOutcome::Hit)
    }
}

/// Payload plus how it was obtained.
#[derive(Debug, Clone)]
pub struct Loaded<V> {
    pub payload: V,
    pub outcome: LoadOutcome,
}

/// Applies the read-through policy on top of a [`ResourceCache`].
pub struct CachedLoader<V> {
    cache: Arc<ResourceCache<V>>,
    registry: Arc<TimestampRegistry>,
    clock: SharedClock,
    enabled: bool,
}

impl<V: Clone> CachedLoader<V> {
    pub fn new(
        cache: Arc<ResourceCache<V>>,
        registry: Arc<TimestampRegistry>,
        clock: SharedClock,
    ) -> Self {
        Self {
            cache,
            registry,
            clock,
            enabled: true,
        }
    }

    /// Disable caching: every load fetches and nothing is stored.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn cache(&self) -> &Arc<ResourceCache<V>> {
        &self.cache
    }

    pub fn registry(&self) -> &Arc<TimestampRegistry> {
        &self.registry
    }

    /// Decide whether `request` would be served from the cache right now.
    pub fn classify(&self, request: &LoadRequest) -> LoadOutcome {
        match self.lookup(request) {
            Ok(_) => LoadOutcome::Hit,
            Err(reason) => LoadOutcome::Miss(reason),
        }
    }

    /// Serve `request` from the cache or fill it by awaiting `fetch`.
    ///
    /// A failed fetch propagates unchanged and leaves the cache untouched, so a
    /// later request can retry the fill. Concurrent misses on the same key may
    /// each fetch; the last `set` wins.
    pub async fn load<F, Fut, E>(&self, request: LoadRequest, fetch: F) -> Result<Loaded<V>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let resource = request.resource.as_str();

        if request.bypass && self.enabled {
            self.cache.delete(&request.key);
        }

        let reason = match self.lookup(&request) {
            Ok(entry) => {
                counter!(METRIC_CACHE_HIT_TOTAL, "resource" => resource).increment(1);
                debug!(
                    resource,
                    key = %request.key,
                    outcome = "hit",
                    age_ms = entry.age(self.clock.now_millis()),
                    "serving cached listing"
                );
                return Ok(Loaded {
                    payload: entry.payload,
                    outcome: LoadOutcome::Hit,
                });
            }
            Err(reason) => reason,
        };

        counter!(
            METRIC_CACHE_MISS_TOTAL,
            "resource" => resource,
            "reason" => reason.as_str()
        )
        .increment(1);
        debug!(
            resource,
            key = %request.key,
            outcome = "miss",
            reason = %reason,
            "cache miss, fetching from store"
        );

        let started = Instant::now();
        let payload = fetch().await?;
        histogram!(METRIC_CACHE_FETCH_MS, "resource" => resource)
            .record(started.elapsed().as_secs_f64() * 1000.0);

        if self.enabled {
            let fetched_at = self.cache.set(request.key.clone(), payload.clone());
            debug!(resource, key = %request.key, fetched_at, "listing cached");
        }

        Ok(Loaded {
            payload,
            outcome: LoadOutcome::Miss(reason),
        })
    }

    fn lookup(&self, request: &LoadRequest) -> Result<CacheEntry<V>, MissReason> {
        if !self.enabled {
            return Err(MissReason::Disabled);
        }
        if request.bypass {
            return Err(MissReason::Bypassed);
        }
        let entry = self.cache.peek(&request.key).ok_or(MissReason::Absent)?;
        let reason = evaluate(
            &entry,
            self.clock.now_millis(),
            request.ttl,
            self.registry.effective(request.resource),
            request.upstream_marker,
        );
        match reason {
            Some(reason) => Err(reason),
            None => Ok(entry),
        }
    }
}

/// Validity of one entry. `None` means valid.
///
/// Invalidation uses strict `>`: an entry stamped in the same millisecond as a
/// bump stays valid, otherwise a bump racing a fill could miss forever.
fn evaluate<V>(
    entry: &CacheEntry<V>,
    now: u64,
    ttl: Duration,
    invalidated_at: u64,
    upstream_marker: Option<u64>,
) -> Option<MissReason> {
    if entry.is_expired(now, ttl) {
        return Some(MissReason::Expired);
    }
    if invalidated_at > entry.fetched_at {
        return Some(MissReason::Invalidated);
    }
    if upstream_marker.is_some_and(|marker| marker > entry.fetched_at) {
        return Some(MissReason::UpstreamChanged);
    }
    None
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::cache::clock::ManualClock;

    const TTL: Duration = Duration::from_millis(1_000);

    struct Fixture {
        clock: Arc<ManualClock>,
        loader: CachedLoader<Vec<u32>>,
        fetches: AtomicUsize,
    }

    impl Fixture {
        fn new() -> Self {
            let clock = Arc::new(ManualClock::new(0));
            let registry = Arc::new(TimestampRegistry::empty(clock.clone()));
            let cache = Arc::new(ResourceCache::new(clock.clone()));
            Self {
                loader: CachedLoader::new(cache, registry, clock.clone()),
                clock,
                fetches: AtomicUsize::new(0),
            }
        }

        fn request(resource: ResourceType) -> LoadRequest {
            LoadRequest::new(resource, CacheKey::listing(resource), TTL)
        }

        async fn load(&self, request: LoadRequest, value: u32) -> Loaded<Vec<u32>> {
            let fetches = &self.fetches;
            self.loader
                .load(request, move || async move {
                    fetches.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, String>(vec![value])
                })
                .await
                .expect("fetch succeeds")
        }

        fn fetch_count(&self) -> usize {
            self.fetches.load(Ordering::SeqCst)
        }
    }

    #[tokio::test]
    async fn first_load_fetches_then_hits() {
        let fx = Fixture::new();
        let request = Fixture::request(ResourceType::Products);

        let first = fx.load(request.clone(), 1).await;
        assert_eq!(first.outcome, LoadOutcome::Miss(MissReason::Absent));

        fx.clock.set(500);
        let second = fx.load(request, 2).await;
        assert_eq!(second.outcome, LoadOutcome::Hit);
        assert_eq!(second.payload, vec![1]);
        assert_eq!(fx.fetch_count(), 1);
    }

    #[tokio::test]
    async fn expired_entry_is_refetched_regardless_of_registry() {
        let fx = Fixture::new();
        let request = Fixture::request(ResourceType::Artists);
        fx.load(request.clone(), 1).await;

        fx.clock.set(1_000);
        let reloaded = fx.load(request, 2).await;
        assert_eq!(reloaded.outcome, LoadOutcome::Miss(MissReason::Expired));
        assert_eq!(reloaded.payload, vec![2]);
        assert_eq!(fx.fetch_count(), 2);
    }

    #[tokio::test]
    async fn bump_after_fetch_invalidates_within_ttl() {
        let fx = Fixture::new();
        let request = Fixture::request(ResourceType::Products);
        fx.load(request.clone(), 1).await;

        fx.clock.set(100);
        fx.loader.registry().bump(ResourceType::Products);

        fx.clock.set(200);
        let reloaded = fx.load(request, 2).await;
        assert_eq!(reloaded.outcome, LoadOutcome::Miss(MissReason::Invalidated));
        assert_eq!(reloaded.payload, vec![2]);
    }

    #[tokio::test]
    async fn bump_in_same_instant_as_fetch_keeps_entry_valid() {
        let fx = Fixture::new();
        let request = Fixture::request(ResourceType::Gallery);

        fx.clock.set(50);
        fx.load(request.clone(), 1).await;
        fx.loader.registry().bump(ResourceType::Gallery);

        let again = fx.load(request, 2).await;
        assert_eq!(again.outcome, LoadOutcome::Hit);
        assert_eq!(again.payload, vec![1]);
    }

    #[tokio::test]
    async fn bump_of_other_type_does_not_invalidate() {
        let fx = Fixture::new();
        let request = Fixture::request(ResourceType::Products);
        fx.load(request.clone(), 1).await;

        fx.clock.set(10);
        fx.loader.registry().bump(ResourceType::Artists);

        assert_eq!(fx.loader.classify(&request), LoadOutcome::Hit);
    }

    #[tokio::test]
    async fn bump_all_invalidates_every_concrete_type() {
        let fx = Fixture::new();
        fx.clock.set(5);
        for resource in ResourceType::CONCRETE {
            fx.load(Fixture::request(resource), 1).await;
        }

        fx.clock.set(10);
        fx.loader.registry().bump(ResourceType::All);

        for resource in ResourceType::CONCRETE {
            assert_eq!(
                fx.loader.classify(&Fixture::request(resource)),
                LoadOutcome::Miss(MissReason::Invalidated),
                "{resource} should be invalidated by all"
            );
        }
    }

    #[tokio::test]
    async fn bypass_drops_entry_and_refetches() {
        let fx = Fixture::new();
        let request = Fixture::request(ResourceType::Categories);
        fx.load(request.clone(), 1).await;

        let bypassed = fx.load(request.clone().with_bypass(true), 2).await;
        assert_eq!(bypassed.outcome, LoadOutcome::Miss(MissReason::Bypassed));
        assert_eq!(bypassed.payload, vec![2]);

        let cached = fx.load(request, 3).await;
        assert_eq!(cached.outcome, LoadOutcome::Hit);
        assert_eq!(cached.payload, vec![2]);
    }

    #[tokio::test]
    async fn upstream_marker_newer_than_entry_forces_miss() {
        let fx = Fixture::new();
        let request = Fixture::request(ResourceType::Products);
        fx.clock.set(100);
        fx.load(request.clone(), 1).await;

        let same_instant = request.clone().with_upstream_marker(Some(100));
        assert_eq!(fx.loader.classify(&same_instant), LoadOutcome::Hit);

        let newer = request.with_upstream_marker(Some(101));
        assert_eq!(
            fx.loader.classify(&newer),
            LoadOutcome::Miss(MissReason::UpstreamChanged)
        );
    }

    #[tokio::test]
    async fn failed_fetch_leaves_cache_untouched() {
        let fx = Fixture::new();
        let request = Fixture::request(ResourceType::Products);
        fx.load(request.clone(), 1).await;

        fx.clock.set(2_000);
        let result = fx
            .loader
            .load(request.clone(), || async { Err::<Vec<u32>, _>("store down") })
            .await;
        assert_eq!(result.unwrap_err(), "store down");

        let entry = fx.loader.cache().peek(&request.key).expect("stale entry kept");
        assert_eq!(entry.payload, vec![1]);
        assert_eq!(entry.fetched_at, 0);
    }

    #[tokio::test]
    async fn failed_fill_on_empty_cache_stores_nothing() {
        let fx = Fixture::new();
        let request = Fixture::request(ResourceType::Artists);

        let result = fx
            .loader
            .load(request.clone(), || async { Err::<Vec<u32>, _>("boom") })
            .await;
        assert!(result.is_err());
        assert!(fx.loader.cache().is_empty());
    }

    #[tokio::test]
    async fn disabled_loader_always_fetches_and_never_stores() {
        let fx = Fixture::new();
        let loader = CachedLoader::new(
            fx.loader.cache().clone(),
            fx.loader.registry().clone(),
            fx.clock.clone(),
        )
        .with_enabled(false);
        let request = Fixture::request(ResourceType::Products);

        let loaded = loader
            .load(request.clone(), || async { Ok::<_, String>(vec![9]) })
            .await
            .expect("fetch");
        assert_eq!(loaded.outcome, LoadOutcome::Miss(MissReason::Disabled));
        assert!(loader.cache().is_empty());
    }
}

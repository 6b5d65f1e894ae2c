//! Client-side mirror cache.
//!
//! Same `get/set/delete/clear` shape as the server listing store, plus
//! pattern invalidation, subscriber notifications and cross-cache broadcast.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, LazyLock, Mutex, RwLock, Weak};
use std::time::Duration;

use regex::Regex;
use serde_json::Value;
use tracing::{debug, error};
use uuid::Uuid;

use crate::cache::lock::{mutex_guard, read_guard, write_guard};
use crate::cache::{CacheEntry, SharedClock};

use super::bus::{BroadcastEnvelope, BroadcastMessage, InvalidationBus, InvalidationScope};

const COMPONENT: &str = "client::manager";
const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Prefix shared by every products key (`products`, `products_<categoria>`).
pub const PRODUCTS_KEY: &str = "products";
/// Prefix shared by every artists key (`artists_tattooers`, `artists_piercers`, ...).
pub const ARTISTS_KEY: &str = "artists";
pub const GALLERY_KEY: &str = "galeria";
pub const CATEGORIES_KEY: &str = "categories";

static PRODUCTS_PATTERN: LazyLock<Regex> = LazyLock::new(|| prefix_pattern(PRODUCTS_KEY));
static ARTISTS_PATTERN: LazyLock<Regex> = LazyLock::new(|| prefix_pattern(ARTISTS_KEY));

fn prefix_pattern(prefix: &str) -> Regex {
    Regex::new(&format!("^{}", regex::escape(prefix))).expect("escaped prefix is a valid pattern")
}

/// Key selector for [`ClientCacheManager::invalidate_by_pattern`].
#[derive(Debug, Clone)]
pub enum KeyPattern {
    /// Matches keys containing the string.
    Substring(String),
    Regex(Regex),
}

impl KeyPattern {
    pub fn substring(value: impl Into<String>) -> Self {
        Self::Substring(value.into())
    }

    pub fn regex(pattern: &str) -> Result<Self, regex::Error> {
        Regex::new(pattern).map(Self::Regex)
    }

    pub fn matches(&self, key: &str) -> bool {
        match self {
            Self::Substring(value) => key.contains(value.as_str()),
            Self::Regex(regex) => regex.is_match(key),
        }
    }
}

impl fmt::Display for KeyPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Substring(value) => f.write_str(value),
            Self::Regex(regex) => write!(f, "/{}/", regex.as_str()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    Absent,
    Fresh,
    Stale,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheAction {
    Invalidated,
    Reloaded,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheNotification {
    pub key: String,
    pub action: CacheAction,
    /// Subscription key that matched by prefix; `None` for exact matches.
    pub pattern: Option<String>,
    pub timestamp: u64,
}

pub type Callback = Arc<dyn Fn(&CacheNotification) + Send + Sync>;

type SubscriberMap = Mutex<HashMap<String, Vec<Callback>>>;

/// Handle returned by [`ClientCacheManager::subscribe`].
///
/// Dropping the handle keeps the callback registered; call
/// [`Subscription::unsubscribe`] to remove it.
pub struct Subscription {
    key: String,
    callback: Callback,
    subscribers: Weak<SubscriberMap>,
}

impl Subscription {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn unsubscribe(self) {
        let Some(subscribers) = self.subscribers.upgrade() else {
            return;
        };
        let mut subscribers = mutex_guard(&*subscribers, COMPONENT, "unsubscribe");
        if let Some(callbacks) = subscribers.get_mut(&self.key) {
            callbacks.retain(|existing| !Arc::ptr_eq(existing, &self.callback));
            if callbacks.is_empty() {
                subscribers.remove(&self.key);
            }
        }
    }
}

/// Where an invalidation came from. Only local ones are re-broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    Local,
    Remote,
}

pub struct ClientCacheManager<V = Value> {
    id: Uuid,
    entries: RwLock<HashMap<String, CacheEntry<V>>>,
    subscribers: Arc<SubscriberMap>,
    bus: Option<Arc<dyn InvalidationBus>>,
    clock: SharedClock,
    ttl: Duration,
}

impl<V: Clone> ClientCacheManager<V> {
    pub fn new(clock: SharedClock) -> Self {
        Self {
            id: Uuid::new_v4(),
            entries: RwLock::new(HashMap::new()),
            subscribers: Arc::new(Mutex::new(HashMap::new())),
            bus: None,
            clock,
            ttl: DEFAULT_TTL,
        }
    }

    /// Broadcast local invalidations to sibling caches on `bus`.
    pub fn with_bus(mut self, bus: Arc<dyn InvalidationBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn get(&self, key: &str) -> Option<V> {
        self.get_with_ttl(key, self.ttl)
    }

    /// Payload for `key` unless absent or at least `ttl` old; expired entries are dropped.
    pub fn get_with_ttl(&self, key: &str, ttl: Duration) -> Option<V> {
        let now = self.clock.now_millis();
        {
            let entries = read_guard(&self.entries, COMPONENT, "get");
            match entries.get(key) {
                None => return None,
                Some(entry) if !entry.is_expired(now, ttl) => return Some(entry.payload.clone()),
                Some(_) => {}
            }
        }
        let mut entries = write_guard(&self.entries, COMPONENT, "get.evict");
        if entries
            .get(key)
            .is_some_and(|entry| entry.is_expired(now, ttl))
        {
            entries.remove(key);
        }
        None
    }

    pub fn set(&self, key: impl Into<String>, payload: V) {
        let fetched_at = self.clock.now_millis();
        write_guard(&self.entries, COMPONENT, "set").insert(
            key.into(),
            CacheEntry {
                payload,
                fetched_at,
            },
        );
    }

    pub fn delete(&self, key: &str) -> bool {
        write_guard(&self.entries, COMPONENT, "delete")
            .remove(key)
            .is_some()
    }

    pub fn clear(&self) {
        write_guard(&self.entries, COMPONENT, "clear").clear();
    }

    pub fn len(&self) -> usize {
        read_guard(&self.entries, COMPONENT, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = read_guard(&self.entries, COMPONENT, "keys")
            .keys()
            .cloned()
            .collect();
        keys.sort();
        keys
    }

    /// Lifecycle state of `key` under the default TTL, without evicting.
    pub fn state(&self, key: &str) -> EntryState {
        let now = self.clock.now_millis();
        match read_guard(&self.entries, COMPONENT, "state").get(key) {
            None => EntryState::Absent,
            Some(entry) if entry.is_expired(now, self.ttl) => EntryState::Stale,
            Some(_) => EntryState::Fresh,
        }
    }

    /// Delete every key matching `pattern`, notify subscribers of each, and
    /// return how many were removed.
    pub fn invalidate_by_pattern(&self, pattern: &KeyPattern) -> usize {
        let removed: Vec<String> = {
            let mut entries = write_guard(&self.entries, COMPONENT, "invalidate_by_pattern");
            let matching: Vec<String> = entries
                .keys()
                .filter(|key| pattern.matches(key))
                .cloned()
                .collect();
            for key in &matching {
                entries.remove(key);
            }
            matching
        };

        debug!(
            cache_id = %self.id,
            pattern = %pattern,
            removed = removed.len(),
            "client cache invalidated by pattern"
        );
        for key in &removed {
            self.notify(key, CacheAction::Invalidated);
        }
        removed.len()
    }

    /// Drop every `products*` key and tell sibling caches to do the same.
    pub fn invalidate_products(&self) -> usize {
        self.apply(InvalidationScope::Products, Origin::Local)
    }

    /// Drop every `artists*` key and tell sibling caches to do the same.
    pub fn invalidate_artists(&self) -> usize {
        self.apply(InvalidationScope::Artists, Origin::Local)
    }

    /// Drop everything and tell sibling caches to do the same.
    pub fn invalidate_all(&self) -> usize {
        self.apply(InvalidationScope::All, Origin::Local)
    }

    /// Apply a message received from a sibling cache. Never re-broadcasts.
    pub fn handle_message(&self, message: &BroadcastMessage) -> usize {
        self.apply(message.scope(), Origin::Remote)
    }

    /// Apply an envelope from the bus, ignoring our own broadcasts.
    pub fn receive(&self, envelope: &BroadcastEnvelope) -> usize {
        if envelope.origin == self.id {
            return 0;
        }
        self.handle_message(&envelope.message)
    }

    fn apply(&self, scope: InvalidationScope, origin: Origin) -> usize {
        let removed = match scope {
            InvalidationScope::Products => {
                self.invalidate_by_pattern(&KeyPattern::Regex(PRODUCTS_PATTERN.clone()))
            }
            InvalidationScope::Artists => {
                let removed =
                    self.invalidate_by_pattern(&KeyPattern::Regex(ARTISTS_PATTERN.clone()));
                // `artists` subscribers hear about it even when nothing was cached.
                if removed == 0 {
                    self.notify(ARTISTS_KEY, CacheAction::Invalidated);
                }
                removed
            }
            InvalidationScope::All => self.invalidate_by_pattern(&KeyPattern::substring("")),
        };

        if origin == Origin::Local
            && let Some(bus) = self.bus.as_ref()
        {
            bus.publish(BroadcastEnvelope {
                origin: self.id,
                message: BroadcastMessage::new(scope, self.clock.now_millis()),
            });
        }
        removed
    }

    /// Register `callback` for `key`. It also fires for any key that starts
    /// with `key`. Registering the same callback twice for one key is a no-op.
    pub fn subscribe(&self, key: impl Into<String>, callback: Callback) -> Subscription {
        let key = key.into();
        {
            let mut subscribers = mutex_guard(&*self.subscribers, COMPONENT, "subscribe");
            let callbacks = subscribers.entry(key.clone()).or_default();
            if !callbacks.iter().any(|existing| Arc::ptr_eq(existing, &callback)) {
                callbacks.push(callback.clone());
            }
        }
        Subscription {
            key,
            callback,
            subscribers: Arc::downgrade(&self.subscribers),
        }
    }

    pub fn subscriber_count(&self, key: &str) -> usize {
        mutex_guard(&*self.subscribers, COMPONENT, "subscriber_count")
            .get(key)
            .map_or(0, Vec::len)
    }

    /// Delete `key`, await `reload`, store its result and notify `Reloaded`.
    /// On failure the key stays absent, subscribers get `Error`, and the error is returned.
    pub async fn force_reload<F, Fut, E>(&self, key: &str, reload: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
        E: fmt::Display,
    {
        self.delete(key);
        match reload().await {
            Ok(payload) => {
                self.set(key, payload.clone());
                self.notify(key, CacheAction::Reloaded);
                Ok(payload)
            }
            Err(err) => {
                error!(cache_id = %self.id, key, error = %err, "client cache reload failed");
                self.notify(key, CacheAction::Error);
                Err(err)
            }
        }
    }

    fn notify(&self, key: &str, action: CacheAction) {
        let timestamp = self.clock.now_millis();
        let targets: Vec<(Callback, Option<String>)> = {
            let subscribers = mutex_guard(&*self.subscribers, COMPONENT, "notify");
            let exact = subscribers
                .get(key)
                .into_iter()
                .flatten()
                .map(|callback| (callback.clone(), None));
            let prefixed = subscribers
                .iter()
                .filter(|(pattern, _)| pattern.as_str() != key && key.starts_with(pattern.as_str()))
                .flat_map(|(pattern, callbacks)| {
                    callbacks
                        .iter()
                        .map(move |callback| (callback.clone(), Some(pattern.clone())))
                });
            exact.chain(prefixed).collect()
        };

        for (callback, pattern) in targets {
            let notification = CacheNotification {
                key: key.to_string(),
                action,
                pattern,
                timestamp,
            };
            if catch_unwind(AssertUnwindSafe(|| callback(&notification))).is_err() {
                error!(cache_id = %self.id, key, "client cache subscriber panicked");
            }
        }
    }
}

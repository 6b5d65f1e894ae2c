//! Client-side cache mirror: a local cache, the bus that keeps sibling caches
//! in step, and the reconciler that catches up with the server registry.

pub mod bus;
pub mod manager;
pub mod reconciler;
pub mod remote;
pub mod versions;

pub use bus::{
    BroadcastEnvelope, BroadcastMessage, ChannelBus, InvalidationBus, InvalidationScope,
    spawn_listener,
};
pub use manager::{
    ARTISTS_KEY, CATEGORIES_KEY, CacheAction, CacheNotification, Callback, ClientCacheManager,
    EntryState, GALLERY_KEY, KeyPattern, PRODUCTS_KEY, Subscription,
};
pub use reconciler::{
    ClientSyncReconciler, ReconcileError, ReconcileOutcome, ReconcileReport, RegistrySource,
};
pub use remote::{RegistryClient, RemoteError};
pub use versions::{FileVersionStore, MemoryVersionStore, VersionStore, VersionStoreError};

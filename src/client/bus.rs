//! Same-origin invalidation bus.
//!
//! Sibling client caches share a [`ChannelBus`] (a `tokio::sync::broadcast`
//! channel). Delivery is fire-and-forget: a listener that is gone or lagging
//! misses messages and catches up on its next reconciliation.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use super::manager::ClientCacheManager;

const DEFAULT_CAPACITY: usize = 64;

/// Which group of client keys an invalidation covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidationScope {
    Products,
    Artists,
    All,
}

/// Message exchanged between sibling caches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BroadcastMessage {
    InvalidateProducts { timestamp: u64 },
    InvalidateArtists { timestamp: u64 },
    InvalidateAll { timestamp: u64 },
}

impl BroadcastMessage {
    pub fn new(scope: InvalidationScope, timestamp: u64) -> Self {
        match scope {
            InvalidationScope::Products => Self::InvalidateProducts { timestamp },
            InvalidationScope::Artists => Self::InvalidateArtists { timestamp },
            InvalidationScope::All => Self::InvalidateAll { timestamp },
        }
    }

    pub fn scope(&self) -> InvalidationScope {
        match self {
            Self::InvalidateProducts { .. } => InvalidationScope::Products,
            Self::InvalidateArtists { .. } => InvalidationScope::Artists,
            Self::InvalidateAll { .. } => InvalidationScope::All,
        }
    }

    pub fn timestamp(&self) -> u64 {
        match self {
            Self::InvalidateProducts { timestamp }
            | Self::InvalidateArtists { timestamp }
            | Self::InvalidateAll { timestamp } => *timestamp,
        }
    }
}

/// A message plus the id of the cache that sent it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastEnvelope {
    pub origin: Uuid,
    pub message: BroadcastMessage,
}

/// Outbound half of the bus, injected into a [`ClientCacheManager`].
pub trait InvalidationBus: Send + Sync {
    fn publish(&self, envelope: BroadcastEnvelope);
}

#[derive(Clone)]
pub struct ChannelBus {
    sender: broadcast::Sender<BroadcastEnvelope>,
}

impl ChannelBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BroadcastEnvelope> {
        self.sender.subscribe()
    }
}

impl Default for ChannelBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl InvalidationBus for ChannelBus {
    fn publish(&self, envelope: BroadcastEnvelope) {
        if self.sender.send(envelope).is_err() {
            debug!("invalidation broadcast dropped: no listeners");
        }
    }
}

/// Feed every envelope from `receiver` into `manager` until the bus closes.
///
/// A lagged receiver cannot tell which invalidations it missed, so it clears
/// the whole cache.
pub fn spawn_listener<V>(
    manager: Arc<ClientCacheManager<V>>,
    mut receiver: broadcast::Receiver<BroadcastEnvelope>,
) -> JoinHandle<()>
where
    V: Clone + Send + Sync + 'static,
{
    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(envelope) => {
                    manager.receive(&envelope);
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(
                        cache_id = %manager.id(),
                        skipped,
                        "invalidation listener lagged, clearing cache"
                    );
                    manager.clear();
                }
                Err(RecvError::Closed) => {
                    debug!(cache_id = %manager.id(), "invalidation bus closed");
                    break;
                }
            }
        }
    })
}

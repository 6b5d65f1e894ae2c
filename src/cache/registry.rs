//! Invalidation timestamp registry.
//!
//! Holds the last-invalidation instant per resource type. Lives for the process
//! lifetime only; a restart re-initialises every slot to "now", which is safe
//! because the server caches it guards died with the process too.

use std::collections::HashMap;
use std::sync::RwLock;

use inkshop_api_types::RegistrySnapshot;

use super::clock::SharedClock;
use super::keys::ResourceType;
use super::lock::{read_guard, write_guard};

const COMPONENT: &str = "cache::registry";

/// Process-wide invalidation clock, one slot per [`ResourceType`].
pub struct TimestampRegistry {
    instants: RwLock<HashMap<ResourceType, u64>>,
    clock: SharedClock,
}

impl TimestampRegistry {
    /// Create a registry with every slot set to the current instant.
    pub fn new(clock: SharedClock) -> Self {
        let now = clock.now_millis();
        let instants = ResourceType::ALL
            .into_iter()
            .map(|resource| (resource, now))
            .collect();
        Self {
            instants: RwLock::new(instants),
            clock,
        }
    }

    /// Create a registry where every slot reads as "never invalidated" (0).
    pub fn empty(clock: SharedClock) -> Self {
        Self {
            instants: RwLock::new(HashMap::new()),
            clock,
        }
    }

    /// Record an invalidation of `resource` at the current instant.
    ///
    /// Bumping `All` writes the same instant into every concrete slot too.
    /// Returns the instant written.
    pub fn bump(&self, resource: ResourceType) -> u64 {
        let now = self.clock.now_millis();
        let mut instants = write_guard(&self.instants, COMPONENT, "bump");
        instants.insert(resource, now);
        if resource.is_wildcard() {
            for concrete in ResourceType::CONCRETE {
                instants.insert(concrete, now);
            }
        }
        now
    }

    /// Last invalidation of `resource`, or 0 if never invalidated.
    pub fn read(&self, resource: ResourceType) -> u64 {
        read_guard(&self.instants, COMPONENT, "read")
            .get(&resource)
            .copied()
            .unwrap_or(0)
    }

    /// Invalidation instant that applies to `resource`: its own slot or the wildcard, whichever is later.
    pub fn effective(&self, resource: ResourceType) -> u64 {
        let instants = read_guard(&self.instants, COMPONENT, "effective");
        let own = instants.get(&resource).copied().unwrap_or(0);
        let all = instants.get(&ResourceType::All).copied().unwrap_or(0);
        own.max(all)
    }

    /// Copy of every slot, as served to client reconcilers.
    pub fn snapshot(&self) -> RegistrySnapshot {
        let instants = read_guard(&self.instants, COMPONENT, "snapshot");
        let mut snapshot = RegistrySnapshot::default();
        for resource in ResourceType::ALL {
            snapshot.set(resource, instants.get(&resource).copied().unwrap_or(0));
        }
        snapshot
    }
}

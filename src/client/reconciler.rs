//! One-shot reconciliation of a client cache against the server registry.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use async_trait::async_trait;
use inkshop_api_types::{RegistrySnapshot, ResourceType};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::manager::{CATEGORIES_KEY, ClientCacheManager, GALLERY_KEY, KeyPattern};
use super::remote::RemoteError;
use super::versions::{VersionStore, VersionStoreError};

/// Read path of the server's invalidation registry.
#[async_trait]
pub trait RegistrySource: Send + Sync {
    async fn fetch_snapshot(&self) -> Result<RegistrySnapshot, RemoteError>;
}

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("failed to fetch registry snapshot: {0}")]
    Fetch(#[from] RemoteError),
    #[error("failed to access local versions: {0}")]
    Storage(#[from] VersionStoreError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileOutcome {
    Synced,
    /// This reconciler already ran (or is running); nothing was done.
    AlreadyRan,
    /// Fetch or storage failed; the cache was left as it was.
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub outcome: ReconcileOutcome,
    /// Concrete types whose entries were invalidated, in registry order.
    pub invalidated: Vec<ResourceType>,
    /// Number of client cache entries removed.
    pub removed: usize,
    /// Whether an `all` bump cleared the whole cache.
    pub cleared: bool,
}

impl ReconcileReport {
    fn skipped(outcome: ReconcileOutcome) -> Self {
        Self {
            outcome,
            invalidated: Vec::new(),
            removed: 0,
            cleared: false,
        }
    }
}

const IDLE: u8 = 0;
const RUNNING: u8 = 1;
const DONE: u8 = 2;

pub struct ClientSyncReconciler<V = serde_json::Value> {
    manager: Arc<ClientCacheManager<V>>,
    source: Arc<dyn RegistrySource>,
    versions: Arc<dyn VersionStore>,
    state: AtomicU8,
}

impl<V: Clone> ClientSyncReconciler<V> {
    pub fn new(
        manager: Arc<ClientCacheManager<V>>,
        source: Arc<dyn RegistrySource>,
        versions: Arc<dyn VersionStore>,
    ) -> Self {
        Self {
            manager,
            source,
            versions,
            state: AtomicU8::new(IDLE),
        }
    }

    /// Run reconciliation once for this page lifecycle.
    ///
    /// Later or concurrent calls return [`ReconcileOutcome::AlreadyRan`].
    /// Failures are logged and reported as [`ReconcileOutcome::Failed`], never
    /// returned as errors.
    pub async fn run_once(&self) -> ReconcileReport {
        if self
            .state
            .compare_exchange(IDLE, RUNNING, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!(cache_id = %self.manager.id(), "reconciliation already ran");
            return ReconcileReport::skipped(ReconcileOutcome::AlreadyRan);
        }

        let report = match self.reconcile().await {
            Ok(report) => report,
            Err(err) => {
                warn!(
                    cache_id = %self.manager.id(),
                    error = %err,
                    "client cache reconciliation failed; keeping local state"
                );
                ReconcileReport::skipped(ReconcileOutcome::Failed)
            }
        };
        self.state.store(DONE, Ordering::Release);
        report
    }

    pub fn has_run(&self) -> bool {
        self.state.load(Ordering::Acquire) == DONE
    }

    async fn reconcile(&self) -> Result<ReconcileReport, ReconcileError> {
        let server = self.source.fetch_snapshot().await?;
        let local = self.versions.load().await?;

        let mut report = ReconcileReport::skipped(ReconcileOutcome::Synced);
        if server.all > local.all {
            report.removed = self.manager.len();
            report.cleared = true;
            self.manager.clear();
        } else {
            for resource in ResourceType::CONCRETE {
                if server.get(resource) > local.get(resource) {
                    report.removed += self.invalidate(resource);
                    report.invalidated.push(resource);
                }
            }
        }

        self.versions.save(&local.merge_max(&server)).await?;

        info!(
            cache_id = %self.manager.id(),
            cleared = report.cleared,
            invalidated = ?report.invalidated,
            removed = report.removed,
            "client cache reconciled"
        );
        Ok(report)
    }

    fn invalidate(&self, resource: ResourceType) -> usize {
        match resource {
            ResourceType::Products => self.manager.invalidate_products(),
            ResourceType::Artists => self.manager.invalidate_artists(),
            ResourceType::Gallery => {
                self.manager
                    .invalidate_by_pattern(&KeyPattern::substring(GALLERY_KEY))
            }
            ResourceType::Categories => {
                self.manager
                    .invalidate_by_pattern(&KeyPattern::substring(CATEGORIES_KEY))
            }
            ResourceType::All => {
                let removed = self.manager.len();
                self.manager.clear();
                removed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::cache::ManualClock;
    use crate::client::versions::MemoryVersionStore;

    struct FixedSource {
        snapshot: Mutex<Result<RegistrySnapshot, u16>>,
    }

    impl FixedSource {
        fn ok(snapshot: RegistrySnapshot) -> Arc<Self> {
            Arc::new(Self {
                snapshot: Mutex::new(Ok(snapshot)),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                snapshot: Mutex::new(Err(503)),
            })
        }
    }

    #[async_trait]
    impl RegistrySource for FixedSource {
        async fn fetch_snapshot(&self) -> Result<RegistrySnapshot, RemoteError> {
            let snapshot = *self.snapshot.lock().expect("snapshot lock");
            snapshot.map_err(|status| RemoteError::Server {
                status,
                body: "unavailable".to_string(),
            })
        }
    }

    fn snapshot(pairs: &[(ResourceType, u64)]) -> RegistrySnapshot {
        let mut snapshot = RegistrySnapshot::default();
        for (resource, instant) in pairs {
            snapshot.set(*resource, *instant);
        }
        snapshot
    }

    fn seeded_manager() -> Arc<ClientCacheManager<u32>> {
        let manager = ClientCacheManager::new(Arc::new(ManualClock::new(0)));
        for key in [
            "products",
            "products_aretes",
            "artists_tattooers",
            "galeria",
            "categories",
        ] {
            manager.set(key, 1);
        }
        Arc::new(manager)
    }

    fn reconciler(
        manager: &Arc<ClientCacheManager<u32>>,
        source: Arc<dyn RegistrySource>,
        versions: Arc<dyn VersionStore>,
    ) -> ClientSyncReconciler<u32> {
        ClientSyncReconciler::new(manager.clone(), source, versions)
    }

    #[tokio::test]
    async fn newer_concrete_types_are_invalidated() {
        let manager = seeded_manager();
        let versions = Arc::new(MemoryVersionStore::with_snapshot(snapshot(&[
            (ResourceType::Products, 10),
            (ResourceType::Gallery, 10),
        ])));
        let server = snapshot(&[
            (ResourceType::Products, 20),
            (ResourceType::Gallery, 10),
            (ResourceType::Categories, 5),
        ]);

        let report = reconciler(&manager, FixedSource::ok(server), versions.clone())
            .run_once()
            .await;

        assert_eq!(report.outcome, ReconcileOutcome::Synced);
        assert_eq!(
            report.invalidated,
            vec![ResourceType::Products, ResourceType::Categories]
        );
        assert_eq!(report.removed, 3);
        assert!(!report.cleared);
        assert_eq!(
            manager.keys(),
            vec!["artists_tattooers".to_string(), "galeria".to_string()]
        );
        assert_eq!(versions.saved(), Some(server));
    }

    #[tokio::test]
    async fn all_bump_clears_everything() {
        let manager = seeded_manager();
        let server = snapshot(&[(ResourceType::All, 3), (ResourceType::Products, 3)]);

        let report = reconciler(
            &manager,
            FixedSource::ok(server),
            Arc::new(MemoryVersionStore::new()),
        )
        .run_once()
        .await;

        assert!(report.cleared);
        assert!(report.invalidated.is_empty());
        assert_eq!(report.removed, 5);
        assert!(manager.is_empty());
    }

    #[tokio::test]
    async fn second_reconciliation_without_bumps_changes_nothing() {
        let manager = seeded_manager();
        let versions: Arc<MemoryVersionStore> = Arc::new(MemoryVersionStore::new());
        let server = snapshot(&[(ResourceType::Artists, 50)]);

        let first = reconciler(&manager, FixedSource::ok(server), versions.clone())
            .run_once()
            .await;
        assert_eq!(first.invalidated, vec![ResourceType::Artists]);
        manager.set("artists_piercers", 2);
        let before = manager.keys();

        let second = reconciler(&manager, FixedSource::ok(server), versions.clone())
            .run_once()
            .await;
        assert_eq!(second.outcome, ReconcileOutcome::Synced);
        assert!(second.invalidated.is_empty());
        assert_eq!(second.removed, 0);
        assert_eq!(manager.keys(), before);
    }

    #[tokio::test]
    async fn older_server_reading_never_rolls_back_watermark() {
        let manager = seeded_manager();
        let local = snapshot(&[(ResourceType::Products, 100)]);
        let versions = Arc::new(MemoryVersionStore::with_snapshot(local));
        let server = snapshot(&[(ResourceType::Products, 40), (ResourceType::Artists, 60)]);

        let report = reconciler(&manager, FixedSource::ok(server), versions.clone())
            .run_once()
            .await;

        assert_eq!(report.invalidated, vec![ResourceType::Artists]);
        assert_eq!(
            versions.saved(),
            Some(snapshot(&[
                (ResourceType::Products, 100),
                (ResourceType::Artists, 60),
            ]))
        );
    }

    #[tokio::test]
    async fn fetch_failure_is_swallowed_and_keeps_state() {
        let manager = seeded_manager();
        let versions = Arc::new(MemoryVersionStore::new());

        let report = reconciler(&manager, FixedSource::failing(), versions.clone())
            .run_once()
            .await;

        assert_eq!(report.outcome, ReconcileOutcome::Failed);
        assert_eq!(manager.len(), 5);
        assert_eq!(versions.saved(), None);
    }

    #[tokio::test]
    async fn run_once_guard_skips_repeat_calls() {
        let manager = seeded_manager();
        let server = snapshot(&[(ResourceType::Products, 1)]);
        let reconciler = reconciler(
            &manager,
            FixedSource::ok(server),
            Arc::new(MemoryVersionStore::new()),
        );

        assert!(!reconciler.has_run());
        assert_eq!(reconciler.run_once().await.outcome, ReconcileOutcome::Synced);
        assert!(reconciler.has_run());
        assert_eq!(
            reconciler.run_once().await.outcome,
            ReconcileOutcome::AlreadyRan
        );
    }
}

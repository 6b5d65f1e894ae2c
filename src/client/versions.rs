//! Durable storage for the client's last-seen registry snapshot.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use inkshop_api_types::RegistrySnapshot;
use thiserror::Error;

use crate::cache::lock::mutex_guard;

#[derive(Debug, Error)]
pub enum VersionStoreError {
    #[error("version file `{path}`: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("version file `{path}` is not a registry snapshot: {source}")]
    Format {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Where the reconciler keeps its watermark between runs.
#[async_trait]
pub trait VersionStore: Send + Sync {
    /// Previously saved snapshot, or all zeros when nothing was saved yet.
    async fn load(&self) -> Result<RegistrySnapshot, VersionStoreError>;
    async fn save(&self, snapshot: &RegistrySnapshot) -> Result<(), VersionStoreError>;
}

/// JSON file on disk, written via a temp file and rename.
#[derive(Debug, Clone)]
pub struct FileVersionStore {
    path: PathBuf,
}

impl FileVersionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> VersionStoreError {
        VersionStoreError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

#[async_trait]
impl VersionStore for FileVersionStore {
    async fn load(&self) -> Result<RegistrySnapshot, VersionStoreError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Ok(RegistrySnapshot::default());
            }
            Err(err) => return Err(self.io_error(err)),
        };
        serde_json::from_slice(&bytes).map_err(|source| VersionStoreError::Format {
            path: self.path.clone(),
            source,
        })
    }

    async fn save(&self, snapshot: &RegistrySnapshot) -> Result<(), VersionStoreError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|err| self.io_error(err))?;
        }

        let body = serde_json::to_vec_pretty(snapshot).map_err(|source| {
            VersionStoreError::Format {
                path: self.path.clone(),
                source,
            }
        })?;
        let staging = self.path.with_extension("tmp");
        tokio::fs::write(&staging, body)
            .await
            .map_err(|err| self.io_error(err))?;
        tokio::fs::rename(&staging, &self.path)
            .await
            .map_err(|err| self.io_error(err))
    }
}

#[derive(Debug, Default)]
pub struct MemoryVersionStore {
    snapshot: Mutex<Option<RegistrySnapshot>>,
}

impl MemoryVersionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(snapshot: RegistrySnapshot) -> Self {
        Self {
            snapshot: Mutex::new(Some(snapshot)),
        }
    }

    /// Last saved snapshot, `None` if `save` never ran.
    pub fn saved(&self) -> Option<RegistrySnapshot> {
        *mutex_guard(&self.snapshot, "client::versions", "saved")
    }
}

#[async_trait]
impl VersionStore for MemoryVersionStore {
    async fn load(&self) -> Result<RegistrySnapshot, VersionStoreError> {
        Ok(self.saved().unwrap_or_default())
    }

    async fn save(&self, snapshot: &RegistrySnapshot) -> Result<(), VersionStoreError> {
        *mutex_guard(&self.snapshot, "client::versions", "save") = Some(*snapshot);
        Ok(())
    }
}

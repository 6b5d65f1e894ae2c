//! Catalog store backed by a directory of JSON files.
//!
//! Layout: `<data_dir>/<collection>.json` holds a JSON array of documents and
//! the optional `<data_dir>/meta.json` holds `{"<collection>": {"lastUpdated": millis}}`.
//! Files are re-read on every call; caching is the listing cache's job.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::application::repos::{CatalogRepo, Document, FieldFilter, RepoError};

const META_FILE: &str = "meta";

#[derive(Debug, Default, Deserialize)]
struct MetaEntry {
    #[serde(rename = "lastUpdated", default)]
    last_updated: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct JsonDirStore {
    root: PathBuf,
}

impl JsonDirStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, name: &str) -> Result<PathBuf, RepoError> {
        let valid = !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(RepoError::corrupt(name, "invalid collection name"));
        }
        Ok(self.root.join(format!("{name}.json")))
    }

    /// Raw file contents, or `None` when the file does not exist.
    async fn read(&self, name: &str) -> Result<Option<Vec<u8>>, RepoError> {
        let path = self.path_for(name)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "collection file missing, treating as empty");
                Ok(None)
            }
            Err(err) => Err(RepoError::unavailable(format!(
                "failed to read {}: {err}",
                path.display()
            ))),
        }
    }

    async fn documents(&self, collection: &str) -> Result<Vec<Document>, RepoError> {
        match self.read(collection).await? {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map_err(|err| RepoError::corrupt(collection, err)),
            None => Ok(Vec::new()),
        }
    }
}

#[async_trait]
impl CatalogRepo for JsonDirStore {
    async fn list(
        &self,
        collection: &str,
        filter: Option<&FieldFilter>,
    ) -> Result<Vec<Document>, RepoError> {
        let mut documents = self.documents(collection).await?;
        if let Some(filter) = filter {
            documents.retain(|document| filter.matches(document));
        }
        Ok(documents)
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, RepoError> {
        Ok(self
            .documents(collection)
            .await?
            .into_iter()
            .find(|document| document.id == id))
    }

    async fn last_updated(&self, collection: &str) -> Result<Option<u64>, RepoError> {
        let Some(bytes) = self.read(META_FILE).await? else {
            return Ok(None);
        };
        let meta: HashMap<String, MetaEntry> =
            serde_json::from_slice(&bytes).map_err(|err| RepoError::corrupt(META_FILE, err))?;
        Ok(meta.get(collection).and_then(|entry| entry.last_updated))
    }
}

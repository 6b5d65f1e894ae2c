//! In-memory catalog store.
//!
//! Collections are held in `HashMap`s guarded by `tokio::sync::RwLock`. State is
//! lost on restart; used by tests and for local seeding.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::application::repos::{CatalogRepo, Document, FieldFilter, RepoError};

#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, Vec<Document>>>,
    markers: RwLock<HashMap<String, u64>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a document, keeping insertion order for new ids.
    pub async fn upsert(&self, collection: &str, document: Document) {
        let mut collections = self.collections.write().await;
        let documents = collections.entry(collection.to_string()).or_default();
        match documents.iter_mut().find(|existing| existing.id == document.id) {
            Some(existing) => *existing = document,
            None => documents.push(document),
        }
    }

    /// Replace a whole collection.
    pub async fn replace(&self, collection: &str, documents: Vec<Document>) {
        self.collections
            .write()
            .await
            .insert(collection.to_string(), documents);
    }

    pub async fn remove(&self, collection: &str, id: &str) -> bool {
        let mut collections = self.collections.write().await;
        let Some(documents) = collections.get_mut(collection) else {
            return false;
        };
        let before = documents.len();
        documents.retain(|document| document.id != id);
        documents.len() != before
    }

    pub async fn set_last_updated(&self, collection: &str, millis: u64) {
        self.markers
            .write()
            .await
            .insert(collection.to_string(), millis);
    }
}

#[async_trait]
impl CatalogRepo for MemoryStore {
    async fn list(
        &self,
        collection: &str,
        filter: Option<&FieldFilter>,
    ) -> Result<Vec<Document>, RepoError> {
        let collections = self.collections.read().await;
        let documents = collections
            .get(collection)
            .map(|documents| {
                documents
                    .iter()
                    .filter(|document| filter.is_none_or(|filter| filter.matches(document)))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        Ok(documents)
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, RepoError> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .and_then(|documents| documents.iter().find(|document| document.id == id))
            .cloned())
    }

    async fn last_updated(&self, collection: &str) -> Result<Option<u64>, RepoError> {
        Ok(self.markers.read().await.get(collection).copied())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::application::repos::{PRODUCT_CATEGORY_FIELD, PRODUCTS_COLLECTION};

    fn product(id: &str, category: &str) -> Document {
        Document::new(id, json!({ "nombre": id, "categoriaSeleccionada": category }))
    }

    #[tokio::test]
    async fn list_applies_filter_and_keeps_order() {
        let store = MemoryStore::new();
        store.upsert(PRODUCTS_COLLECTION, product("a", "aretes")).await;
        store.upsert(PRODUCTS_COLLECTION, product("b", "piercing")).await;
        store.upsert(PRODUCTS_COLLECTION, product("c", "Aretes")).await;

        let all = store.list(PRODUCTS_COLLECTION, None).await.expect("list");
        assert_eq!(
            all.iter().map(|d| d.id.as_str()).collect::<Vec<_>>(),
            ["a", "b", "c"]
        );

        let filter = FieldFilter::new(PRODUCT_CATEGORY_FIELD, "aretes");
        let aretes = store
            .list(PRODUCTS_COLLECTION, Some(&filter))
            .await
            .expect("list");
        assert_eq!(
            aretes.iter().map(|d| d.id.as_str()).collect::<Vec<_>>(),
            ["a", "c"]
        );
    }

    #[tokio::test]
    async fn upsert_replaces_in_place_and_remove_deletes() {
        let store = MemoryStore::new();
        store.upsert(PRODUCTS_COLLECTION, product("a", "old")).await;
        store.upsert(PRODUCTS_COLLECTION, product("a", "new")).await;

        let doc = store
            .get(PRODUCTS_COLLECTION, "a")
            .await
            .expect("get")
            .expect("present");
        assert_eq!(doc.field(PRODUCT_CATEGORY_FIELD), Some(&json!("new")));

        assert!(store.remove(PRODUCTS_COLLECTION, "a").await);
        assert!(!store.remove(PRODUCTS_COLLECTION, "a").await);
        assert!(store.get(PRODUCTS_COLLECTION, "a").await.expect("get").is_none());
    }

    #[tokio::test]
    async fn unknown_collection_is_empty() {
        let store = MemoryStore::new();
        assert!(store.list("nope", None).await.expect("list").is_empty());
        assert_eq!(store.last_updated("nope").await.expect("marker"), None);

        store.set_last_updated(PRODUCTS_COLLECTION, 77).await;
        assert_eq!(
            store.last_updated(PRODUCTS_COLLECTION).await.expect("marker"),
            Some(77)
        );
    }
}

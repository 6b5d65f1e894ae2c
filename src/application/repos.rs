//! Repository traits describing the catalog's backing store.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

pub const PRODUCTS_COLLECTION: &str = "productos";
pub const ARTISTS_COLLECTION: &str = "tatuadores";
pub const CATEGORIES_COLLECTION: &str = "categorias";

/// Product field holding the category name used by `?categoria=`.
pub const PRODUCT_CATEGORY_FIELD: &str = "categoriaSeleccionada";
/// Artist field holding that artist's gallery images.
pub const ARTIST_GALLERY_FIELD: &str = "galeria";

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("collection `{collection}` is corrupt: {message}")]
    Corrupt { collection: String, message: String },
}

impl RepoError {
    pub fn unavailable(err: impl std::fmt::Display) -> Self {
        Self::Unavailable(err.to_string())
    }

    pub fn corrupt(collection: &str, err: impl std::fmt::Display) -> Self {
        Self::Corrupt {
            collection: collection.to_string(),
            message: err.to_string(),
        }
    }
}

/// One stored record: an id plus opaque fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Document {
    pub fn new(id: impl Into<String>, fields: Value) -> Self {
        let fields = match fields {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            id: id.into(),
            fields,
        }
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Flatten into the JSON object served to clients, `id` included.
    pub fn into_value(self) -> Value {
        let mut map = self.fields;
        map.insert("id".to_string(), Value::String(self.id));
        Value::Object(map)
    }
}

/// Equality filter on one string field.
///
/// Matching trims and ignores case so that it agrees with the normalised cache
/// key the listing is stored under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldFilter {
    pub field: String,
    pub equals: String,
}

impl FieldFilter {
    pub fn new(field: impl Into<String>, equals: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            equals: equals.into(),
        }
    }

    pub fn matches(&self, document: &Document) -> bool {
        document
            .field(&self.field)
            .and_then(Value::as_str)
            .is_some_and(|value| value.trim().to_lowercase() == self.equals.trim().to_lowercase())
    }
}

#[async_trait]
pub trait CatalogRepo: Send + Sync {
    async fn list(
        &self,
        collection: &str,
        filter: Option<&FieldFilter>,
    ) -> Result<Vec<Document>, RepoError>;

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, RepoError>;

    /// Upstream change marker for `collection`, in milliseconds since the epoch.
    async fn last_updated(&self, collection: &str) -> Result<Option<u64>, RepoError>;
}

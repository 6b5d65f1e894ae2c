//! Catalog listings served through the read-through cache.

use std::sync::Arc;

use serde_json::Value;
use tracing::instrument;

use crate::application::repos::{
    ARTIST_GALLERY_FIELD, ARTISTS_COLLECTION, CATEGORIES_COLLECTION, CatalogRepo, Document,
    FieldFilter, PRODUCT_CATEGORY_FIELD, PRODUCTS_COLLECTION,
};
use crate::cache::{
    CacheConfig, CacheError, CacheKey, CachedLoader, LoadRequest, Loaded, ResourceType,
    normalize_category,
};

/// A listing payload: an ordered array of JSON records, shared between cache and responses.
pub type Listing = Arc<Vec<Value>>;

pub struct CatalogService {
    repo: Arc<dyn CatalogRepo>,
    loader: CachedLoader<Listing>,
    config: CacheConfig,
}

impl CatalogService {
    pub fn new(
        repo: Arc<dyn CatalogRepo>,
        loader: CachedLoader<Listing>,
        config: CacheConfig,
    ) -> Self {
        Self {
            repo,
            loader: loader.with_enabled(config.enabled),
            config,
        }
    }

    pub fn loader(&self) -> &CachedLoader<Listing> {
        &self.loader
    }

    /// Products, optionally restricted to one category.
    ///
    /// Besides the TTL and the registry, the store's `productos` change marker
    /// also invalidates cached entries.
    #[instrument(skip(self))]
    pub async fn products(
        &self,
        category: Option<&str>,
        bypass: bool,
    ) -> Result<Loaded<Listing>, CacheError> {
        let category = normalize_category(category);
        let marker = self.repo.last_updated(PRODUCTS_COLLECTION).await?;
        let request = self
            .request(ResourceType::Products, CacheKey::products(category.as_deref()))
            .with_bypass(bypass)
            .with_upstream_marker(marker);
        let filter = category.map(|category| FieldFilter::new(PRODUCT_CATEGORY_FIELD, category));
        let repo = self.repo.clone();

        self.loader
            .load(request, move || async move {
                let documents = repo.list(PRODUCTS_COLLECTION, filter.as_ref()).await?;
                Ok::<_, CacheError>(to_listing(documents))
            })
            .await
    }

    #[instrument(skip(self))]
    pub async fn artists(&self, bypass: bool) -> Result<Loaded<Listing>, CacheError> {
        self.collection(ResourceType::Artists, ARTISTS_COLLECTION, bypass)
            .await
    }

    #[instrument(skip(self))]
    pub async fn categories(&self, bypass: bool) -> Result<Loaded<Listing>, CacheError> {
        self.collection(ResourceType::Categories, CATEGORIES_COLLECTION, bypass)
            .await
    }

    /// Every artist's gallery images, concatenated in artist order.
    #[instrument(skip(self))]
    pub async fn gallery(&self, bypass: bool) -> Result<Loaded<Listing>, CacheError> {
        let request = self
            .request(ResourceType::Gallery, CacheKey::listing(ResourceType::Gallery))
            .with_bypass(bypass);

        let repo = self.repo.clone();

        self.loader
            .load(request, move || async move {
                let artists = repo.list(ARTISTS_COLLECTION, None).await?;
                Ok::<_, CacheError>(Arc::new(flatten_gallery(artists)))
            })
            .await
    }

    /// Single product by id; not cached.
    pub async fn product(&self, id: &str) -> Result<Option<Value>, CacheError> {
        Ok(self
            .repo
            .get(PRODUCTS_COLLECTION, id)
            .await?
            .map(Document::into_value))
    }

    async fn collection(
        &self,
        resource: ResourceType,
        collection: &'static str,
        bypass: bool,
    ) -> Result<Loaded<Listing>, CacheError> {
        let request = self
            .request(resource, CacheKey::listing(resource))
            .with_bypass(bypass);

        let repo = self.repo.clone();

        self.loader
            .load(request, move || async move {
                let documents = repo.list(collection, None).await?;
                Ok::<_, CacheError>(to_listing(documents))
            })
            .await
    }

    fn request(&self, resource: ResourceType, key: CacheKey) -> LoadRequest {
        LoadRequest::new(resource, key, self.config.ttl_for(resource))
    }
}

fn to_listing(documents: Vec<Document>) -> Listing {
    Arc::new(documents.into_iter().map(Document::into_value).collect())
}

fn flatten_gallery(artists: Vec<Document>) -> Vec<Value> {
    artists
        .into_iter()
        .filter_map(|mut artist| artist.fields.remove(ARTIST_GALLERY_FIELD))
        .filter_map(|images| match images {
            Value::Array(images) => Some(images),
            _ => None,
        })
        .flatten()
        .collect()
}

//! Catalog listing routes.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::{HeaderName, HeaderValue},
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Deserialize;

use crate::application::catalog::Listing;
use crate::cache::{CacheError, LoadOutcome, Loaded};

use super::HttpState;
use super::error::ApiError;

const CACHE_STATUS_HEADER: HeaderName = HeaderName::from_static("x-cache");

pub(super) fn routes() -> Router<HttpState> {
    Router::new()
        .route("/api/products", get(list_products))
        .route("/api/products/{id}", get(product_detail))
        .route("/api/artists", get(list_artists))
        .route("/api/gallery", get(list_gallery))
        .route("/api/categories", get(list_categories))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ListingQuery {
    categoria: Option<String>,
    nocache: Option<String>,
}

impl ListingQuery {
    fn bypass(&self) -> bool {
        self.nocache
            .as_deref()
            .is_some_and(|value| value.eq_ignore_ascii_case("true") || value == "1")
    }
}

async fn list_products(
    State(state): State<HttpState>,
    Query(query): Query<ListingQuery>,
) -> Response {
    let result = state
        .catalog
        .products(query.categoria.as_deref(), query.bypass())
        .await;
    listing_response("infra::http::catalog::list_products", result)
}

async fn list_artists(
    State(state): State<HttpState>,
    Query(query): Query<ListingQuery>,
) -> Response {
    let result = state.catalog.artists(query.bypass()).await;
    listing_response("infra::http::catalog::list_artists", result)
}

async fn list_gallery(
    State(state): State<HttpState>,
    Query(query): Query<ListingQuery>,
) -> Response {
    let result = state.catalog.gallery(query.bypass()).await;
    listing_response("infra::http::catalog::list_gallery", result)
}

async fn list_categories(
    State(state): State<HttpState>,
    Query(query): Query<ListingQuery>,
) -> Response {
    let result = state.catalog.categories(query.bypass()).await;
    listing_response("infra::http::catalog::list_categories", result)
}

async fn product_detail(State(state): State<HttpState>, Path(id): Path<String>) -> Response {
    const SOURCE: &str = "infra::http::catalog::product_detail";
    match state.catalog.product(&id).await {
        Ok(Some(product)) => Json(product).into_response(),
        Ok(None) => ApiError::not_found(SOURCE, "Product not found").into_response(),
        Err(err) => ApiError::from_cache(SOURCE, err).into_response(),
    }
}

fn listing_response(source: &'static str, result: Result<Loaded<Listing>, CacheError>) -> Response {
    match result {
        Ok(loaded) => {
            let mut response = Json(loaded.payload.as_slice()).into_response();
            response
                .headers_mut()
                .insert(CACHE_STATUS_HEADER, cache_status(loaded.outcome));
            response
        }
        Err(err) => ApiError::from_cache(source, err).into_response(),
    }
}

fn cache_status(outcome: LoadOutcome) -> HeaderValue {
    match outcome {
        LoadOutcome::Hit => HeaderValue::from_static("hit"),
        LoadOutcome::Miss(_) => HeaderValue::from_static("miss"),
    }
}

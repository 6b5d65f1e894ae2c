//! HTTP surface: catalog listings, the invalidation route and a health probe.

mod catalog;
mod error;
mod invalidation;
mod middleware;

use std::sync::Arc;

use axum::{Router, http::StatusCode, routing::get};

use crate::application::catalog::CatalogService;
use crate::cache::CacheTrigger;

pub use error::ApiError;
pub use middleware::RequestContext;

#[derive(Clone)]
pub struct HttpState {
    pub catalog: Arc<CatalogService>,
    pub trigger: Arc<CacheTrigger>,
}

pub fn build_router(state: HttpState) -> Router {
    Router::new()
        .merge(catalog::routes())
        .merge(invalidation::routes())
        .route("/_health", get(health))
        .with_state(state)
        .layer(axum::middleware::from_fn(middleware::log_responses))
        .layer(axum::middleware::from_fn(middleware::set_request_context))
}

async fn health() -> StatusCode {
    StatusCode::NO_CONTENT
}

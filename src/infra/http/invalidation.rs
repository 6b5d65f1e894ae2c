//! Invalidation trigger and registry read path.
//!
//! Every response on this route, errors included, carries open CORS headers so
//! admin pages on other origins can call it.

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::{
        HeaderValue, StatusCode,
        header::{
            ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
            ACCESS_CONTROL_ALLOW_ORIGIN,
        },
    },
    middleware,
    response::{IntoResponse, Response},
    routing::get,
};
use inkshop_api_types::{InvalidateRequest, InvalidateResponse, RegistrySnapshot};

use super::HttpState;
use super::error::ApiError;

pub(super) const INVALIDATE_PATH: &str = "/api/cache/invalidate";

pub(super) fn routes() -> Router<HttpState> {
    Router::new()
        .route(
            INVALIDATE_PATH,
            get(registry_snapshot).post(invalidate).options(preflight),
        )
        .layer(middleware::map_response(with_cors))
}

async fn invalidate(State(state): State<HttpState>, body: Bytes) -> Response {
    const SOURCE: &str = "infra::http::invalidation::invalidate";

    let request: InvalidateRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(err) => {
            // The serde message may quote field values, so only the position is reported.
            return ApiError::with_detail(
                SOURCE,
                StatusCode::BAD_REQUEST,
                "Invalid JSON body",
                format!(
                    "malformed invalidation body at line {} column {}",
                    err.line(),
                    err.column()
                ),
            )
            .into_response();
        }
    };

    match state.trigger.invalidate(&request).await {
        Ok(invalidation) => Json(InvalidateResponse {
            success: true,
            resource: invalidation.resource,
            timestamp: invalidation.timestamp,
        })
        .into_response(),
        Err(err) => ApiError::from_cache(SOURCE, err).into_response(),
    }
}

async fn registry_snapshot(State(state): State<HttpState>) -> Json<RegistrySnapshot> {
    Json(state.trigger.snapshot())
}

async fn preflight() -> StatusCode {
    StatusCode::NO_CONTENT
}

async fn with_cors(mut response: Response) -> Response {
    let headers = response.headers_mut();
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(
        ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("POST, GET, OPTIONS"),
    );
    headers.insert(
        ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type"),
    );
    response
}

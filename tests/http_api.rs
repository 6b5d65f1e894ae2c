//! End-to-end tests for the catalog listings and the invalidation route,
//! driven through the full router with an in-memory store and a manual clock.

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode, header},
    response::Response,
};
use inkshop::{
    application::{
        catalog::CatalogService,
        repos::{CatalogRepo, Document, FieldFilter, RepoError},
    },
    cache::{CacheConfig, CacheTrigger, CachedLoader, ManualClock, ResourceCache, TimestampRegistry},
    infra::{
        http::{HttpState, build_router},
        store::MemoryStore,
    },
};
use serde_json::{Value, json};
use tower::ServiceExt;

const SECRET: &str = "tinta-negra";
const START: u64 = 1_000;

struct App {
    clock: Arc<ManualClock>,
    store: Arc<MemoryStore>,
    router: Router,
}

async fn seeded_store() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    store
        .upsert(
            "productos",
            Document::new("p1", json!({"nombre": "Aro titanio", "categoriaSeleccionada": "aretes"})),
        )
        .await;
    store
        .upsert(
            "productos",
            Document::new("p2", json!({"nombre": "Barra", "categoriaSeleccionada": "piercing"})),
        )
        .await;
    store
        .upsert(
            "tatuadores",
            Document::new("a1", json!({"nombre": "Luz", "galeria": ["g1.jpg", "g2.jpg"]})),
        )
        .await;
    store
        .upsert("categorias", Document::new("c1", json!({"nombre": "aretes"})))
        .await;
    store
}

fn router_for(clock: &Arc<ManualClock>, repo: Arc<dyn CatalogRepo>) -> Router {
    let registry = Arc::new(TimestampRegistry::new(clock.clone()));
    let loader = CachedLoader::new(
        Arc::new(ResourceCache::new(clock.clone())),
        registry.clone(),
        clock.clone(),
    );
    let catalog = CatalogService::new(repo, loader, CacheConfig::default());
    let trigger = CacheTrigger::new(registry, Some(SECRET.to_string()));
    build_router(HttpState {
        catalog: Arc::new(catalog),
        trigger: Arc::new(trigger),
    })
}

async fn app() -> App {
    let clock = Arc::new(ManualClock::new(START));
    let store = seeded_store().await;
    let router = router_for(&clock, store.clone());
    App {
        clock,
        store,
        router,
    }
}

async fn send(router: &Router, method: Method, uri: &str, body: Option<String>) -> Response {
    let mut builder = Request::builder().method(method).uri(uri);
    if body.is_some() {
        builder = builder.header(header::CONTENT_TYPE, "application/json");
    }
    let request = builder
        .body(body.map_or_else(Body::empty, Body::from))
        .expect("request should build");
    router
        .clone()
        .oneshot(request)
        .await
        .expect("router should respond")
}

async fn get(router: &Router, uri: &str) -> Response {
    send(router, Method::GET, uri, None).await
}

async fn post_invalidate(router: &Router, body: Value) -> Response {
    send(
        router,
        Method::POST,
        "/api/cache/invalidate",
        Some(body.to_string()),
    )
    .await
}

async fn json_body(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body should read");
    serde_json::from_slice(&bytes).expect("body should be JSON")
}

fn cache_status(response: &Response) -> &str {
    response
        .headers()
        .get("x-cache")
        .and_then(|value| value.to_str().ok())
        .expect("x-cache header")
}

fn assert_cors(response: &Response) {
    let headers = response.headers();
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    assert_eq!(
        headers[header::ACCESS_CONTROL_ALLOW_METHODS],
        "POST, GET, OPTIONS"
    );
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_HEADERS], "Content-Type");
}

#[tokio::test]
async fn listing_is_served_from_cache_until_invalidated() {
    let app = app().await;

    let first = get(&app.router, "/api/products").await;
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(cache_status(&first), "miss");
    assert_eq!(json_body(first).await.as_array().map(Vec::len), Some(2));

    app.store
        .upsert("productos", Document::new("p3", json!({"nombre": "Nuevo"})))
        .await;

    let cached = get(&app.router, "/api/products").await;
    assert_eq!(cache_status(&cached), "hit");
    assert_eq!(json_body(cached).await.as_array().map(Vec::len), Some(2));

    app.clock.advance(10);
    let invalidated = post_invalidate(&app.router, json!({"type": "products", "secret": SECRET})).await;
    assert_eq!(invalidated.status(), StatusCode::OK);
    assert_eq!(
        json_body(invalidated).await,
        json!({"success": true, "type": "products", "timestamp": START + 10})
    );

    app.clock.advance(1);
    let refreshed = get(&app.router, "/api/products").await;
    assert_eq!(cache_status(&refreshed), "miss");
    assert_eq!(json_body(refreshed).await.as_array().map(Vec::len), Some(3));
}

#[tokio::test]
async fn invalidation_in_the_same_instant_keeps_the_entry() {
    let app = app().await;

    assert_eq!(cache_status(&get(&app.router, "/api/artists").await), "miss");
    let response = post_invalidate(&app.router, json!({"type": "artists", "secret": SECRET})).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(cache_status(&get(&app.router, "/api/artists").await), "hit");
}

#[tokio::test]
async fn invalidating_all_refreshes_every_listing() {
    let app = app().await;
    for uri in ["/api/products", "/api/artists", "/api/gallery", "/api/categories"] {
        assert_eq!(cache_status(&get(&app.router, uri).await), "miss", "{uri}");
    }

    app.clock.advance(5);
    let response = post_invalidate(&app.router, json!({"type": "all", "secret": SECRET})).await;
    assert_eq!(response.status(), StatusCode::OK);
    app.clock.advance(5);

    for uri in ["/api/products", "/api/artists", "/api/gallery", "/api/categories"] {
        assert_eq!(cache_status(&get(&app.router, uri).await), "miss", "{uri}");
    }
}

#[tokio::test]
async fn category_filter_and_nocache() {
    let app = app().await;

    let filtered = get(&app.router, "/api/products?categoria=%20Aretes%20").await;
    assert_eq!(cache_status(&filtered), "miss");
    let body = json_body(filtered).await;
    assert_eq!(body.as_array().map(Vec::len), Some(1));
    assert_eq!(body[0]["id"], "p1");

    let again = get(&app.router, "/api/products?categoria=aretes").await;
    assert_eq!(cache_status(&again), "hit");

    let bypassed = get(&app.router, "/api/products?categoria=aretes&nocache=true").await;
    assert_eq!(cache_status(&bypassed), "miss");
}

#[tokio::test]
async fn gallery_flattens_artist_images() {
    let app = app().await;
    let response = get(&app.router, "/api/gallery").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await, json!(["g1.jpg", "g2.jpg"]));
}

#[tokio::test]
async fn wrong_or_missing_secret_is_unauthorized() {
    let app = app().await;

    for body in [
        json!({"type": "products", "secret": "nope"}),
        json!({"type": "products"}),
        json!({"type": "bogus", "secret": "nope"}),
        json!({"type": 5, "secret": "wrong"}),
        json!({"type": "products", "secret": 123}),
    ] {
        let response = post_invalidate(&app.router, body).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_cors(&response);
        assert_eq!(json_body(response).await, json!({"error": "Unauthorized"}));
    }
}

#[tokio::test]
async fn unknown_type_is_bad_request() {
    let app = app().await;
    let before = json_body(get(&app.router, "/api/cache/invalidate").await).await;

    let response = post_invalidate(&app.router, json!({"type": "posts", "secret": SECRET})).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_cors(&response);
    let body = json_body(response).await;
    assert!(
        body["error"]
            .as_str()
            .is_some_and(|message| message.contains("posts")),
        "unexpected body: {body}"
    );

    let after = json_body(get(&app.router, "/api/cache/invalidate").await).await;
    assert_eq!(before, after);
}

#[tokio::test]
async fn non_string_type_is_bad_request_once_authenticated() {
    let app = app().await;
    let response = post_invalidate(&app.router, json!({"type": 5, "secret": SECRET})).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_cors(&response);
}

#[tokio::test]
async fn malformed_body_is_bad_request() {
    let app = app().await;
    let response = send(
        &app.router,
        Method::POST,
        "/api/cache/invalidate",
        Some("{not json".to_string()),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await, json!({"error": "Invalid JSON body"}));
}

#[tokio::test]
async fn gallery_alias_is_accepted() {
    let app = app().await;
    app.clock.advance(3);
    let response = post_invalidate(&app.router, json!({"type": "gallery", "secret": SECRET})).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["type"], "galeria");
}

#[tokio::test]
async fn preflight_returns_no_content_with_cors() {
    let app = app().await;
    let response = send(&app.router, Method::OPTIONS, "/api/cache/invalidate", None).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_cors(&response);
}

#[tokio::test]
async fn registry_snapshot_lists_every_type() {
    let app = app().await;
    app.clock.advance(7);
    let response = post_invalidate(&app.router, json!({"type": "categories", "secret": SECRET})).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = get(&app.router, "/api/cache/invalidate").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_cors(&response);
    assert_eq!(
        json_body(response).await,
        json!({
            "products": START,
            "artists": START,
            "galeria": START,
            "categories": START + 7,
            "all": START,
        })
    );
}

#[tokio::test]
async fn product_detail_is_found_or_404() {
    let app = app().await;

    let found = get(&app.router, "/api/products/p2").await;
    assert_eq!(found.status(), StatusCode::OK);
    assert_eq!(json_body(found).await["nombre"], "Barra");

    let missing = get(&app.router, "/api/products/nope").await;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(missing).await, json!({"error": "Product not found"}));
}

#[tokio::test]
async fn health_probe_is_no_content() {
    let app = app().await;
    assert_eq!(get(&app.router, "/_health").await.status(), StatusCode::NO_CONTENT);
}

struct UnavailableRepo;

#[async_trait]
impl CatalogRepo for UnavailableRepo {
    async fn list(
        &self,
        _collection: &str,
        _filter: Option<&FieldFilter>,
    ) -> Result<Vec<Document>, RepoError> {
        Err(RepoError::unavailable("connection refused"))
    }

    async fn get(&self, _collection: &str, _id: &str) -> Result<Option<Document>, RepoError> {
        Err(RepoError::unavailable("connection refused"))
    }

    async fn last_updated(&self, _collection: &str) -> Result<Option<u64>, RepoError> {
        Ok(None)
    }
}

#[tokio::test]
async fn upstream_failure_is_internal_error() {
    let clock = Arc::new(ManualClock::new(START));
    let router = router_for(&clock, Arc::new(UnavailableRepo));

    for uri in ["/api/products", "/api/artists", "/api/gallery", "/api/categories"] {
        let response = get(&router, uri).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR, "{uri}");
        assert_eq!(
            json_body(response).await,
            json!({"error": "Failed to load catalog data"})
        );
    }
}

#[tokio::test]
async fn request_id_is_echoed_or_minted() {
    let app = app().await;

    let request = Request::builder()
        .uri("/_health")
        .header("x-request-id", "trace-42")
        .body(Body::empty())
        .expect("request should build");
    let response = app
        .router
        .clone()
        .oneshot(request)
        .await
        .expect("router should respond");
    assert_eq!(response.headers()["x-request-id"], "trace-42");

    let minted = get(&app.router, "/_health").await;
    let id = minted.headers()["x-request-id"]
        .to_str()
        .expect("ascii id");
    assert_eq!(id.len(), 36);
}

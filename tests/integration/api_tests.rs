//! API integration tests for tile retrieval and error handling.
//!
//! Tests verify:
//! - Tile retrieval and cache-hit reporting
//! - Per-layer CORS and cache headers
//! - Skips, redirects and error responses

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, Response, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use tower::ServiceExt;

use tilesmith::cache::MemoryCache;
use tilesmith::layer::{Layer, LayerRegistry};
use tilesmith::tile::TileService;
use tilesmith::{create_router, RouterConfig};

use super::test_utils::{decode, shared, CountingTileProvider, TileAnswer};

fn router() -> Router {
    let mut registry = LayerRegistry::new();

    let (_, grey) = shared(CountingTileProvider::solid([128, 128, 128, 255]));
    registry
        .insert(
            "grey",
            Layer::new(grey)
                .with_allowed_origin("https://maps.example.com")
                .with_max_cache_age(Duration::from_secs(3600))
                .with_redirect("gif", "png"),
        )
        .unwrap();

    let (_, empty) = shared(CountingTileProvider::new(TileAnswer::Skip));
    registry.insert("empty", Layer::new(empty)).unwrap();

    let (_, moved) = shared(CountingTileProvider::new(TileAnswer::Redirect(
        "https://tiles.example.com/0/0/0.png".to_string(),
    )));
    registry.insert("moved", Layer::new(moved)).unwrap();

    let service = TileService::new(registry, Arc::new(MemoryCache::new()));
    create_router(service, RouterConfig::new().with_tracing(false))
}

async fn get(router: &Router, uri: &str) -> Response<Body> {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    router.clone().oneshot(request).await.unwrap()
}

async fn json_body(response: Response<Body>) -> serde_json::Value {
    let body = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body).unwrap()
}

// =============================================================================
// Tile Retrieval
// =============================================================================

#[tokio::test]
async fn test_tile_retrieval_success() {
    let router = router();

    let response = get(&router, "/grey/2/1/3.png").await;
    assert_eq!(response.status(), StatusCode::OK);

    let headers = response.headers();
    assert_eq!(headers["content-type"], "image/png");
    assert_eq!(headers["x-tile-cache-hit"], "false");
    assert_eq!(headers["access-control-allow-origin"], "https://maps.example.com");
    assert_eq!(headers["cache-control"], "public, max-age=3600");
    assert!(headers.contains_key("expires"));

    let body = response.into_body().collect().await.unwrap().to_bytes();
    let image = decode(&body);
    assert_eq!(image.dimensions(), (256, 256));
    assert_eq!(image.get_pixel(10, 10).0, [128, 128, 128, 255]);
}

#[tokio::test]
async fn test_second_request_is_cache_hit() {
    let router = router();

    let first = get(&router, "/grey/2/1/3.jpg").await;
    assert_eq!(first.headers()["x-tile-cache-hit"], "false");
    assert_eq!(first.headers()["content-type"], "image/jpeg");

    let second = get(&router, "/grey/2/1/3.jpg").await;
    assert_eq!(second.status(), StatusCode::OK);
    assert_eq!(second.headers()["x-tile-cache-hit"], "true");
}

#[tokio::test]
async fn test_health() {
    let router = router();

    let response = get(&router, "/health").await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = json_body(response).await;
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["layers"], 3);
}

// =============================================================================
// Skips and Redirects
// =============================================================================

#[tokio::test]
async fn test_skipped_tile_is_not_found() {
    let router = router();

    let response = get(&router, "/empty/1/0/0.png").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(response).await["error"], "skipped");
}

#[tokio::test]
async fn test_extension_redirect() {
    let router = router();

    let response = get(&router, "/grey/4/3/2.gif").await;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(response.headers()["location"], "/grey/4/3/2.png");
}

#[tokio::test]
async fn test_provider_redirect() {
    let router = router();

    let response = get(&router, "/moved/0/0/0.png").await;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(
        response.headers()["location"],
        "https://tiles.example.com/0/0/0.png"
    );
}

// =============================================================================
// Errors
// =============================================================================

#[tokio::test]
async fn test_unknown_layer() {
    let router = router();

    let response = get(&router, "/nope/1/0/0.png").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let json = json_body(response).await;
    assert_eq!(json["error"], "not_found");
    assert!(json["message"].as_str().unwrap().contains("nope"));
}

#[tokio::test]
async fn test_unknown_extension() {
    let router = router();

    let response = get(&router, "/grey/1/0/0.webp").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"], "unknown_extension");
}

#[tokio::test]
async fn test_malformed_filename() {
    let router = router();

    for uri in ["/grey/1/0/0", "/grey/1/0/zero.png"] {
        let response = get(&router, uri).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{}", uri);
        assert_eq!(json_body(response).await["error"], "invalid_request");
    }
}

#[tokio::test]
async fn test_non_numeric_zoom() {
    let router = router();

    let response = get(&router, "/grey/z/0/0.png").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_tile_outside_grid() {
    let router = router();

    for uri in [
        "/grey/0/0/4294967295.png",
        "/grey/1/0/5.png",
        "/grey/1/2/0.png",
    ] {
        let response = get(&router, uri).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{}", uri);
        assert_eq!(json_body(response).await["error"], "invalid_request");
    }

    // The last row and column of the grid are still served
    let response = get(&router, "/grey/1/1/1.png").await;
    assert_eq!(response.status(), StatusCode::OK);
}

//! Tile service tests.
//!
//! Tests verify:
//! - One metatile render answers every tile in the metatile
//! - Recent tiles cover for a backing cache that keeps nothing
//! - Recent tiles expire
//! - Render locks are always released

use std::sync::Arc;
use std::time::Duration;

use tilesmith::cache::{CacheBackend, ManualClock, NoCache, RecentTileCache};
use tilesmith::geo::Coordinate;
use tilesmith::layer::{Layer, LayerRegistry};
use tilesmith::metatile::Metatile;
use tilesmith::tile::{TileOutcome, TileResponse, TileService};

use super::test_utils::{decode, shared, CountingAreaProvider, CountingTileProvider, SpyCache, TileAnswer};

fn tile(outcome: TileOutcome) -> TileResponse {
    match outcome {
        TileOutcome::Tile(response) => response,
        other => panic!("Expected a tile, got {:?}", other),
    }
}

fn metatile_registry(provider: Arc<dyn tilesmith::provider::Provider>) -> LayerRegistry {
    let mut registry = LayerRegistry::new();
    registry
        .insert(
            "relief",
            Layer::new(provider).with_metatile(Metatile::new(2, 2, 16).unwrap()),
        )
        .unwrap();
    registry
}

#[tokio::test]
async fn test_metatile_siblings_are_cache_hits() {
    let (provider, dynamic) = shared(CountingAreaProvider::new());
    let cache = Arc::new(SpyCache::new());
    let service = TileService::new(metatile_registry(dynamic), cache.clone());
    let coord = Coordinate::new(3, 5, 5);

    let first = tile(service.get_tile("relief", coord, "png", false).await.unwrap());
    assert!(!first.cache_hit);
    assert_eq!(provider.calls(), 1);
    // Sub-tiles are saved once by the metatile render, not again here
    assert_eq!(cache.save_count().await, 4);

    for sibling in Metatile::new(2, 2, 16).unwrap().all_coords(&coord) {
        let response = tile(service.get_tile("relief", sibling, "png", false).await.unwrap());
        assert!(response.cache_hit, "{} should be cached", sibling);
    }

    assert_eq!(provider.calls(), 1);
    assert_eq!(cache.lock_count(), 1);
    assert_eq!(cache.unlock_count(), 1);
}

#[tokio::test]
async fn test_recent_tiles_cover_for_empty_backend() {
    let (provider, dynamic) = shared(CountingAreaProvider::new());
    let service = TileService::new(metatile_registry(dynamic), Arc::new(NoCache));
    let coord = Coordinate::new(3, 4, 4);

    let first = tile(service.get_tile("relief", coord, "png", false).await.unwrap());
    let sibling = tile(
        service
            .get_tile("relief", coord.down().right(), "png", false)
            .await
            .unwrap(),
    );

    assert!(sibling.cache_hit);
    assert_eq!(provider.calls(), 1);
    assert_eq!(decode(&first.data).dimensions(), (256, 256));
    assert_eq!(service.recent().len().await, 4);
}

#[tokio::test]
async fn test_recent_tiles_expire() {
    let (provider, dynamic) = shared(CountingAreaProvider::new());
    let clock = Arc::new(ManualClock::new());
    let recent = Arc::new(RecentTileCache::with_clock(clock.clone()).with_ttl(Duration::from_secs(60)));
    let backend: Arc<dyn CacheBackend> = Arc::new(NoCache);
    let service = TileService::with_shared(Arc::new(metatile_registry(dynamic)), backend, recent);
    let coord = Coordinate::new(3, 4, 4);

    service.get_tile("relief", coord, "png", false).await.unwrap();
    clock.advance(Duration::from_secs(61));

    let sibling = tile(
        service
            .get_tile("relief", coord.right(), "png", false)
            .await
            .unwrap(),
    );
    assert!(!sibling.cache_hit);
    assert_eq!(provider.calls(), 2);
}

#[tokio::test]
async fn test_ignore_cached_rerenders_and_saves() {
    let (provider, dynamic) = shared(CountingTileProvider::solid([10, 20, 30, 255]));
    let mut registry = LayerRegistry::new();
    registry.insert("flat", Layer::new(dynamic)).unwrap();
    let cache = Arc::new(SpyCache::new());
    let service = TileService::new(registry, cache.clone());
    let coord = Coordinate::new(1, 1, 1);

    service.get_tile("flat", coord, "jpg", false).await.unwrap();
    let cached = tile(service.get_tile("flat", coord, "jpg", false).await.unwrap());
    let forced = tile(service.get_tile("flat", coord, "jpg", true).await.unwrap());

    assert!(cached.cache_hit);
    assert!(!forced.cache_hit);
    assert_eq!(forced.mime_type, "image/jpeg");
    assert_eq!(provider.calls(), 2);
    assert_eq!(cache.save_count().await, 2);
}

#[tokio::test]
async fn test_skipped_tiles_are_not_saved() {
    let (_, dynamic) = shared(CountingTileProvider::new(TileAnswer::Skip));
    let mut registry = LayerRegistry::new();
    registry.insert("empty", Layer::new(dynamic)).unwrap();
    let cache = Arc::new(SpyCache::new());
    let service = TileService::new(registry, cache.clone());

    let outcome = service
        .get_tile("empty", Coordinate::new(2, 1, 1), "png", false)
        .await
        .unwrap();

    assert!(matches!(outcome, TileOutcome::Skipped));
    assert_eq!(cache.save_count().await, 0);
    assert_eq!(cache.lock_count(), cache.unlock_count());
}

#[tokio::test]
async fn test_provider_redirect_propagates() {
    let (_, dynamic) = shared(CountingTileProvider::new(TileAnswer::Redirect(
        "https://tiles.example.com/2/1/1.png".to_string(),
    )));
    let mut registry = LayerRegistry::new();
    registry.insert("moved", Layer::new(dynamic)).unwrap();
    let cache = Arc::new(SpyCache::new());
    let service = TileService::new(registry, cache.clone());

    match service
        .get_tile("moved", Coordinate::new(2, 1, 1), "png", false)
        .await
        .unwrap()
    {
        TileOutcome::Redirect(location) => {
            assert_eq!(location, "https://tiles.example.com/2/1/1.png")
        }
        other => panic!("Expected redirect, got {:?}", other),
    }
    assert_eq!(cache.save_count().await, 0);
}

#[tokio::test]
async fn test_lock_released_when_render_fails() {
    let (_, dynamic) = shared(CountingAreaProvider::new().with_height_error(3));
    let cache = Arc::new(SpyCache::new());
    let service = TileService::new(metatile_registry(dynamic), cache.clone());
    let coord = Coordinate::new(3, 5, 5);

    assert!(service.get_tile("relief", coord, "png", false).await.is_err());
    assert_eq!(cache.lock_count(), 1);
    assert_eq!(cache.unlock_count(), 1);

    // A second request can take the lock again
    assert!(service.get_tile("relief", coord, "png", false).await.is_err());
    assert_eq!(cache.lock_count(), 2);
}

#[tokio::test]
async fn test_concurrent_requests_render_metatile_once() {
    let (provider, dynamic) = shared(CountingAreaProvider::new());
    let cache = Arc::new(SpyCache::new());
    let service = Arc::new(TileService::new(metatile_registry(dynamic), cache.clone()));
    let coord = Coordinate::new(3, 4, 4);

    let mut handles = Vec::new();
    for sibling in Metatile::new(2, 2, 16).unwrap().all_coords(&coord) {
        let service = service.clone();
        handles.push(tokio::spawn(async move {
            service.get_tile("relief", sibling, "png", false).await.map(|_| ())
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    // Waiters re-read the backing cache after taking the lock
    assert_eq!(provider.calls(), 1);
    assert_eq!(cache.save_count().await, 4);
}

//! Layer rendering tests.
//!
//! Tests verify:
//! - Out-of-bounds tiles never reach the provider or the cache
//! - Metatile renders are cut into tiles, each saved and kept as recent
//! - Providers returning the wrong image size are rejected before any write

use std::sync::Arc;

use image::imageops;

use tilesmith::bitmap::TileFormat;
use tilesmith::cache::RecentTileCache;
use tilesmith::error::LayerError;
use tilesmith::geo::{Bounds, Coordinate};
use tilesmith::layer::Layer;
use tilesmith::metatile::Metatile;
use tilesmith::provider::RenderOutcome;

use super::test_utils::{decode, shared, CountingAreaProvider, SpyCache};

fn rendered(outcome: RenderOutcome) -> image::RgbaImage {
    match outcome {
        RenderOutcome::Rendered(bitmap) => bitmap.to_image().unwrap().to_rgba8(),
        other => panic!("Expected Rendered, got {:?}", other),
    }
}

#[tokio::test]
async fn test_out_of_bounds_tile_is_skipped() {
    let (provider, dynamic) = shared(CountingAreaProvider::new());
    let layer = Layer::new(dynamic)
        .with_metatile(Metatile::new(2, 2, 16).unwrap())
        .with_bounds(Bounds::zoom_range(4, 10).unwrap());
    let cache = SpyCache::new();
    let recent = RecentTileCache::new();

    let outcome = layer
        .render(&Coordinate::new(3, 0, 0), TileFormat::Png, &cache, &recent)
        .await
        .unwrap();

    assert!(matches!(outcome, RenderOutcome::Skipped(None)));
    assert_eq!(provider.calls(), 0);
    assert_eq!(cache.save_count().await, 0);
    assert!(recent.is_empty().await);
}

#[tokio::test]
async fn test_geographic_bounds_skip() {
    let (provider, dynamic) = shared(CountingAreaProvider::new());
    // Roughly the British Isles
    let layer = Layer::new(dynamic).with_bounds(Bounds::new(0, 18, 61.0, -11.0, 49.0, 2.0).unwrap());
    let cache = SpyCache::new();
    let recent = RecentTileCache::new();

    // Zoom 4 tile over the Pacific
    let outcome = layer
        .render(&Coordinate::new(4, 7, 0), TileFormat::Png, &cache, &recent)
        .await
        .unwrap();
    assert!(matches!(outcome, RenderOutcome::Skipped(None)));
    assert_eq!(provider.calls(), 0);

    // Zoom 4 tile containing London
    let outcome = layer
        .render(&Coordinate::new(4, 5, 7), TileFormat::Png, &cache, &recent)
        .await
        .unwrap();
    assert!(outcome.is_rendered());
    assert_eq!(provider.calls(), 1);
}

#[tokio::test]
async fn test_metatile_render_fans_out() {
    let (provider, dynamic) = shared(CountingAreaProvider::new());
    let layer = Layer::new(dynamic).with_metatile(Metatile::new(2, 2, 16).unwrap());
    let cache = SpyCache::new();
    let recent = RecentTileCache::new();
    let coord = Coordinate::new(3, 5, 5);

    let tile = rendered(
        layer
            .render(&coord, TileFormat::Png, &cache, &recent)
            .await
            .unwrap(),
    );

    // One provider call at the buffered metatile size
    assert_eq!(provider.calls(), 1);
    let (composite, zoom) = provider.last_render().await.unwrap();
    assert_eq!(composite.dimensions(), layer.meta_size());
    assert_eq!(composite.dimensions(), (544, 544));
    assert_eq!(zoom, 3);

    // Every tile of the metatile is saved and kept as recent
    let mut expected = layer.metatile().all_coords(&coord);
    expected.sort();
    assert_eq!(cache.save_count().await, 4);
    assert_eq!(cache.saved_coords().await, expected);
    assert_eq!(recent.len().await, 4);

    // The returned tile is the requested region of the composite
    let subtiles = layer.meta_subtiles(&coord);
    let anchor = subtiles.iter().find(|s| s.coord == coord).unwrap();
    let region = imageops::crop_imm(&composite, anchor.x, anchor.y, 256, 256).to_image();
    assert_eq!(tile, region);

    // Siblings in the recent cache hold their own regions
    for subtile in &subtiles {
        let body = recent
            .get(layer.id(), subtile.coord, TileFormat::Png)
            .await
            .unwrap();
        let region = imageops::crop_imm(&composite, subtile.x, subtile.y, 256, 256).to_image();
        assert_eq!(decode(&body), region);
    }
}

#[tokio::test]
async fn test_metatile_without_write_cache_only_fills_recent() {
    let (_, dynamic) = shared(CountingAreaProvider::new());
    let layer = Layer::new(dynamic)
        .with_metatile(Metatile::new(2, 2, 0).unwrap())
        .with_write_cache(false);
    let cache = SpyCache::new();
    let recent = RecentTileCache::new();

    layer
        .render(&Coordinate::new(2, 0, 0), TileFormat::Jpeg, &cache, &recent)
        .await
        .unwrap();

    assert_eq!(cache.save_count().await, 0);
    assert_eq!(recent.len().await, 4);
}

#[tokio::test]
async fn test_wrong_height_is_rejected_without_writes() {
    let (provider, dynamic) = shared(CountingAreaProvider::new().with_height_error(1));
    let layer = Layer::new(dynamic).with_metatile(Metatile::new(2, 2, 16).unwrap());
    let cache = SpyCache::new();
    let recent = RecentTileCache::new();

    let result = layer
        .render(&Coordinate::new(3, 5, 5), TileFormat::Png, &cache, &recent)
        .await;

    assert!(matches!(result, Err(LayerError::Configuration(_))));
    assert_eq!(provider.calls(), 1);
    assert_eq!(cache.save_count().await, 0);
    assert!(recent.is_empty().await);
}

#[tokio::test]
async fn test_wrong_width_is_rejected_without_writes() {
    let (provider, dynamic) = shared(CountingAreaProvider::new().with_width_error(100));
    let layer = Layer::new(dynamic).with_metatile(Metatile::new(2, 2, 16).unwrap());
    let cache = SpyCache::new();
    let recent = RecentTileCache::new();

    let result = layer
        .render(&Coordinate::new(3, 5, 5), TileFormat::Png, &cache, &recent)
        .await;

    match result {
        Err(LayerError::Configuration(message)) => assert!(message.contains("wide"), "{}", message),
        other => panic!("Expected a configuration error, got {:?}", other),
    }
    assert_eq!(provider.calls(), 1);
    assert_eq!(cache.save_count().await, 0);
    assert!(recent.is_empty().await);
}

#[tokio::test]
async fn test_area_provider_without_metatile() {
    let (provider, dynamic) = shared(CountingAreaProvider::new());
    let layer = Layer::new(dynamic).with_tile_dim(512);
    let cache = SpyCache::new();
    let recent = RecentTileCache::new();

    let tile = rendered(
        layer
            .render(&Coordinate::new(5, 10, 10), TileFormat::Png, &cache, &recent)
            .await
            .unwrap(),
    );

    assert_eq!(tile.dimensions(), (512, 512));
    assert_eq!(provider.calls(), 1);
    // Single tiles are left for the caller to save
    assert_eq!(cache.save_count().await, 0);
    assert!(recent.is_empty().await);
}

#[tokio::test]
async fn test_concurrent_metatile_renders_share_layer() {
    let (_, dynamic) = shared(CountingAreaProvider::new());
    let layer = Arc::new(Layer::new(dynamic).with_metatile(Metatile::new(1, 2, 8).unwrap()));
    let cache = Arc::new(SpyCache::new());
    let recent = Arc::new(RecentTileCache::new());

    let mut handles = Vec::new();
    for column in 0..4u32 {
        let (layer, cache, recent) = (layer.clone(), cache.clone(), recent.clone());
        handles.push(tokio::spawn(async move {
            layer
                .render(
                    &Coordinate::new(2, 1, column),
                    TileFormat::Png,
                    cache.as_ref(),
                    &recent,
                )
                .await
                .map(|outcome| outcome.is_rendered())
        }));
    }

    for handle in handles {
        assert!(handle.await.unwrap().unwrap());
    }
    // Two metatiles, each rendered twice, two tiles per render
    assert_eq!(cache.save_count().await, 8);
    assert_eq!(recent.len().await, 4);
}

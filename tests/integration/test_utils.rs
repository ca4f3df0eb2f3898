//! Test utilities for integration tests.
//!
//! This module provides a spying cache backend and providers that count
//! their calls, so tests can check exactly how often rendering and cache
//! writes happen.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use image::{Rgba, RgbaImage};
use tokio::sync::{Mutex, RwLock};

use tilesmith::bitmap::{Bitmap, TileFormat};
use tilesmith::cache::{CacheBackend, MemoryCache};
use tilesmith::error::LayerError;
use tilesmith::geo::Coordinate;
use tilesmith::layer::Layer;
use tilesmith::metatile::Envelope;
use tilesmith::provider::{AreaRenderer, Provider, RenderOutcome, TileRenderer};

// =============================================================================
// Spy Cache
// =============================================================================

/// A memory cache that records every call made to it.
#[derive(Default)]
pub struct SpyCache {
    inner: MemoryCache,
    saves: Mutex<Vec<Coordinate>>,
    locks: AtomicUsize,
    unlocks: AtomicUsize,
}

impl SpyCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn save_count(&self) -> usize {
        self.saves.lock().await.len()
    }

    pub async fn saved_coords(&self) -> Vec<Coordinate> {
        let mut coords = self.saves.lock().await.clone();
        coords.sort();
        coords
    }

    pub fn lock_count(&self) -> usize {
        self.locks.load(Ordering::SeqCst)
    }

    pub fn unlock_count(&self) -> usize {
        self.unlocks.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CacheBackend for SpyCache {
    async fn lock(
        &self,
        layer: &Layer,
        coord: &Coordinate,
        format: TileFormat,
    ) -> Result<(), LayerError> {
        self.locks.fetch_add(1, Ordering::SeqCst);
        self.inner.lock(layer, coord, format).await
    }

    async fn unlock(
        &self,
        layer: &Layer,
        coord: &Coordinate,
        format: TileFormat,
    ) -> Result<(), LayerError> {
        self.unlocks.fetch_add(1, Ordering::SeqCst);
        self.inner.unlock(layer, coord, format).await
    }

    async fn read(
        &self,
        layer: &Layer,
        coord: &Coordinate,
        format: TileFormat,
    ) -> Result<Option<Bytes>, LayerError> {
        self.inner.read(layer, coord, format).await
    }

    async fn save(
        &self,
        body: Bytes,
        layer: &Layer,
        coord: &Coordinate,
        format: TileFormat,
    ) -> Result<(), LayerError> {
        self.saves.lock().await.push(*coord);
        self.inner.save(body, layer, coord, format).await
    }

    async fn remove(
        &self,
        layer: &Layer,
        coord: &Coordinate,
        format: TileFormat,
    ) -> Result<(), LayerError> {
        self.inner.remove(layer, coord, format).await
    }
}

// =============================================================================
// Counting Providers
// =============================================================================

/// An image whose pixels encode their own position, so crops can be told
/// apart.
pub fn gradient(width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_fn(width, height, |x, y| {
        Rgba([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8, 255])
    })
}

/// Area renderer drawing a gradient and remembering what it drew.
#[derive(Default)]
pub struct CountingAreaProvider {
    calls: AtomicUsize,
    last: RwLock<Option<(RgbaImage, u8)>>,
    height_error: u32,
    width_error: u32,
}

impl CountingAreaProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return images this many pixels shorter than requested.
    pub fn with_height_error(mut self, pixels: u32) -> Self {
        self.height_error = pixels;
        self
    }

    /// Return images this many pixels narrower than requested.
    pub fn with_width_error(mut self, pixels: u32) -> Self {
        self.width_error = pixels;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// The last image rendered and the zoom it was rendered at.
    pub async fn last_render(&self) -> Option<(RgbaImage, u8)> {
        self.last.read().await.clone()
    }
}

#[async_trait]
impl AreaRenderer for CountingAreaProvider {
    async fn render_area(
        &self,
        width: u32,
        height: u32,
        _srs: &str,
        _envelope: Envelope,
        zoom: u8,
    ) -> Result<RenderOutcome, LayerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let image = gradient(
            width.saturating_sub(self.width_error),
            height.saturating_sub(self.height_error),
        );
        *self.last.write().await = Some((image.clone(), zoom));
        Ok(RenderOutcome::Rendered(Bitmap::raster(image)))
    }
}

impl Provider for CountingAreaProvider {
    fn name(&self) -> &str {
        "counting-area"
    }

    fn as_area_renderer(&self) -> Option<&dyn AreaRenderer> {
        Some(self)
    }
}

/// What a [`CountingTileProvider`] answers with.
#[derive(Debug, Clone)]
pub enum TileAnswer {
    Solid([u8; 4]),
    Skip,
    Redirect(String),
}

/// Tile renderer with a fixed answer that counts its calls.
pub struct CountingTileProvider {
    answer: TileAnswer,
    calls: AtomicUsize,
}

impl CountingTileProvider {
    pub fn new(answer: TileAnswer) -> Self {
        Self {
            answer,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn solid(rgba: [u8; 4]) -> Self {
        Self::new(TileAnswer::Solid(rgba))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TileRenderer for CountingTileProvider {
    async fn render_tile(
        &self,
        width: u32,
        height: u32,
        _srs: &str,
        _coord: &Coordinate,
    ) -> Result<RenderOutcome, LayerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(match &self.answer {
            TileAnswer::Solid(rgba) => RenderOutcome::Rendered(Bitmap::raster(
                RgbaImage::from_pixel(width, height, Rgba(*rgba)),
            )),
            TileAnswer::Skip => RenderOutcome::Skipped(None),
            TileAnswer::Redirect(location) => RenderOutcome::Redirect(location.clone()),
        })
    }
}

impl Provider for CountingTileProvider {
    fn name(&self) -> &str {
        "counting-tile"
    }

    fn as_tile_renderer(&self) -> Option<&dyn TileRenderer> {
        Some(self)
    }
}

/// Wrap a provider so tests can keep a handle to it.
pub fn shared<P: Provider + 'static>(provider: P) -> (Arc<P>, Arc<dyn Provider>) {
    let provider = Arc::new(provider);
    let dynamic: Arc<dyn Provider> = provider.clone();
    (provider, dynamic)
}

/// Decode an encoded tile body.
pub fn decode(body: &[u8]) -> RgbaImage {
    image::load_from_memory(body)
        .expect("tile body should decode")
        .to_rgba8()
}

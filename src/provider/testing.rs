//! Minimal providers for unit tests.

use async_trait::async_trait;
use image::{Rgba, RgbaImage};

use crate::bitmap::blend::Color;
use crate::bitmap::Bitmap;
use crate::error::LayerError;
use crate::geo::Coordinate;
use crate::metatile::Envelope;

use super::{AreaRenderer, Provider, RenderOutcome, TileRenderer};

fn fill(color: Color, width: u32, height: u32) -> Bitmap {
    Bitmap::raster(RgbaImage::from_pixel(
        width,
        height,
        Rgba([color.r, color.g, color.b, color.a]),
    ))
}

/// Renders single tiles of one colour.
pub struct SolidProvider {
    color: Color,
}

impl SolidProvider {
    pub fn new(color: Color) -> Self {
        Self { color }
    }
}

#[async_trait]
impl TileRenderer for SolidProvider {
    async fn render_tile(
        &self,
        width: u32,
        height: u32,
        _srs: &str,
        _coord: &Coordinate,
    ) -> Result<RenderOutcome, LayerError> {
        Ok(RenderOutcome::Rendered(fill(self.color, width, height)))
    }
}

impl Provider for SolidProvider {
    fn name(&self) -> &str {
        "solid"
    }

    fn as_tile_renderer(&self) -> Option<&dyn TileRenderer> {
        Some(self)
    }
}

/// Skips every tile.
pub struct SkippingProvider;

#[async_trait]
impl TileRenderer for SkippingProvider {
    async fn render_tile(
        &self,
        _width: u32,
        _height: u32,
        _srs: &str,
        _coord: &Coordinate,
    ) -> Result<RenderOutcome, LayerError> {
        Ok(RenderOutcome::Skipped(None))
    }
}

impl Provider for SkippingProvider {
    fn name(&self) -> &str {
        "skipping"
    }

    fn as_tile_renderer(&self) -> Option<&dyn TileRenderer> {
        Some(self)
    }
}

/// Renders areas in grey and has no single-tile capability.
pub struct AreaOnlyProvider;

#[async_trait]
impl AreaRenderer for AreaOnlyProvider {
    async fn render_area(
        &self,
        width: u32,
        height: u32,
        _srs: &str,
        _envelope: Envelope,
        _zoom: u8,
    ) -> Result<RenderOutcome, LayerError> {
        Ok(RenderOutcome::Rendered(fill(
            Color::new(0x80, 0x80, 0x80, 0xFF),
            width,
            height,
        )))
    }
}

impl Provider for AreaOnlyProvider {
    fn name(&self) -> &str {
        "area"
    }

    fn as_area_renderer(&self) -> Option<&dyn AreaRenderer> {
        Some(self)
    }
}

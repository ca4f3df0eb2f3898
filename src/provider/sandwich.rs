//! Layered compositing of other layers' tiles.
//!
//! A sandwich is a stack of slices drawn bottom to top onto a nearly
//! transparent black background. Each slice draws one of:
//!
//! - `src`: another layer's tile
//! - `color`: a solid colour
//! - `src` + `color`: the tile drawn over the colour
//!
//! optionally through the luminance of a `mask` layer's tile, at some
//! opacity and blend mode. A mask needs something to draw, and cannot be
//! combined with both `src` and `color`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use image::imageops::FilterType;
use image::{DynamicImage, Rgba32FImage};

use crate::bitmap::blend::{blend, BlendMode, Color};
use crate::bitmap::Bitmap;
use crate::error::LayerError;
use crate::geo::Coordinate;

use super::{Provider, RenderOutcome, TileRenderer};

/// Background every sandwich starts from.
const BACKGROUND: Color = Color::new(0, 0, 0, 0x10);

/// A named layer's provider referenced by a slice.
#[derive(Clone)]
struct Source {
    name: String,
    provider: Arc<dyn Provider>,
}

/// One level of a sandwich.
#[derive(Clone)]
pub struct Slice {
    src: Option<Source>,
    mask: Option<Source>,
    color: Option<Color>,
    opacity: f32,
    mode: BlendMode,
}

impl Slice {
    pub fn new() -> Self {
        Self {
            src: None,
            mask: None,
            color: None,
            opacity: 1.0,
            mode: BlendMode::Normal,
        }
    }

    /// Draw the tile of layer `name`.
    pub fn with_src(mut self, name: impl Into<String>, provider: Arc<dyn Provider>) -> Self {
        self.src = Some(Source {
            name: name.into(),
            provider,
        });
        self
    }

    /// Draw through the luminance of layer `name`'s tile.
    pub fn with_mask(mut self, name: impl Into<String>, provider: Arc<dyn Provider>) -> Self {
        self.mask = Some(Source {
            name: name.into(),
            provider,
        });
        self
    }

    pub fn with_color(mut self, color: Color) -> Self {
        self.color = Some(color);
        self
    }

    pub fn with_opacity(mut self, opacity: f32) -> Self {
        self.opacity = opacity;
        self
    }

    pub fn with_mode(mut self, mode: BlendMode) -> Self {
        self.mode = mode;
        self
    }

    fn validate(&self) -> Result<(), LayerError> {
        match (&self.src, &self.color, &self.mask) {
            (Some(src), Some(_), Some(mask)) => Err(LayerError::config(format!(
                "You can't specify src, color and mask together in a Sandwich Layer: \"{}\", \"{}\"",
                src.name, mask.name
            ))),
            (None, None, Some(mask)) => Err(LayerError::config(format!(
                "You have to provide more than just a mask to Sandwich Layer: \"{}\"",
                mask.name
            ))),
            (None, None, None) => Err(LayerError::config(
                "You have to provide at least some combination of src, color and mask to Sandwich Layer",
            )),
            _ => Ok(()),
        }?;

        if !(0.0..=1.0).contains(&self.opacity) {
            return Err(LayerError::config(format!(
                "Sandwich opacity must be between 0 and 1, got {}",
                self.opacity
            )));
        }

        for source in self.src.iter().chain(self.mask.iter()) {
            if source.provider.as_tile_renderer().is_none() {
                return Err(LayerError::config(format!(
                    "Sandwich layer \"{}\" cannot render single tiles",
                    source.name
                )));
            }
        }

        Ok(())
    }
}

impl Default for Slice {
    fn default() -> Self {
        Self::new()
    }
}

/// Tile renderer compositing a stack of [`Slice`]s.
pub struct SandwichProvider {
    name: String,
    stack: Vec<Slice>,
}

impl SandwichProvider {
    /// Build a sandwich, validating every slice.
    pub fn new(name: impl Into<String>, stack: Vec<Slice>) -> Result<Self, LayerError> {
        for slice in &stack {
            slice.validate()?;
        }

        Ok(Self {
            name: name.into(),
            stack,
        })
    }

    /// Names of every layer this sandwich reads from.
    pub fn dependencies(&self) -> Vec<&str> {
        self.stack
            .iter()
            .flat_map(|slice| slice.src.iter().chain(slice.mask.iter()))
            .map(|source| source.name.as_str())
            .collect()
    }
}

/// Render a child layer's tile as float RGBA at exactly `width × height`.
async fn render_source(
    source: &Source,
    width: u32,
    height: u32,
    srs: &str,
    coord: &Coordinate,
) -> Result<Result<Rgba32FImage, RenderOutcome>, LayerError> {
    let renderer = source.provider.as_tile_renderer().ok_or_else(|| {
        LayerError::config(format!(
            "Sandwich layer \"{}\" cannot render single tiles",
            source.name
        ))
    })?;

    let bitmap = match renderer.render_tile(width, height, srs, coord).await? {
        RenderOutcome::Rendered(bitmap) => bitmap,
        other => return Ok(Err(other)),
    };

    let mut image = bitmap.to_image()?;
    if (image.width(), image.height()) != (width, height) {
        image = image.resize_exact(width, height, FilterType::Triangle);
    }

    Ok(Ok(image.to_rgba32f()))
}

#[async_trait]
impl TileRenderer for SandwichProvider {
    async fn render_tile(
        &self,
        width: u32,
        height: u32,
        srs: &str,
        coord: &Coordinate,
    ) -> Result<RenderOutcome, LayerError> {
        let mut rendered = BACKGROUND.solid(width, height);
        let mut tiles: HashMap<&str, Rgba32FImage> = HashMap::new();

        for slice in &self.stack {
            for source in slice.src.iter().chain(slice.mask.iter()) {
                if tiles.contains_key(source.name.as_str()) {
                    continue;
                }
                match render_source(source, width, height, srs, coord).await? {
                    Ok(tile) => {
                        tiles.insert(source.name.as_str(), tile);
                    }
                    // A child that skips or redirects decides for the whole stack
                    Err(outcome) => return Ok(outcome),
                }
            }

            let src = slice.src.as_ref().and_then(|s| tiles.get(s.name.as_str()));
            let mask = slice.mask.as_ref().and_then(|s| tiles.get(s.name.as_str()));

            let foreground = match (src, slice.color) {
                (Some(src), Some(color)) => {
                    blend(&color.solid(width, height), src, None, 1.0, BlendMode::Normal)?
                }
                (Some(src), None) => src.clone(),
                (None, Some(color)) => color.solid(width, height),
                (None, None) => {
                    return Err(LayerError::config(
                        "Sandwich slice has nothing to draw",
                    ))
                }
            };

            rendered = blend(&rendered, &foreground, mask, slice.opacity, slice.mode)?;
        }

        let image = DynamicImage::ImageRgba32F(rendered).to_rgba8();
        Ok(RenderOutcome::Rendered(Bitmap::raster(image)))
    }
}

impl Provider for SandwichProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn as_tile_renderer(&self) -> Option<&dyn TileRenderer> {
        Some(self)
    }
}

//! Tile encoders.
//!
//! Each layer carries its own JPEG and PNG settings, validated when the
//! layer is configured rather than when a tile is encoded.
//!
//! # Limitations
//!
//! - **Progressive JPEG**: accepted and recorded, but the baseline encoder
//!   always writes sequential scans.
//! - **PNG bit depth**: palettes snap colours to the palette, but tiles are
//!   still written as 8-bit RGBA rather than indexed PNG.

use std::io::Cursor;

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{ColorType, DynamicImage, ImageEncoder};

use crate::error::LayerError;

use super::palette::Palette;
use super::TileFormat;

/// Default JPEG quality (1-100).
pub const DEFAULT_JPEG_QUALITY: u8 = 80;

/// Minimum allowed JPEG quality.
pub const MIN_JPEG_QUALITY: u8 = 1;

/// Maximum allowed JPEG quality.
pub const MAX_JPEG_QUALITY: u8 = 100;

// =============================================================================
// Options
// =============================================================================

/// JPEG creation options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JpegOptions {
    /// Output quality, `None` for [`DEFAULT_JPEG_QUALITY`]
    pub quality: Option<u8>,

    /// Spend more time to find smaller Huffman tables
    pub optimize: bool,

    /// Request progressive scans
    pub progressive: bool,
}

impl JpegOptions {
    /// Validate and build JPEG options.
    pub fn new(quality: Option<u8>, optimize: bool, progressive: bool) -> Result<Self, LayerError> {
        if let Some(quality) = quality {
            if !is_valid_quality(quality) {
                return Err(LayerError::config(format!(
                    "JPEG quality must be between {} and {}, got {}",
                    MIN_JPEG_QUALITY, MAX_JPEG_QUALITY, quality
                )));
            }
        }

        Ok(Self {
            quality,
            optimize,
            progressive,
        })
    }

    pub fn quality(&self) -> u8 {
        self.quality.unwrap_or(DEFAULT_JPEG_QUALITY)
    }
}

/// PNG creation options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PngOptions {
    /// Use the slowest, smallest compression settings
    pub optimize: bool,

    /// Bit depth implied by the configured palette
    pub bits: Option<u8>,

    /// Palette index treated as fully transparent
    pub transparency: Option<u8>,
}

impl PngOptions {
    pub fn new(optimize: bool) -> Self {
        Self {
            optimize,
            bits: None,
            transparency: None,
        }
    }

    /// Record the bit depth and transparent index implied by a palette.
    pub fn with_palette(mut self, palette: &Palette) -> Self {
        self.bits = Some(palette.bits());
        self.transparency = palette.transparent();
        self
    }
}

/// Per-layer encoder settings for every supported format.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormatOptions {
    pub jpeg: JpegOptions,
    pub png: PngOptions,
}

impl FormatOptions {
    /// Encode `image` in `format`.
    pub fn encode(&self, image: &DynamicImage, format: TileFormat) -> Result<Bytes, LayerError> {
        let mut output = Cursor::new(Vec::new());

        let result = match format {
            TileFormat::Jpeg => {
                // JPEG carries no alpha channel and only 8-bit samples
                let flattened;
                let image = match image.color() {
                    ColorType::L8 | ColorType::Rgb8 => image,
                    _ => {
                        flattened = DynamicImage::ImageRgb8(image.to_rgb8());
                        &flattened
                    }
                };
                let encoder = JpegEncoder::new_with_quality(&mut output, self.jpeg.quality());
                encoder.write_image(
                    image.as_bytes(),
                    image.width(),
                    image.height(),
                    image.color().into(),
                )
            }
            TileFormat::Png => {
                let widened;
                let image = match image.color() {
                    ColorType::Rgb32F | ColorType::Rgba32F => {
                        widened = DynamicImage::ImageRgba8(image.to_rgba8());
                        &widened
                    }
                    _ => image,
                };
                let encoder = if self.png.optimize {
                    PngEncoder::new_with_quality(
                        &mut output,
                        CompressionType::Best,
                        FilterType::Adaptive,
                    )
                } else {
                    PngEncoder::new(&mut output)
                };
                encoder.write_image(
                    image.as_bytes(),
                    image.width(),
                    image.height(),
                    image.color().into(),
                )
            }
        };

        result.map_err(|e| LayerError::Encode {
            message: e.to_string(),
        })?;

        Ok(Bytes::from(output.into_inner()))
    }
}

// =============================================================================
// Utility Functions
// =============================================================================

/// Validate JPEG quality parameter.
///
/// Returns `true` if quality is in the valid range (1-100).
#[inline]
pub fn is_valid_quality(quality: u8) -> bool {
    (MIN_JPEG_QUALITY..=MAX_JPEG_QUALITY).contains(&quality)
}

/// Clamp quality to valid range.
#[inline]
pub fn clamp_quality(quality: u8) -> u8 {
    quality.clamp(MIN_JPEG_QUALITY, MAX_JPEG_QUALITY)
}

// =============================================================================
// Tests
// =============================================================================

//! Rendered images and their encodings.
//!
//! Providers hand back a [`Bitmap`]: either decoded pixels that can be
//! cropped, palette-converted and encoded, or bytes that are already encoded
//! in a fixed format and can only be passed through.
//!
//! # Components
//!
//! - [`Bitmap`]: provider output
//! - [`TileFormat`] / [`MediaType`]: encodings and extension mapping
//! - [`FormatOptions`]: per-layer JPEG and PNG encoder settings
//! - [`Palette`]: Adobe colour tables for palette-snapped PNG output
//! - [`blend`]: RGBA compositing used by layered providers

pub mod blend;
mod encoder;
mod palette;

pub use encoder::{
    clamp_quality, is_valid_quality, FormatOptions, JpegOptions, PngOptions, DEFAULT_JPEG_QUALITY,
    MAX_JPEG_QUALITY, MIN_JPEG_QUALITY,
};
pub use palette::Palette;

use std::fmt;

use bytes::Bytes;
use image::{DynamicImage, GenericImageView};

use crate::error::LayerError;

// =============================================================================
// Formats
// =============================================================================

/// Image encodings a tile can be stored in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TileFormat {
    Png,
    Jpeg,
}

impl TileFormat {
    /// Upper-case format name, e.g. `"PNG"`.
    pub fn name(&self) -> &'static str {
        match self {
            TileFormat::Png => "PNG",
            TileFormat::Jpeg => "JPEG",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            TileFormat::Png => "image/png",
            TileFormat::Jpeg => "image/jpeg",
        }
    }

    /// Conventional file extension, without the dot.
    pub fn extension(&self) -> &'static str {
        match self {
            TileFormat::Png => "png",
            TileFormat::Jpeg => "jpg",
        }
    }
}

impl fmt::Display for TileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Response type for a requested extension.
///
/// `format` is `None` for non-image responses such as tile metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaType {
    pub mime_type: &'static str,
    pub format: Option<TileFormat>,
}

impl MediaType {
    pub const PNG: MediaType = MediaType {
        mime_type: "image/png",
        format: Some(TileFormat::Png),
    };

    pub const JPEG: MediaType = MediaType {
        mime_type: "image/jpeg",
        format: Some(TileFormat::Jpeg),
    };

    /// Plain-text metadata, never encoded as an image.
    pub const META: MediaType = MediaType {
        mime_type: "text/plain",
        format: None,
    };
}

/// Default extension mapping: `png` and `jpg`, case-insensitive.
pub fn media_type_for_extension(extension: &str) -> Result<MediaType, LayerError> {
    match extension.to_ascii_lowercase().as_str() {
        "png" => Ok(MediaType::PNG),
        "jpg" => Ok(MediaType::JPEG),
        _ => Err(LayerError::UnknownExtension(extension.to_string())),
    }
}

// =============================================================================
// Bitmap
// =============================================================================

/// An image returned by a provider.
#[derive(Debug, Clone)]
pub enum Bitmap {
    /// Decoded pixels.
    Raster(DynamicImage),

    /// Bytes already encoded by the store they came from. `format` is the
    /// stored encoding, or `None` when the store does not declare one.
    Encoded {
        format: Option<TileFormat>,
        content: Bytes,
    },
}

impl Bitmap {
    pub fn raster(image: impl Into<DynamicImage>) -> Self {
        Bitmap::Raster(image.into())
    }

    pub fn encoded(format: Option<TileFormat>, content: impl Into<Bytes>) -> Self {
        Bitmap::Encoded {
            format,
            content: content.into(),
        }
    }

    /// Pixel `(width, height)`, if known without decoding.
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        match self {
            Bitmap::Raster(image) => Some(image.dimensions()),
            Bitmap::Encoded { .. } => None,
        }
    }

    /// Pixel height, if known without decoding.
    pub fn height(&self) -> Option<u32> {
        self.dimensions().map(|(_, height)| height)
    }

    /// True if [`Bitmap::crop`] is supported.
    pub fn can_crop(&self) -> bool {
        matches!(self, Bitmap::Raster(_))
    }

    /// Cut out a `width × height` region whose upper-left corner is `(x, y)`.
    pub fn crop(&self, x: u32, y: u32, width: u32, height: u32) -> Result<Bitmap, LayerError> {
        match self {
            Bitmap::Raster(image) => Ok(Bitmap::Raster(image.crop_imm(x, y, width, height))),
            Bitmap::Encoded { .. } => Err(LayerError::config(
                "Pre-encoded tiles cannot be cropped; provider must return an image-like object",
            )),
        }
    }

    /// Encode in `format` using the layer's encoder options.
    ///
    /// Pre-encoded bytes are returned untouched when their format matches,
    /// and rejected otherwise: they are never transcoded.
    pub fn encode(&self, format: TileFormat, options: &FormatOptions) -> Result<Bytes, LayerError> {
        match self {
            Bitmap::Raster(image) => options.encode(image, format),
            Bitmap::Encoded {
                format: stored,
                content,
            } => match stored {
                Some(stored) if *stored != format => Err(LayerError::FormatMismatch {
                    requested: format,
                    stored: *stored,
                }),
                _ => Ok(content.clone()),
            },
        }
    }

    /// Snap every pixel to the nearest palette colour.
    pub fn apply_palette(
        self,
        palette: &Palette,
        transparent: Option<u8>,
    ) -> Result<Bitmap, LayerError> {
        match self {
            Bitmap::Raster(image) => Ok(Bitmap::raster(palette.apply(&image, transparent))),
            Bitmap::Encoded { .. } => Err(LayerError::config(
                "Cannot apply a palette to pre-encoded tiles",
            )),
        }
    }

    /// Decoded pixels, decoding stored bytes if necessary.
    pub fn to_image(&self) -> Result<DynamicImage, LayerError> {
        match self {
            Bitmap::Raster(image) => Ok(image.clone()),
            Bitmap::Encoded { content, .. } => {
                image::load_from_memory(content).map_err(|e| LayerError::Decode {
                    message: e.to_string(),
                })
            }
        }
    }
}

impl From<DynamicImage> for Bitmap {
    fn from(image: DynamicImage) -> Self {
        Bitmap::Raster(image)
    }
}

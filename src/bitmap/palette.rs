use std::collections::HashMap;
use std::path::Path;

use image::{DynamicImage, Rgba, RgbaImage};

use crate::error::LayerError;

/// Size of the colour table in an Adobe `.act` file.
const ACT_TABLE_SIZE: usize = 256 * 3;

/// Colour written into the transparent slot so it is easy to spot.
const TRANSPARENT_MARKER: [u8; 3] = [0xFF, 0x99, 0x00];

/// Alpha below which a pixel is mapped to the transparent index.
const TRANSPARENT_ALPHA: u8 = 0x80;

/// An indexed colour palette.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Palette {
    colors: Vec<[u8; 3]>,
    transparent: Option<u8>,
    bits: u8,
}

impl Palette {
    /// Parse an Adobe colour table.
    ///
    /// The file holds 256 RGB triplets, optionally followed by a big-endian
    /// colour count and transparent index (values above 255 mean none).
    pub fn from_act(bytes: &[u8]) -> Result<Self, LayerError> {
        if bytes.len() < ACT_TABLE_SIZE {
            return Err(LayerError::config(format!(
                "Palette must be at least {} bytes, got {}",
                ACT_TABLE_SIZE,
                bytes.len()
            )));
        }

        let (count, transparent) = if bytes.len() >= ACT_TABLE_SIZE + 4 {
            let trailer = &bytes[ACT_TABLE_SIZE..ACT_TABLE_SIZE + 4];
            let count = u16::from_be_bytes([trailer[0], trailer[1]]) as usize;
            let index = u16::from_be_bytes([trailer[2], trailer[3]]);
            (count, u8::try_from(index).ok())
        } else {
            (256, None)
        };

        if count == 0 || count > 256 {
            return Err(LayerError::config(format!(
                "Palette color count must be between 1 and 256, got {}",
                count
            )));
        }

        let colors = (0..count)
            .map(|i| {
                if transparent == Some(i as u8) {
                    TRANSPARENT_MARKER
                } else {
                    [bytes[i * 3], bytes[i * 3 + 1], bytes[i * 3 + 2]]
                }
            })
            .collect::<Vec<_>>();

        Ok(Self {
            bits: bits_for(count),
            colors,
            transparent,
        })
    }

    /// Read an Adobe colour table from disk.
    pub async fn load(path: &Path) -> Result<Self, LayerError> {
        let bytes = tokio::fs::read(path).await.map_err(|e| {
            LayerError::config(format!("Failed to read palette {}: {}", path.display(), e))
        })?;
        Self::from_act(&bytes)
    }

    pub fn colors(&self) -> &[[u8; 3]] {
        &self.colors
    }

    /// Index of the transparent colour, if the table declares one.
    pub fn transparent(&self) -> Option<u8> {
        self.transparent
    }

    /// Bits per pixel needed to address every colour.
    pub fn bits(&self) -> u8 {
        self.bits
    }

    /// Snap every pixel of `image` to its nearest palette colour.
    ///
    /// When `transparent` is set, mostly-transparent pixels map to that index
    /// and come out fully transparent; that index is never chosen for opaque
    /// pixels.
    pub fn apply(&self, image: &DynamicImage, transparent: Option<u8>) -> RgbaImage {
        let mut output = image.to_rgba8();
        let mut nearest_cache: HashMap<[u8; 3], usize> = HashMap::new();

        for pixel in output.pixels_mut() {
            let [r, g, b, a] = pixel.0;

            if let Some(index) = transparent {
                if a < TRANSPARENT_ALPHA {
                    let [tr, tg, tb] = self.color_at(index);
                    *pixel = Rgba([tr, tg, tb, 0]);
                    continue;
                }
            }

            let index = *nearest_cache
                .entry([r, g, b])
                .or_insert_with(|| self.nearest([r, g, b], transparent));
            let [nr, ng, nb] = self.colors[index];
            *pixel = Rgba([nr, ng, nb, 255]);
        }

        output
    }

    fn color_at(&self, index: u8) -> [u8; 3] {
        self.colors
            .get(index as usize)
            .copied()
            .unwrap_or(TRANSPARENT_MARKER)
    }

    fn nearest(&self, rgb: [u8; 3], skip: Option<u8>) -> usize {
        let distance = |c: &[u8; 3]| -> u32 {
            (0..3)
                .map(|i| {
                    let d = i32::from(c[i]) - i32::from(rgb[i]);
                    (d * d) as u32
                })
                .sum()
        };

        self.colors
            .iter()
            .enumerate()
            .filter(|(i, _)| skip != Some(*i as u8))
            .min_by_key(|(_, c)| distance(c))
            .map(|(i, _)| i)
            .unwrap_or(0)
    }
}

/// `ceil(log2(count))`, at least one bit.
fn bits_for(count: usize) -> u8 {
    let bits = usize::BITS - (count.saturating_sub(1)).leading_zeros();
    bits.max(1) as u8
}

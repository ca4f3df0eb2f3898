//! Floating-point RGBA compositing.
//!
//! Images are blended as `f32` channels in `0.0..=1.0`. The top image's alpha,
//! optionally scaled by the luminance of a mask image and by an opacity,
//! decides how much of the blended colour replaces the bottom image:
//!
//! ```text
//!   mask   = top.a * luminance(mask) * opacity
//!   colour = mode(bottom.rgb, top.rgb)
//!   ratio  = mask / (1 - (1 - mask) * (1 - bottom.a))
//!   out    = colour * ratio + bottom.rgb * (1 - ratio)
//!   out.a  = screen(bottom.a, mask)
//! ```

use std::str::FromStr;

use image::{Rgba, Rgba32FImage};

use crate::error::LayerError;

/// How the top colour combines with the bottom colour before masking.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BlendMode {
    /// Plain paste of the top colour.
    #[default]
    Normal,
    Screen,
    Multiply,
    LinearLight,
    HardLight,
}

impl BlendMode {
    fn apply(&self, bottom: f32, top: f32) -> f32 {
        match self {
            BlendMode::Normal => top,
            BlendMode::Screen => screen(bottom, top),
            BlendMode::Multiply => bottom * top,
            BlendMode::LinearLight => (bottom + 2.0 * top - 1.0).clamp(0.0, 1.0),
            BlendMode::HardLight => {
                if top < 0.5 {
                    2.0 * bottom * top
                } else {
                    1.0 - 2.0 * (1.0 - bottom) * (1.0 - top)
                }
            }
        }
    }
}

impl FromStr for BlendMode {
    type Err = LayerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "normal" => Ok(BlendMode::Normal),
            "screen" => Ok(BlendMode::Screen),
            "multiply" => Ok(BlendMode::Multiply),
            "linear light" => Ok(BlendMode::LinearLight),
            "hard light" => Ok(BlendMode::HardLight),
            other => Err(LayerError::config(format!(
                "Unrecognized blend mode: \"{}\"",
                other
            ))),
        }
    }
}

fn screen(bottom: f32, top: f32) -> f32 {
    1.0 - (1.0 - bottom) * (1.0 - top)
}

fn luminance(pixel: &Rgba<f32>) -> f32 {
    0.299 * pixel[0] + 0.587 * pixel[1] + 0.114 * pixel[2]
}

// =============================================================================
// Colors
// =============================================================================

/// An 8-bit RGBA colour, parsed from HTML notation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// A `width × height` image filled with this colour.
    pub fn solid(&self, width: u32, height: u32) -> Rgba32FImage {
        let pixel = Rgba([
            f32::from(self.r) / 255.0,
            f32::from(self.g) / 255.0,
            f32::from(self.b) / 255.0,
            f32::from(self.a) / 255.0,
        ]);
        Rgba32FImage::from_pixel(width, height, pixel)
    }
}

impl FromStr for Color {
    type Err = LayerError;

    /// Parse `#rgb`, `#rgba`, `#rrggbb` or `#rrggbbaa`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex = s
            .strip_prefix('#')
            .ok_or_else(|| LayerError::config(format!("Color must start with hash: \"{}\"", s)))?;

        if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(LayerError::config(format!(
                "Color must be made up of valid hex chars: \"{}\"",
                s
            )));
        }

        let expanded: String = match hex.len() {
            3 | 4 => hex.chars().flat_map(|c| [c, c]).collect(),
            6 | 8 => hex.to_string(),
            _ => {
                return Err(LayerError::config(format!(
                    "Color must have three, four, six or eight hex chars: \"{}\"",
                    s
                )))
            }
        };

        let channel = |i: usize| {
            u8::from_str_radix(&expanded[i..i + 2], 16).map_err(|_| {
                LayerError::config(format!("Color must be made up of valid hex chars: \"{}\"", s))
            })
        };

        Ok(Color {
            r: channel(0)?,
            g: channel(2)?,
            b: channel(4)?,
            a: if expanded.len() == 8 { channel(6)? } else { 0xFF },
        })
    }
}

// =============================================================================
// Blending
// =============================================================================

/// Draw `top` over `bottom`.
///
/// `mask`, when given, scales the top alpha by its luminance. All images must
/// share the same dimensions.
pub fn blend(
    bottom: &Rgba32FImage,
    top: &Rgba32FImage,
    mask: Option<&Rgba32FImage>,
    opacity: f32,
    mode: BlendMode,
) -> Result<Rgba32FImage, LayerError> {
    let size = bottom.dimensions();
    if top.dimensions() != size || mask.is_some_and(|m| m.dimensions() != size) {
        return Err(LayerError::config(format!(
            "Cannot blend images of different sizes onto {}x{}",
            size.0, size.1
        )));
    }

    let mask_at = |x: u32, y: u32| -> f32 {
        let alpha = top.get_pixel(x, y)[3];
        match mask {
            Some(mask) => alpha * luminance(mask.get_pixel(x, y)),
            None => alpha,
        }
    };

    let empty_mask = (0..size.1).all(|y| (0..size.0).all(|x| mask_at(x, y) == 0.0));
    if opacity == 0.0 || empty_mask {
        return Ok(bottom.clone());
    }

    let mut output = Rgba32FImage::new(size.0, size.1);
    for (x, y, out) in output.enumerate_pixels_mut() {
        let below = bottom.get_pixel(x, y);
        let above = top.get_pixel(x, y);
        let m = mask_at(x, y) * opacity;

        let denom = 1.0 - (1.0 - m) * (1.0 - below[3]);
        for c in 0..3 {
            let colour = mode.apply(below[c], above[c]);
            out[c] = if denom > 0.0 {
                let ratio = m / denom;
                colour * ratio + below[c] * (1.0 - ratio)
            } else {
                0.0
            };
        }
        out[3] = screen(below[3], m);
    }

    Ok(output)
}

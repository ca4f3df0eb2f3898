//! Metatiles: blocks of adjacent tiles rendered together as one image.
//!
//! A metatile of `rows × columns` tiles, optionally surrounded by a pixel
//! buffer, is rendered with a single provider call and then sliced back into
//! its individual tiles. The buffer gives providers room to draw labels and
//! icons that straddle tile edges without clipping them.
//!
//! ```text
//!   ┌───────────────────────────────┐
//!   │ buffer                        │
//!   │   ┌───────┬───────┬───────┐   │
//!   │   │ (r,c) │(r,c+1)│(r,c+2)│   │
//!   │   ├───────┼───────┼───────┤   │
//!   │   │(r+1,c)│  ...  │       │   │
//!   │   └───────┴───────┴───────┘   │
//!   └───────────────────────────────┘
//! ```
//!
//! - [`Metatile`]: the configured shape and the coordinate set it covers
//! - [`MetatileGeometry`]: envelopes, render size and sub-tile offsets

mod geometry;

pub use geometry::{Envelope, MetatileGeometry, Subtile};

use crate::error::LayerError;
use crate::geo::Coordinate;

/// Shape of a metatile, fixed for the lifetime of a layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Metatile {
    rows: u32,
    columns: u32,
    buffer: u32,
}

impl Metatile {
    /// Create a metatile of `rows × columns` tiles with `buffer` pixels
    /// around the edge.
    pub fn new(rows: u32, columns: u32, buffer: u32) -> Result<Self, LayerError> {
        if rows < 1 || columns < 1 {
            return Err(LayerError::config(format!(
                "Metatile must cover at least one tile, got {} rows and {} columns",
                rows, columns
            )));
        }

        Ok(Self {
            rows,
            columns,
            buffer,
        })
    }

    /// A single unbuffered tile.
    pub const fn single() -> Self {
        Self {
            rows: 1,
            columns: 1,
            buffer: 0,
        }
    }

    pub fn rows(&self) -> u32 {
        self.rows
    }

    pub fn columns(&self) -> u32 {
        self.columns
    }

    pub fn buffer(&self) -> u32 {
        self.buffer
    }

    /// True if this is really a metatile with a buffer or multiple tiles.
    pub fn is_real(&self) -> bool {
        self.buffer > 0 || self.rows > 1 || self.columns > 1
    }

    /// All coordinates of the metatile containing `coord`.
    ///
    /// Ordered left-to-right within a row, rows top-to-bottom, so the first
    /// entry is always the upper-left tile.
    pub fn all_coords(&self, coord: &Coordinate) -> Vec<Coordinate> {
        let row = self.rows * (coord.row / self.rows);
        let column = self.columns * (coord.column / self.columns);

        let mut coords = Vec::with_capacity((self.rows * self.columns) as usize);
        for r in 0..self.rows {
            for c in 0..self.columns {
                coords.push(Coordinate::new(
                    coord.zoom,
                    row.saturating_add(r),
                    column.saturating_add(c),
                ));
            }
        }
        coords
    }

    /// The upper-left coordinate of the metatile containing `coord`.
    ///
    /// Every tile in the same metatile maps to the same value, which makes it
    /// usable as a lock key for the whole block.
    pub fn first_coord(&self, coord: &Coordinate) -> Coordinate {
        Coordinate::new(
            coord.zoom,
            self.rows * (coord.row / self.rows),
            self.columns * (coord.column / self.columns),
        )
    }
}

impl Default for Metatile {
    fn default() -> Self {
        Self::single()
    }
}

use crate::error::LayerError;

use super::coordinate::Coordinate;
use super::projection::{Location, Projection};

/// Zoom range and geographic box outside of which a layer renders nothing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    low: u8,
    high: u8,
    north: f64,
    west: f64,
    south: f64,
    east: f64,
}

impl Bounds {
    /// Create bounds, rejecting inverted ranges.
    pub fn new(
        low: u8,
        high: u8,
        north: f64,
        west: f64,
        south: f64,
        east: f64,
    ) -> Result<Self, LayerError> {
        if low > high {
            return Err(LayerError::config(format!(
                "Bounds zoom range is inverted: low {} > high {}",
                low, high
            )));
        }
        if south > north {
            return Err(LayerError::config(format!(
                "Bounds latitude range is inverted: south {} > north {}",
                south, north
            )));
        }
        if west > east {
            return Err(LayerError::config(format!(
                "Bounds longitude range is inverted: west {} > east {}",
                west, east
            )));
        }

        Ok(Self {
            low,
            high,
            north,
            west,
            south,
            east,
        })
    }

    /// Bounds covering every location between two zoom levels.
    pub fn zoom_range(low: u8, high: u8) -> Result<Self, LayerError> {
        Self::new(low, high, 90.0, -180.0, -90.0, 180.0)
    }

    pub fn low(&self) -> u8 {
        self.low
    }

    pub fn high(&self) -> u8 {
        self.high
    }

    /// True when `coord` is outside the zoom range or does not intersect
    /// the geographic box.
    pub fn excludes(&self, coord: &Coordinate, projection: &dyn Projection) -> bool {
        if coord.zoom < self.low || coord.zoom > self.high {
            return true;
        }

        let top_left = projection.location_coordinate(
            Location {
                lat: self.north,
                lon: self.west,
            },
            coord.zoom,
        );
        let bottom_right = projection.location_coordinate(
            Location {
                lat: self.south,
                lon: self.east,
            },
            coord.zoom,
        );

        let row = coord.row as f64;
        let column = coord.column as f64;

        // Tiles that only touch the box edge are kept
        row > bottom_right.row
            || column > bottom_right.column
            || row + 1.0 < top_left.row
            || column + 1.0 < top_left.column
    }
}

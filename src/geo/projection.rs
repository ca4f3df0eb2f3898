use std::f64::consts::PI;
use std::fmt::Debug;

use super::coordinate::FractionalCoordinate;

/// Proj.4 definition of spherical mercator, handed opaquely to providers.
pub const SPHERICAL_MERCATOR_SRS: &str = "+proj=merc +a=6378137 +b=6378137 +lat_ts=0.0 +lon_0=0.0 +x_0=0.0 +y_0=0 +k=1.0 +units=m +nadgrids=@null +no_defs";

/// Earth radius used by spherical mercator, in meters.
const EARTH_RADIUS: f64 = 6_378_137.0;

/// A point in projected map units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

/// A geographic location in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Location {
    pub lat: f64,
    pub lon: f64,
}

/// Conversion between the tile grid and a projected coordinate system.
pub trait Projection: Send + Sync + Debug {
    /// Spatial reference identifier passed through to providers.
    fn srs(&self) -> &str;

    /// Project a grid position into map units.
    fn coordinate_proj(&self, coord: FractionalCoordinate) -> Point;

    /// Position of a geographic location on the tile grid at `zoom`.
    fn location_coordinate(&self, location: Location, zoom: u8) -> FractionalCoordinate;
}

/// Web mercator in meters, the projection used by nearly all web maps.
#[derive(Debug, Clone, Copy, Default)]
pub struct SphericalMercator;

impl SphericalMercator {
    pub fn new() -> Self {
        Self
    }
}

impl Projection for SphericalMercator {
    fn srs(&self) -> &str {
        SPHERICAL_MERCATOR_SRS
    }

    fn coordinate_proj(&self, coord: FractionalCoordinate) -> Point {
        let circumference = 2.0 * PI * EARTH_RADIUS;
        let tiles = 2f64.powi(i32::from(coord.zoom));

        Point {
            x: coord.column / tiles * circumference - circumference / 2.0,
            y: circumference / 2.0 - coord.row / tiles * circumference,
        }
    }

    fn location_coordinate(&self, location: Location, zoom: u8) -> FractionalCoordinate {
        let tiles = 2f64.powi(i32::from(zoom));
        let lat_rad = location.lat.to_radians();

        FractionalCoordinate {
            zoom,
            row: (1.0 - lat_rad.tan().asinh() / PI) / 2.0 * tiles,
            column: (location.lon + 180.0) / 360.0 * tiles,
        }
    }
}

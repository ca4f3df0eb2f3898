use crate::geo::{Coordinate, FractionalCoordinate, Point, Projection};

use super::Metatile;

/// Axis-aligned box in projected map units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Envelope {
    pub xmin: f64,
    pub ymin: f64,
    pub xmax: f64,
    pub ymax: f64,
}

impl Envelope {
    /// Smallest envelope containing both points.
    pub fn from_corners(a: Point, b: Point) -> Self {
        Self {
            xmin: a.x.min(b.x),
            ymin: a.y.min(b.y),
            xmax: a.x.max(b.x),
            ymax: a.y.max(b.y),
        }
    }

    pub fn width(&self) -> f64 {
        self.xmax - self.xmin
    }

    pub fn height(&self) -> f64 {
        self.ymax - self.ymin
    }
}

/// One tile of a metatile and its pixel offset inside the combined render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subtile {
    pub coord: Coordinate,
    pub x: u32,
    pub y: u32,
}

/// Pixel and projected-space geometry of a metatile.
///
/// Pure computation over the metatile shape, the tile size in pixels and the
/// layer's projection.
#[derive(Debug, Clone, Copy)]
pub struct MetatileGeometry<'a> {
    metatile: Metatile,
    tile_dim: u32,
    projection: &'a dyn Projection,
}

impl<'a> MetatileGeometry<'a> {
    pub fn new(metatile: Metatile, tile_dim: u32, projection: &'a dyn Projection) -> Self {
        Self {
            metatile,
            tile_dim,
            projection,
        }
    }

    /// Buffer expressed as a fraction of the tile size.
    fn buffer_fraction(&self) -> f64 {
        f64::from(self.metatile.buffer()) / f64::from(self.tile_dim)
    }

    fn project(&self, coord: FractionalCoordinate) -> Point {
        self.projection.coordinate_proj(coord)
    }

    /// Projected envelope of a single unbuffered tile.
    pub fn envelope(&self, coord: &Coordinate) -> Envelope {
        let ul = self.project(coord.to_fractional());
        let lr = self.project(coord.to_fractional().down(1.0).right(1.0));
        Envelope::from_corners(ul, lr)
    }

    /// Projected envelope of the whole metatile containing `coord`,
    /// expanded by the buffer on every side.
    pub fn meta_envelope(&self, coord: &Coordinate) -> Envelope {
        let buffer = self.buffer_fraction();
        let coords = self.metatile.all_coords(coord);

        let first = coords[0];
        let last = coords[coords.len() - 1];

        let ul = first.left(buffer).up(buffer);
        let lr = last.to_fractional().right(1.0 + buffer).down(1.0 + buffer);

        Envelope::from_corners(self.project(ul), self.project(lr))
    }

    /// Pixel `(width, height)` of the full metatile render.
    pub fn meta_size(&self) -> (u32, u32) {
        let buffer = self.buffer_fraction();
        let dim = f64::from(self.tile_dim);

        let width = dim * (buffer * 2.0 + f64::from(self.metatile.columns()));
        let height = dim * (buffer * 2.0 + f64::from(self.metatile.rows()));

        (width as u32, height as u32)
    }

    /// Every tile of the metatile with its offset in the combined render.
    pub fn meta_subtiles(&self, coord: &Coordinate) -> Vec<Subtile> {
        let coords = self.metatile.all_coords(coord);
        let origin = coords[0];
        let buffer = self.metatile.buffer();

        coords
            .into_iter()
            .map(|other| Subtile {
                coord: other,
                x: (other.column - origin.column) * self.tile_dim + buffer,
                y: (other.row - origin.row) * self.tile_dim + buffer,
            })
            .collect()
    }
}

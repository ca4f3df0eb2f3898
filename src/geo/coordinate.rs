use std::fmt;

/// Address of a single tile.
///
/// Rows grow downward and columns grow to the right, both starting at zero
/// in the upper-left corner of the tile grid at `zoom`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Coordinate {
    pub zoom: u8,
    pub row: u32,
    pub column: u32,
}

impl Coordinate {
    pub const fn new(zoom: u8, row: u32, column: u32) -> Self {
        Self { zoom, row, column }
    }

    /// The tile directly below this one. Saturates at `u32::MAX`.
    pub const fn down(&self) -> Self {
        Self::new(self.zoom, self.row.saturating_add(1), self.column)
    }

    /// The tile directly to the right of this one. Saturates at `u32::MAX`.
    pub const fn right(&self) -> Self {
        Self::new(self.zoom, self.row, self.column.saturating_add(1))
    }

    /// True if row and column both lie in the `2^zoom` square grid.
    pub fn in_grid(&self) -> bool {
        let size = 1u64 << u32::from(self.zoom).min(32);
        u64::from(self.row) < size && u64::from(self.column) < size
    }

    /// Shift upward by a fraction of a tile.
    pub fn up(&self, distance: f64) -> FractionalCoordinate {
        self.to_fractional().up(distance)
    }

    /// Shift left by a fraction of a tile.
    pub fn left(&self, distance: f64) -> FractionalCoordinate {
        self.to_fractional().left(distance)
    }

    pub fn to_fractional(&self) -> FractionalCoordinate {
        FractionalCoordinate {
            zoom: self.zoom,
            row: self.row as f64,
            column: self.column as f64,
        }
    }
}

impl fmt::Display for Coordinate {
    /// Formats as `zoom/column/row`, the order used in tile URLs.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.zoom, self.column, self.row)
    }
}

/// A position on the tile grid that need not fall on a tile corner.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FractionalCoordinate {
    pub zoom: u8,
    pub row: f64,
    pub column: f64,
}

impl FractionalCoordinate {
    pub fn up(self, distance: f64) -> Self {
        Self {
            row: self.row - distance,
            ..self
        }
    }

    pub fn down(self, distance: f64) -> Self {
        Self {
            row: self.row + distance,
            ..self
        }
    }

    pub fn left(self, distance: f64) -> Self {
        Self {
            column: self.column - distance,
            ..self
        }
    }

    pub fn right(self, distance: f64) -> Self {
        Self {
            column: self.column + distance,
            ..self
        }
    }

    /// Rescale this position onto the grid of another zoom level.
    pub fn zoom_to(self, zoom: u8) -> Self {
        let scale = 2f64.powi(i32::from(zoom) - i32::from(self.zoom));
        Self {
            zoom,
            row: self.row * scale,
            column: self.column * scale,
        }
    }
}

impl From<Coordinate> for FractionalCoordinate {
    fn from(coord: Coordinate) -> Self {
        coord.to_fractional()
    }
}

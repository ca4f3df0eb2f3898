//! Tile addressing and geographic primitives.
//!
//! - [`Coordinate`]: immutable `(zoom, row, column)` tile address
//! - [`FractionalCoordinate`]: sub-tile positions used for buffer math
//! - [`Projection`]: maps coordinates to projected points and back
//! - [`Bounds`]: zoom range plus geographic box limiting a layer

mod bounds;
mod coordinate;
mod projection;

pub use bounds::Bounds;
pub use coordinate::{Coordinate, FractionalCoordinate};
pub use projection::{Location, Point, Projection, SphericalMercator, SPHERICAL_MERCATOR_SRS};

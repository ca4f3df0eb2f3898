//! Tile providers.
//!
//! A provider produces the pixels (or stored bytes) for a layer. Each one
//! declares which rendering capabilities it has through [`Provider`]:
//!
//! ```text
//!   Provider
//!     ├── as_area_renderer()    → render a projected envelope at any size
//!     ├── as_tile_renderer()    → render exactly one tile
//!     ├── as_metadata_source()  → describe a stored tile
//!     └── type_by_extension()   → map "png" / "jpg" / ... to a media type
//! ```
//!
//! A layer prefers area rendering whenever it is configured with a metatile,
//! since only area renderers can draw the buffered multi-tile image.
//!
//! # Providers
//!
//! - [`StoreProvider`]: serves pre-rendered tiles from a [`TileStore`]
//!   ([`PostgresStore`], [`MemoryStore`])
//! - [`SandwichProvider`]: composites other layers' tiles with colours,
//!   masks and blend modes

mod memory;
mod postgres;
mod sandwich;
mod store;

#[cfg(test)]
pub(crate) mod testing;

pub use memory::MemoryStore;
pub use postgres::{ConnectParams, PostgresStore};
pub use sandwich::{SandwichProvider, Slice};
pub use store::{flip_row, StoreProvider, TileStore};

use async_trait::async_trait;
use serde::Serialize;

use crate::bitmap::{media_type_for_extension, Bitmap, MediaType};
use crate::error::LayerError;
use crate::geo::Coordinate;
use crate::metatile::Envelope;

// =============================================================================
// Outcomes
// =============================================================================

/// What a provider (or a layer) produced for a request.
#[derive(Debug, Clone)]
pub enum RenderOutcome {
    /// An image covering the requested area.
    Rendered(Bitmap),

    /// Nothing should be cached for this request; an optional placeholder
    /// may be shown instead.
    Skipped(Option<Bitmap>),

    /// The tile lives elsewhere.
    Redirect(String),
}

impl RenderOutcome {
    pub fn is_rendered(&self) -> bool {
        matches!(self, RenderOutcome::Rendered(_))
    }
}

/// Per-tile metadata served for `.meta` requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TileMetadata {
    /// Store-defined modification timestamp
    pub updated_at: Option<i64>,
    pub zoom: u8,
    pub x: u32,
    /// Row as stored, after any flipping
    pub y: u32,
}

// =============================================================================
// Capabilities
// =============================================================================

/// Renders an arbitrary projected area.
#[async_trait]
pub trait AreaRenderer: Send + Sync {
    async fn render_area(
        &self,
        width: u32,
        height: u32,
        srs: &str,
        envelope: Envelope,
        zoom: u8,
    ) -> Result<RenderOutcome, LayerError>;
}

/// Renders a single tile.
#[async_trait]
pub trait TileRenderer: Send + Sync {
    async fn render_tile(
        &self,
        width: u32,
        height: u32,
        srs: &str,
        coord: &Coordinate,
    ) -> Result<RenderOutcome, LayerError>;
}

/// Describes stored tiles.
#[async_trait]
pub trait MetadataSource: Send + Sync {
    async fn tile_metadata(&self, coord: &Coordinate) -> Result<TileMetadata, LayerError>;
}

/// A source of tiles for a layer.
///
/// Implementations override the accessors for the capabilities they have.
/// A provider with neither renderer cannot serve a layer.
pub trait Provider: Send + Sync {
    /// Short name used in logs and configuration.
    fn name(&self) -> &str;

    fn as_area_renderer(&self) -> Option<&dyn AreaRenderer> {
        None
    }

    fn as_tile_renderer(&self) -> Option<&dyn TileRenderer> {
        None
    }

    fn as_metadata_source(&self) -> Option<&dyn MetadataSource> {
        None
    }

    /// Media type for a request extension.
    fn type_by_extension(&self, extension: &str) -> Result<MediaType, LayerError> {
        media_type_for_extension(extension)
    }
}

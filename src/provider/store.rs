//! Providers backed by pre-rendered tile stores.
//!
//! Stores follow the MBTiles layout: tiles keyed by zoom level, column,
//! row and scale, with rows numbered from the bottom of the map. Requests
//! use top-origin rows, so rows are flipped with `2^zoom - 1 - row` unless
//! flipping is turned off.
//!
//! The stored tile format is read once when the provider is created. Tiles
//! are returned exactly as stored; asking for a different format is an
//! error rather than a conversion.

use async_trait::async_trait;
use bytes::Bytes;

use crate::bitmap::{media_type_for_extension, Bitmap, MediaType, TileFormat};
use crate::error::LayerError;
use crate::geo::Coordinate;

use super::{MetadataSource, Provider, RenderOutcome, TileMetadata, TileRenderer};

/// Tile scale read from stores.
const TILE_SCALE: u32 = 1;

/// Access to a tileset of pre-rendered tiles.
#[async_trait]
pub trait TileStore: Send + Sync {
    /// Format tag recorded in the tileset metadata (`"png"`, `"jpg"`), if any.
    async fn format(&self) -> Result<Option<String>, LayerError>;

    /// Stored bytes for a tile, or `None` if the tileset has no such tile.
    async fn tile(
        &self,
        zoom: u8,
        column: u32,
        row: u32,
        scale: u32,
    ) -> Result<Option<Bytes>, LayerError>;

    /// Modification timestamp of a tile, if recorded.
    async fn updated_at(&self, zoom: u8, column: u32, row: u32)
        -> Result<Option<i64>, LayerError>;
}

/// Convert between top-origin and bottom-origin row numbering.
///
/// Returns `None` for rows below the last row of the grid at `zoom`.
pub fn flip_row(zoom: u8, row: u32) -> Option<u32> {
    let last = (1u64 << u32::from(zoom).min(32)) - 1;
    last.checked_sub(u64::from(row)).map(|flipped| flipped as u32)
}

/// Serves tiles straight out of a [`TileStore`].
pub struct StoreProvider<S> {
    name: String,
    store: S,
    format: Option<TileFormat>,
    flip_y: bool,
}

impl<S: TileStore> StoreProvider<S> {
    /// Wrap `store`, resolving its tile format.
    pub async fn new(name: impl Into<String>, store: S) -> Result<Self, LayerError> {
        let tag = store.format().await?;

        let format = match tag.as_deref() {
            None => None,
            Some("png") => Some(TileFormat::Png),
            Some("jpg") => Some(TileFormat::Jpeg),
            Some(other) => {
                return Err(LayerError::config(format!(
                    "Bad tileset: unsupported tile format \"{}\"",
                    other
                )))
            }
        };

        Ok(Self {
            name: name.into(),
            store,
            format,
            flip_y: true,
        })
    }

    /// Whether rows are flipped to bottom-origin numbering (default: true).
    pub fn with_flip_y(mut self, flip_y: bool) -> Self {
        self.flip_y = flip_y;
        self
    }

    /// Format of every tile in the store, if declared.
    pub fn format(&self) -> Option<TileFormat> {
        self.format
    }

    pub fn flip_y(&self) -> bool {
        self.flip_y
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Row as numbered in the store; rows off the grid are never stored.
    fn stored_row(&self, coord: &Coordinate) -> Result<u32, LayerError> {
        let row = if self.flip_y {
            flip_row(coord.zoom, coord.row)
        } else {
            Some(coord.row)
        };
        row.ok_or(LayerError::TileNotFound { coord: *coord })
    }
}

#[async_trait]
impl<S: TileStore> TileRenderer for StoreProvider<S> {
    async fn render_tile(
        &self,
        _width: u32,
        _height: u32,
        _srs: &str,
        coord: &Coordinate,
    ) -> Result<RenderOutcome, LayerError> {
        let row = self.stored_row(coord)?;

        match self.store.tile(coord.zoom, coord.column, row, TILE_SCALE).await? {
            Some(content) => Ok(RenderOutcome::Rendered(Bitmap::encoded(self.format, content))),
            None => Err(LayerError::TileNotFound { coord: *coord }),
        }
    }
}

#[async_trait]
impl<S: TileStore> MetadataSource for StoreProvider<S> {
    async fn tile_metadata(&self, coord: &Coordinate) -> Result<TileMetadata, LayerError> {
        let row = self.stored_row(coord)?;
        let updated_at = self.store.updated_at(coord.zoom, coord.column, row).await?;

        Ok(TileMetadata {
            updated_at,
            zoom: coord.zoom,
            x: coord.column,
            y: row,
        })
    }
}

impl<S: TileStore> Provider for StoreProvider<S> {
    fn name(&self) -> &str {
        &self.name
    }

    fn as_tile_renderer(&self) -> Option<&dyn TileRenderer> {
        Some(self)
    }

    fn as_metadata_source(&self) -> Option<&dyn MetadataSource> {
        Some(self)
    }

    fn type_by_extension(&self, extension: &str) -> Result<MediaType, LayerError> {
        if extension.eq_ignore_ascii_case("meta") {
            return Ok(MediaType::META);
        }
        media_type_for_extension(extension)
    }
}

use async_trait::async_trait;
use bytes::Bytes;

use crate::bitmap::TileFormat;
use crate::error::LayerError;
use crate::geo::Coordinate;
use crate::layer::Layer;

/// Persistent store for encoded tiles.
///
/// `lock` and `unlock` serialize renders of the same metatile: callers lock
/// the metatile's first coordinate, and implementations should treat a lock
/// older than [`Layer::stale_lock_timeout`] as abandoned.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Acquire the render lock for `coord`, waiting for any current holder.
    async fn lock(
        &self,
        layer: &Layer,
        coord: &Coordinate,
        format: TileFormat,
    ) -> Result<(), LayerError>;

    /// Release the render lock for `coord`.
    async fn unlock(
        &self,
        layer: &Layer,
        coord: &Coordinate,
        format: TileFormat,
    ) -> Result<(), LayerError>;

    /// Read a cached tile body, or `None` if absent or past the layer's
    /// cache lifespan.
    async fn read(
        &self,
        layer: &Layer,
        coord: &Coordinate,
        format: TileFormat,
    ) -> Result<Option<Bytes>, LayerError>;

    /// Store an encoded tile body.
    async fn save(
        &self,
        body: Bytes,
        layer: &Layer,
        coord: &Coordinate,
        format: TileFormat,
    ) -> Result<(), LayerError>;

    /// Remove a cached tile.
    async fn remove(
        &self,
        layer: &Layer,
        coord: &Coordinate,
        format: TileFormat,
    ) -> Result<(), LayerError>;
}

/// A backend that stores nothing and never blocks.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCache;

#[async_trait]
impl CacheBackend for NoCache {
    async fn lock(&self, _: &Layer, _: &Coordinate, _: TileFormat) -> Result<(), LayerError> {
        Ok(())
    }

    async fn unlock(&self, _: &Layer, _: &Coordinate, _: TileFormat) -> Result<(), LayerError> {
        Ok(())
    }

    async fn read(
        &self,
        _: &Layer,
        _: &Coordinate,
        _: TileFormat,
    ) -> Result<Option<Bytes>, LayerError> {
        Ok(None)
    }

    async fn save(
        &self,
        _: Bytes,
        _: &Layer,
        _: &Coordinate,
        _: TileFormat,
    ) -> Result<(), LayerError> {
        Ok(())
    }

    async fn remove(&self, _: &Layer, _: &Coordinate, _: TileFormat) -> Result<(), LayerError> {
        Ok(())
    }
}

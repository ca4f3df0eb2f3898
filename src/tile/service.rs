//! Tile Service for answering tile requests.
//!
//! The TileService is the main entry point for tile requests. It
//! orchestrates:
//! - Layer lookup and extension redirects
//! - Backing cache and recent-tile lookups
//! - Render locking per metatile
//! - Encoding and saving rendered tiles
//! - Fallback layers for skipped or missing tiles
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         TileService                             │
//! │  ┌─────────────────────────────────────────────────────────┐    │
//! │  │                    get_tile()                           │    │
//! │  │  1. Resolve layer      4. Lock first_coord, re-read     │    │
//! │  │  2. Redirect / meta    5. Render, encode, save          │    │
//! │  │  3. Cache, recent      6. Unlock, fall back if skipped  │    │
//! │  └─────────────────────────────────────────────────────────┘    │
//! │           │                    │                    │           │
//! │           ▼                    ▼                    ▼           │
//! │    ┌──────────────┐   ┌─────────────────┐   ┌───────────────┐   │
//! │    │ CacheBackend │   │ RecentTileCache │   │ LayerRegistry │   │
//! │    └──────────────┘   └─────────────────┘   └───────────────┘   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tracing::{debug, warn};

use crate::bitmap::{MediaType, TileFormat};
use crate::cache::{CacheBackend, RecentTileCache};
use crate::error::LayerError;
use crate::geo::Coordinate;
use crate::layer::{Layer, LayerRegistry};
use crate::provider::RenderOutcome;

// =============================================================================
// Tile Response
// =============================================================================

/// An encoded tile ready to be served.
#[derive(Debug, Clone)]
pub struct TileResponse {
    /// Encoded tile (or metadata) body
    pub data: Bytes,

    /// Content type of `data`
    pub mime_type: &'static str,

    /// Whether this tile came from the backing or recent cache
    pub cache_hit: bool,

    /// Value for `Access-Control-Allow-Origin`, if the layer sets one
    pub allowed_origin: Option<String>,

    /// Client cache lifetime, if the layer sets one
    pub max_cache_age: Option<Duration>,
}

/// Result of a tile request.
#[derive(Debug, Clone)]
pub enum TileOutcome {
    Tile(TileResponse),

    /// The layer (and any fallback) declined to produce this tile.
    Skipped,

    /// The tile should be fetched from this location instead.
    Redirect(String),
}

/// What one layer produced, before response metadata is attached.
enum Fetched {
    Tile { body: Bytes, cache_hit: bool },
    Skipped(Option<Bytes>),
    Redirect(String),
}

// =============================================================================
// Tile Service
// =============================================================================

/// Service answering tile requests for a set of named layers.
pub struct TileService {
    registry: Arc<LayerRegistry>,
    cache: Arc<dyn CacheBackend>,
    recent: Arc<RecentTileCache>,
}

impl TileService {
    /// Create a service with its own recent-tile cache.
    pub fn new(registry: LayerRegistry, cache: Arc<dyn CacheBackend>) -> Self {
        Self::with_shared(
            Arc::new(registry),
            cache,
            Arc::new(RecentTileCache::new()),
        )
    }

    /// Create a service from shared parts.
    pub fn with_shared(
        registry: Arc<LayerRegistry>,
        cache: Arc<dyn CacheBackend>,
        recent: Arc<RecentTileCache>,
    ) -> Self {
        Self {
            registry,
            cache,
            recent,
        }
    }

    pub fn registry(&self) -> &LayerRegistry {
        &self.registry
    }

    pub fn recent(&self) -> &RecentTileCache {
        &self.recent
    }

    /// Get a tile of `layer_name` at `coord` for a request ending in
    /// `.extension`.
    ///
    /// With `ignore_cached` the backing and recent caches are not read,
    /// but freshly rendered tiles are still saved.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - No layer is registered under `layer_name`
    /// - The layer's provider does not recognize `extension`
    /// - Rendering, encoding or the backing cache fails
    pub async fn get_tile(
        &self,
        layer_name: &str,
        coord: Coordinate,
        extension: &str,
        ignore_cached: bool,
    ) -> Result<TileOutcome, LayerError> {
        let layer = self.registry.require(layer_name)?.clone();

        if let Some(target) = layer.redirect_for(extension) {
            let location = format!("/{}/{}.{}", layer_name, coord, target);
            debug!(layer = layer_name, location = %location, "Redirecting by extension");
            return Ok(TileOutcome::Redirect(location));
        }

        let media_type = layer.type_by_extension(extension)?;
        let format = match media_type.format {
            Some(format) => format,
            None => return self.get_metadata(&layer, &coord, media_type).await,
        };

        let fetched = self.fetch_with_fallback(&layer, &coord, format, ignore_cached).await?;

        let respond = |body: Bytes, cache_hit: bool| {
            TileOutcome::Tile(TileResponse {
                data: body,
                mime_type: media_type.mime_type,
                cache_hit,
                allowed_origin: layer.allowed_origin().map(str::to_string),
                max_cache_age: layer.max_cache_age(),
            })
        };

        Ok(match fetched {
            Fetched::Tile { body, cache_hit } => respond(body, cache_hit),
            Fetched::Skipped(Some(placeholder)) => respond(placeholder, false),
            Fetched::Skipped(None) => TileOutcome::Skipped,
            Fetched::Redirect(location) => TileOutcome::Redirect(location),
        })
    }

    async fn get_metadata(
        &self,
        layer: &Layer,
        coord: &Coordinate,
        media_type: MediaType,
    ) -> Result<TileOutcome, LayerError> {
        let source = layer.provider().as_metadata_source().ok_or_else(|| {
            LayerError::config(format!(
                "Provider \"{}\" does not describe tiles",
                layer.provider().name()
            ))
        })?;

        let metadata = source.tile_metadata(coord).await?;
        let body = serde_json::to_vec(&metadata).map_err(|e| LayerError::Encode {
            message: e.to_string(),
        })?;

        Ok(TileOutcome::Tile(TileResponse {
            data: Bytes::from(body),
            mime_type: media_type.mime_type,
            cache_hit: false,
            allowed_origin: layer.allowed_origin().map(str::to_string),
            max_cache_age: layer.max_cache_age(),
        }))
    }

    /// Fetch from `layer`, following fallback layers while tiles are
    /// skipped or missing.
    async fn fetch_with_fallback(
        &self,
        layer: &Arc<Layer>,
        coord: &Coordinate,
        format: TileFormat,
        ignore_cached: bool,
    ) -> Result<Fetched, LayerError> {
        let mut current = layer.clone();
        let mut visited = vec![current.id()];

        loop {
            let result = self.fetch(&current, coord, format, ignore_cached).await;

            let fallback = match &result {
                Ok(Fetched::Skipped(_)) | Err(LayerError::TileNotFound { .. }) => {
                    current.fallback_layer()
                }
                _ => None,
            };

            let Some(name) = fallback else {
                return result;
            };

            let next = self.registry.require(name)?.clone();
            if visited.contains(&next.id()) {
                warn!(layer = name, "Fallback layers form a loop");
                return result;
            }

            debug!(from = %current.id(), to = name, coord = %coord, "Falling back");
            visited.push(next.id());
            current = next;
        }
    }

    async fn fetch(
        &self,
        layer: &Layer,
        coord: &Coordinate,
        format: TileFormat,
        ignore_cached: bool,
    ) -> Result<Fetched, LayerError> {
        if !ignore_cached {
            if let Some(body) = self.cache.read(layer, coord, format).await? {
                debug!(layer = %layer.id(), coord = %coord, "Backing cache hit");
                return Ok(Fetched::Tile {
                    body,
                    cache_hit: true,
                });
            }

            if let Some(body) = self.recent.get(layer.id(), *coord, format).await {
                debug!(layer = %layer.id(), coord = %coord, "Recent tile hit");
                return Ok(Fetched::Tile {
                    body,
                    cache_hit: true,
                });
            }
        }

        // Locking the first tile serializes renders of the whole metatile
        let lock_coord = layer.metatile().first_coord(coord);
        self.cache.lock(layer, &lock_coord, format).await?;

        let result = self.fetch_locked(layer, coord, format, ignore_cached).await;

        let unlocked = self.cache.unlock(layer, &lock_coord, format).await;
        let fetched = result?;
        unlocked?;
        Ok(fetched)
    }

    async fn fetch_locked(
        &self,
        layer: &Layer,
        coord: &Coordinate,
        format: TileFormat,
        ignore_cached: bool,
    ) -> Result<Fetched, LayerError> {
        // Another request may have rendered this tile while we waited
        if !ignore_cached {
            if let Some(body) = self.cache.read(layer, coord, format).await? {
                return Ok(Fetched::Tile {
                    body,
                    cache_hit: true,
                });
            }
        }

        match layer
            .render(coord, format, self.cache.as_ref(), &self.recent)
            .await?
        {
            RenderOutcome::Rendered(bitmap) => {
                // Metatile renders hand back the sub-tile already encoded
                let body = bitmap.encode(format, layer.format_options())?;

                // Metatile renders have already saved every sub-tile
                if layer.write_cache() && !layer.do_metatile() {
                    self.cache.save(body.clone(), layer, coord, format).await?;
                }

                Ok(Fetched::Tile {
                    body,
                    cache_hit: false,
                })
            }
            RenderOutcome::Skipped(placeholder) => {
                debug!(layer = %layer.id(), coord = %coord, "Tile skipped");
                let placeholder = placeholder
                    .map(|bitmap| bitmap.encode(format, layer.format_options()))
                    .transpose()?;
                Ok(Fetched::Skipped(placeholder))
            }
            RenderOutcome::Redirect(location) => Ok(Fetched::Redirect(location)),
        }
    }

    /// Render a tile without reading any cache.
    pub async fn render_tile(
        &self,
        layer_name: &str,
        coord: Coordinate,
        extension: &str,
    ) -> Result<TileOutcome, LayerError> {
        self.get_tile(layer_name, coord, extension, true).await
    }
}

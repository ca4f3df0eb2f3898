//! Layers: a provider plus everything needed to turn its output into tiles.
//!
//! A [`Layer`] binds a provider to a projection, a metatile shape, bounds,
//! cache policy and encoder options. [`Layer::render`] is where one tile
//! request becomes a provider call, and where a metatile render is sliced
//! back into individual tiles:
//!
//! ```text
//!   render(coord, format)
//!     │
//!     ├─ bounds exclude coord? ───────────────► Skipped
//!     │
//!     ├─ metatile + area renderer ─► render_area(meta_size, meta_envelope)
//!     ├─ area renderer            ─► render_area(dim × dim, envelope)
//!     ├─ tile renderer            ─► render_tile(dim × dim, coord)
//!     │
//!     ├─ check height, apply palette (PNG)
//!     │
//!     └─ metatile: for each sub-tile
//!          crop → encode → CacheBackend::save → RecentTileCache::put
//!        return the requested sub-tile
//! ```
//!
//! Layers do not know their own names; a [`LayerRegistry`] maps names to
//! layers and back by [`LayerId`].

mod config;
mod registry;

pub use config::{
    load_config, BoundsConfig, CacheConfig, ConfigFile, JpegConfig, LayerConfig, LoadedConfig,
    MetatileConfig, PngConfig, PostgresConfig, ProviderConfig, SandwichConfig, SliceConfig,
};
pub use registry::LayerRegistry;

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::bitmap::{
    Bitmap, FormatOptions, JpegOptions, MediaType, Palette, PngOptions, TileFormat,
};
use crate::cache::{CacheBackend, RecentTileCache};
use crate::error::LayerError;
use crate::geo::{Bounds, Coordinate, Projection, SphericalMercator};
use crate::metatile::{Envelope, Metatile, MetatileGeometry, Subtile};
use crate::provider::{Provider, RenderOutcome};

/// Default tile edge in pixels.
pub const DEFAULT_TILE_DIM: u32 = 256;

/// Default age after which a render lock is forced.
pub const DEFAULT_STALE_LOCK_TIMEOUT: Duration = Duration::from_secs(15);

// =============================================================================
// Layer Identity
// =============================================================================

/// Process-unique identity of a layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LayerId(u64);

impl LayerId {
    /// Allocate a fresh identity.
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        LayerId(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "layer#{}", self.0)
    }
}

// =============================================================================
// Layer
// =============================================================================

/// A set of tiles served from one provider.
pub struct Layer {
    id: LayerId,
    provider: Arc<dyn Provider>,
    projection: Arc<dyn Projection>,
    metatile: Metatile,
    stale_lock_timeout: Duration,
    cache_lifespan: Option<Duration>,
    write_cache: bool,
    bounds: Option<Bounds>,
    allowed_origin: Option<String>,
    max_cache_age: Option<Duration>,
    redirects: HashMap<String, String>,
    tile_dim: u32,
    fallback_layer: Option<String>,
    bitmap_palette: Option<Arc<Palette>>,
    format_options: FormatOptions,
}

impl Layer {
    /// Create a layer of single 256px spherical mercator tiles.
    pub fn new(provider: Arc<dyn Provider>) -> Self {
        Self {
            id: LayerId::next(),
            provider,
            projection: Arc::new(SphericalMercator::new()),
            metatile: Metatile::single(),
            stale_lock_timeout: DEFAULT_STALE_LOCK_TIMEOUT,
            cache_lifespan: None,
            write_cache: true,
            bounds: None,
            allowed_origin: None,
            max_cache_age: None,
            redirects: HashMap::new(),
            tile_dim: DEFAULT_TILE_DIM,
            fallback_layer: None,
            bitmap_palette: None,
            format_options: FormatOptions::default(),
        }
    }

    pub fn with_projection(mut self, projection: Arc<dyn Projection>) -> Self {
        self.projection = projection;
        self
    }

    pub fn with_metatile(mut self, metatile: Metatile) -> Self {
        self.metatile = metatile;
        self
    }

    pub fn with_stale_lock_timeout(mut self, timeout: Duration) -> Self {
        self.stale_lock_timeout = timeout;
        self
    }

    /// How long cached tiles stay valid; `None` keeps them forever.
    pub fn with_cache_lifespan(mut self, lifespan: Option<Duration>) -> Self {
        self.cache_lifespan = lifespan;
        self
    }

    pub fn with_write_cache(mut self, write_cache: bool) -> Self {
        self.write_cache = write_cache;
        self
    }

    pub fn with_bounds(mut self, bounds: Bounds) -> Self {
        self.bounds = Some(bounds);
        self
    }

    pub fn with_allowed_origin(mut self, origin: impl Into<String>) -> Self {
        self.allowed_origin = Some(origin.into());
        self
    }

    pub fn with_max_cache_age(mut self, age: Duration) -> Self {
        self.max_cache_age = Some(age);
        self
    }

    /// Redirect requests for `from` extension tiles to `to`.
    pub fn with_redirect(mut self, from: &str, to: impl Into<String>) -> Self {
        self.redirects.insert(from.to_ascii_lowercase(), to.into());
        self
    }

    pub fn with_tile_dim(mut self, tile_dim: u32) -> Self {
        self.tile_dim = tile_dim;
        self
    }

    /// Name of the layer to serve when this one produces nothing.
    pub fn with_fallback_layer(mut self, name: impl Into<String>) -> Self {
        self.fallback_layer = Some(name.into());
        self
    }

    pub fn with_jpeg_options(mut self, options: JpegOptions) -> Self {
        self.format_options.jpeg = options;
        self
    }

    /// PNG options; a palette given here snaps PNG tiles to its colours.
    pub fn with_png_options(mut self, optimize: bool, palette: Option<Palette>) -> Self {
        let mut png = PngOptions::new(optimize);
        if let Some(palette) = &palette {
            png = png.with_palette(palette);
        }
        self.format_options.png = png;
        self.bitmap_palette = palette.map(Arc::new);
        self
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    pub fn id(&self) -> LayerId {
        self.id
    }

    pub fn provider(&self) -> &Arc<dyn Provider> {
        &self.provider
    }

    pub fn projection(&self) -> &dyn Projection {
        self.projection.as_ref()
    }

    pub fn metatile(&self) -> Metatile {
        self.metatile
    }

    /// Forwarded to the cache backend; never enforced here.
    pub fn stale_lock_timeout(&self) -> Duration {
        self.stale_lock_timeout
    }

    pub fn cache_lifespan(&self) -> Option<Duration> {
        self.cache_lifespan
    }

    pub fn write_cache(&self) -> bool {
        self.write_cache
    }

    pub fn bounds(&self) -> Option<&Bounds> {
        self.bounds.as_ref()
    }

    pub fn allowed_origin(&self) -> Option<&str> {
        self.allowed_origin.as_deref()
    }

    pub fn max_cache_age(&self) -> Option<Duration> {
        self.max_cache_age
    }

    /// Extension that requests for `extension` are redirected to.
    pub fn redirect_for(&self, extension: &str) -> Option<&str> {
        self.redirects
            .get(&extension.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn tile_dim(&self) -> u32 {
        self.tile_dim
    }

    pub fn fallback_layer(&self) -> Option<&str> {
        self.fallback_layer.as_deref()
    }

    pub fn bitmap_palette(&self) -> Option<&Palette> {
        self.bitmap_palette.as_deref()
    }

    pub fn format_options(&self) -> &FormatOptions {
        &self.format_options
    }

    /// Media type for a request extension, as decided by the provider.
    pub fn type_by_extension(&self, extension: &str) -> Result<MediaType, LayerError> {
        self.provider.type_by_extension(extension)
    }

    // -------------------------------------------------------------------------
    // Geometry
    // -------------------------------------------------------------------------

    fn geometry(&self) -> MetatileGeometry<'_> {
        MetatileGeometry::new(self.metatile, self.tile_dim, self.projection.as_ref())
    }

    /// True if tiles are rendered as metatiles: the metatile is real and
    /// the provider can render areas.
    pub fn do_metatile(&self) -> bool {
        self.metatile.is_real() && self.provider.as_area_renderer().is_some()
    }

    pub fn envelope(&self, coord: &Coordinate) -> Envelope {
        self.geometry().envelope(coord)
    }

    pub fn meta_envelope(&self, coord: &Coordinate) -> Envelope {
        self.geometry().meta_envelope(coord)
    }

    pub fn meta_size(&self) -> (u32, u32) {
        self.geometry().meta_size()
    }

    pub fn meta_subtiles(&self, coord: &Coordinate) -> Vec<Subtile> {
        self.geometry().meta_subtiles(coord)
    }

    // -------------------------------------------------------------------------
    // Rendering
    // -------------------------------------------------------------------------

    /// Render the tile at `coord` in `format`.
    ///
    /// In metatile mode every sub-tile of the metatile is encoded, saved to
    /// `cache` (when the layer writes to cache) and added to `recent` before
    /// the requested sub-tile is returned, already encoded in `format`. In
    /// single-tile mode nothing is written; persisting the result is up to
    /// the caller.
    ///
    /// Skipped and redirected provider outcomes are returned unchanged, and
    /// nothing is written for them.
    pub async fn render(
        &self,
        coord: &Coordinate,
        format: TileFormat,
        cache: &dyn CacheBackend,
        recent: &RecentTileCache,
    ) -> Result<RenderOutcome, LayerError> {
        if let Some(bounds) = &self.bounds {
            if bounds.excludes(coord, self.projection.as_ref()) {
                debug!(layer = %self.id, coord = %coord, "Tile outside layer bounds");
                return Ok(RenderOutcome::Skipped(None));
            }
        }

        let srs = self.projection.srs();
        let metatile = self.do_metatile();

        let (outcome, (width, height)) = if let Some(area) = self.provider.as_area_renderer() {
            let (envelope, size) = if metatile {
                (self.meta_envelope(coord), self.meta_size())
            } else {
                (self.envelope(coord), (self.tile_dim, self.tile_dim))
            };
            let outcome = area
                .render_area(size.0, size.1, srs, envelope, coord.zoom)
                .await?;
            (outcome, size)
        } else if let Some(renderer) = self.provider.as_tile_renderer() {
            let outcome = renderer
                .render_tile(self.tile_dim, self.tile_dim, srs, coord)
                .await?;
            (outcome, (self.tile_dim, self.tile_dim))
        } else {
            return Err(LayerError::config(format!(
                "Provider \"{}\" can render neither tiles nor areas",
                self.provider.name()
            )));
        };

        let mut bitmap = match outcome {
            RenderOutcome::Rendered(bitmap) => bitmap,
            other => return Ok(other),
        };

        if let Some(actual) = bitmap.height() {
            if actual != height {
                return Err(LayerError::config(format!(
                    "Provider returned the wrong image size: {} instead of {} pixels tall",
                    actual, height
                )));
            }
        }

        if let Some(palette) = &self.bitmap_palette {
            if format == TileFormat::Png {
                bitmap = bitmap.apply_palette(palette, self.format_options.png.transparency)?;
            }
        }

        if !metatile {
            return Ok(RenderOutcome::Rendered(bitmap));
        }

        if !bitmap.can_crop() {
            return Err(LayerError::config(
                "Provider must return an image-like object that can be cropped",
            ));
        }

        // Cropping would clamp a narrow render into short edge tiles
        if let Some((actual, _)) = bitmap.dimensions() {
            if actual != width {
                return Err(LayerError::config(format!(
                    "Provider returned the wrong image size: {} instead of {} pixels wide",
                    actual, width
                )));
            }
        }

        let mut tile = None;
        for subtile in self.meta_subtiles(coord) {
            let cropped = bitmap.crop(subtile.x, subtile.y, self.tile_dim, self.tile_dim)?;
            let body = cropped.encode(format, &self.format_options)?;

            if self.write_cache {
                cache.save(body.clone(), self, &subtile.coord, format).await?;
            }
            if subtile.coord == *coord {
                tile = Some(Bitmap::encoded(Some(format), body.clone()));
            }
            recent.put(self.id, subtile.coord, format, body).await;
        }

        tile.map(RenderOutcome::Rendered).ok_or_else(|| {
            LayerError::config(format!("Metatile does not contain {}", coord))
        })
    }
}

impl fmt::Debug for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Layer")
            .field("id", &self.id)
            .field("provider", &self.provider.name())
            .field("metatile", &self.metatile)
            .field("tile_dim", &self.tile_dim)
            .field("write_cache", &self.write_cache)
            .finish_non_exhaustive()
    }
}

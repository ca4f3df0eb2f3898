//! # Tilesmith
//!
//! A map tile server that renders metatiles once and fans the sliced tiles
//! out to a backing cache.
//!
//! A layer asks its provider for one large, buffered image covering a block
//! of neighbouring tiles, cuts that image into tiles, and stores every one
//! of them, so the next requests for the neighbours are cache hits. Tiles
//! just cut are also kept briefly in memory while the backing cache catches
//! up.
//!
//! ## Features
//!
//! - **Metatiles**: `rows × columns` blocks with a pixel buffer, rendered once
//! - **Providers**: pre-rendered MBTiles in PostgreSQL, or composited
//!   "sandwich" layers with masks and blend modes
//! - **Caching**: LRU backing cache with lifespans and render locks, plus a
//!   short-lived recent-tile cache
//! - **Encoding**: PNG (optionally palette-snapped) and JPEG
//!
//! ## Architecture
//!
//! - [`geo`] - Tile coordinates, projections and bounds
//! - [`metatile`] - Metatile shape and geometry
//! - [`bitmap`] - Rendered images, encoders, palettes and blending
//! - [`provider`] - Provider capabilities and implementations
//! - [`cache`] - Backing cache trait, memory cache and recent tiles
//! - [`layer`] - Layers, the layer registry and configuration files
//! - [`tile`] - Request-level tile service
//! - [`server`] - Axum-based HTTP server and routes
//! - [`config`] - CLI types
//!
//! ## Example
//!
//! ```rust,no_run
//! use tilesmith::{create_router, load_config, RouterConfig, TileService};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let loaded = load_config("tilesmith.json").await?;
//!     let backend = loaded.cache.backend();
//!     let router = create_router(TileService::new(loaded.registry, backend), RouterConfig::new());
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//!     axum::serve(listener, router).await?;
//!     Ok(())
//! }
//! ```

pub mod bitmap;
pub mod cache;
pub mod config;
pub mod error;
pub mod geo;
pub mod layer;
pub mod metatile;
pub mod provider;
pub mod server;
pub mod tile;

// Re-export commonly used types
pub use bitmap::{Bitmap, FormatOptions, JpegOptions, MediaType, Palette, PngOptions, TileFormat};
pub use cache::{CacheBackend, MemoryCache, NoCache, RecentTileCache, TileKey};
pub use config::{Cli, Command, RenderConfig, ServeConfig};
pub use error::{ConfigError, LayerError, StoreError};
pub use geo::{Bounds, Coordinate, Projection, SphericalMercator};
pub use layer::{load_config, Layer, LayerId, LayerRegistry, LoadedConfig};
pub use metatile::{Envelope, Metatile};
pub use provider::{
    AreaRenderer, MetadataSource, Provider, RenderOutcome, SandwichProvider, StoreProvider,
    TileRenderer, TileStore,
};
pub use server::{create_router, AppState, RouterConfig};
pub use tile::{TileOutcome, TileResponse, TileService};

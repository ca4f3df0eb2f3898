//! Tile request handling.
//!
//! # Architecture
//!
//! The tile service sits between the HTTP layer and the layers:
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │              HTTP Handlers              │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │              Tile Service               │
//! │  ┌──────────────┐  ┌─────────────────┐  │
//! │  │ CacheBackend │  │ RecentTileCache │  │
//! │  │ (persistent, │  │ (metatile       │  │
//! │  │  locking)    │  │  siblings)      │  │
//! │  └──────────────┘  └─────────────────┘  │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │     LayerRegistry → Layer → Provider    │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Components
//!
//! - [`TileService`]: resolves a request to a cached or freshly rendered tile
//! - [`TileOutcome`]: a tile, a skip, or a redirect
//! - [`TileResponse`]: tile bytes plus the headers the layer asks for

mod service;

pub use service::{TileOutcome, TileResponse, TileService};

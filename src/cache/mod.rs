//! Tile caching.
//!
//! Two caches sit in front of the providers:
//!
//! ```text
//!   request ──► RecentTileCache ──► CacheBackend ──► Layer::render
//!               (minutes, shared     (persistent,
//!                by every request)    lockable)
//! ```
//!
//! - [`RecentTileCache`]: short-lived bodies written by metatile renders
//! - [`CacheBackend`]: persistent store with per-metatile render locks
//! - [`MemoryCache`]: in-process LRU backend
//! - [`NoCache`]: backend that stores nothing

mod backend;
mod memory;
mod recent;

pub use backend::{CacheBackend, NoCache};
pub use memory::{MemoryCache, DEFAULT_MAX_ENTRIES};
pub use recent::{Clock, ManualClock, RecentTileCache, SystemClock, DEFAULT_RECENT_TTL};

use crate::bitmap::TileFormat;
use crate::geo::Coordinate;
use crate::layer::LayerId;

/// Identifies one encoded tile: which layer, where, and in what format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileKey {
    pub layer: LayerId,
    pub coord: Coordinate,
    pub format: TileFormat,
}

impl TileKey {
    pub fn new(layer: LayerId, coord: Coordinate, format: TileFormat) -> Self {
        Self {
            layer,
            coord,
            format,
        }
    }
}

//! Short-lived cache of freshly rendered tiles.
//!
//! A metatile render produces many tiles at once, and map clients tend to
//! request those neighbours a moment later. Every sub-tile written during a
//! metatile render is kept here for a few minutes so those requests skip the
//! backing cache entirely.
//!
//! Entries expire after a fixed TTL. Expired entries are dropped lazily:
//! `put` sweeps the oldest entries off the front of an insertion-ordered
//! queue, and `get` deletes an expired entry it lands on.

use std::collections::{HashMap, VecDeque};
use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tokio::sync::Mutex;
use tracing::debug;

use crate::bitmap::TileFormat;
use crate::geo::Coordinate;
use crate::layer::LayerId;

use super::TileKey;

/// Default time-to-live for recent tiles: 5 minutes.
pub const DEFAULT_RECENT_TTL: Duration = Duration::from_secs(300);

// =============================================================================
// Clock
// =============================================================================

/// Source of the current time.
pub trait Clock: Send + Sync + Debug {
    fn now(&self) -> Instant;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    start: Instant,
    elapsed_ms: AtomicU64,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            elapsed_ms: AtomicU64::new(0),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        self.elapsed_ms
            .fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.start + Duration::from_millis(self.elapsed_ms.load(Ordering::SeqCst))
    }
}

// =============================================================================
// Recent Tile Cache
// =============================================================================

#[derive(Debug, Default)]
struct State {
    entries: HashMap<TileKey, (Bytes, Instant)>,
    order: VecDeque<(TileKey, Instant)>,
}

/// Time-bounded cache of tile bodies shared by every request.
///
/// The map and the expiry queue always change together under one lock.
#[derive(Debug)]
pub struct RecentTileCache {
    state: Mutex<State>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
}

impl RecentTileCache {
    /// Create a cache on the system clock with [`DEFAULT_RECENT_TTL`].
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(State::default()),
            clock,
            ttl: DEFAULT_RECENT_TTL,
        }
    }

    /// Override the default time-to-live.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Store a tile body with the default TTL.
    pub async fn put(&self, layer: LayerId, coord: Coordinate, format: TileFormat, body: Bytes) {
        self.put_with_ttl(layer, coord, format, body, self.ttl).await
    }

    /// Store a tile body that expires after `ttl`, then drop expired entries
    /// from the front of the queue.
    pub async fn put_with_ttl(
        &self,
        layer: LayerId,
        coord: Coordinate,
        format: TileFormat,
        body: Bytes,
        ttl: Duration,
    ) {
        let key = TileKey::new(layer, coord, format);
        let now = self.clock.now();
        let expires = now + ttl;

        let mut state = self.state.lock().await;
        state.entries.insert(key, (body, expires));
        state.order.push_back((key, expires));
        debug!(layer = %layer, coord = %coord, format = %format, "Added recent tile");

        while let Some(&(oldest, expiry)) = state.order.front() {
            if expiry > now {
                break;
            }
            state.order.pop_front();

            // A later put may have refreshed this key
            let stale = matches!(state.entries.get(&oldest), Some((_, e)) if *e <= now);
            if stale {
                state.entries.remove(&oldest);
                debug!(layer = %oldest.layer, coord = %oldest.coord, "Removed expired recent tile");
            }
        }
    }

    /// Fetch a tile body, deleting it if it has expired.
    pub async fn get(&self, layer: LayerId, coord: Coordinate, format: TileFormat) -> Option<Bytes> {
        let key = TileKey::new(layer, coord, format);
        let now = self.clock.now();

        let mut state = self.state.lock().await;
        let expires = state.entries.get(&key).map(|(_, expires)| *expires)?;

        if now >= expires {
            state.entries.remove(&key);
            debug!(layer = %layer, coord = %coord, "Recent tile expired");
            return None;
        }

        state.entries.get(&key).map(|(body, _)| body.clone())
    }

    /// Number of live map entries, including ones not yet swept.
    pub async fn len(&self) -> usize {
        self.state.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.lock().await.entries.is_empty()
    }

    /// Length of the expiry queue.
    pub async fn pending(&self) -> usize {
        self.state.lock().await.order.len()
    }
}

impl Default for RecentTileCache {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================

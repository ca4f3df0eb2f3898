//! In-process LRU cache backend.
//!
//! Bounded by entry count; the least-recently-used tile is evicted first.
//! Reads honour each layer's cache lifespan, and render locks older than the
//! layer's stale lock timeout are taken over rather than waited on.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use lru::LruCache;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use crate::bitmap::TileFormat;
use crate::error::LayerError;
use crate::geo::Coordinate;
use crate::layer::Layer;

use super::{CacheBackend, TileKey};

/// Default maximum number of cached tiles.
pub const DEFAULT_MAX_ENTRIES: usize = 10_000;

/// How often a blocked `lock` call re-checks the lock table.
const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(50);

struct Entry {
    body: Bytes,
    saved_at: Instant,
}

/// LRU tile cache held in memory.
pub struct MemoryCache {
    tiles: RwLock<LruCache<TileKey, Entry>>,
    locks: Mutex<HashMap<TileKey, Instant>>,
    capacity: NonZeroUsize,
}

impl MemoryCache {
    /// Create a cache holding up to [`DEFAULT_MAX_ENTRIES`] tiles.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_ENTRIES)
    }

    /// Create a cache holding up to `max_entries` tiles (at least one).
    pub fn with_capacity(max_entries: usize) -> Self {
        let capacity = NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            tiles: RwLock::new(LruCache::new(capacity)),
            locks: Mutex::new(HashMap::new()),
            capacity,
        }
    }

    pub async fn len(&self) -> usize {
        self.tiles.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tiles.read().await.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity.get()
    }

    /// True if a render lock is currently held for `coord`.
    pub async fn is_locked(&self, layer: &Layer, coord: &Coordinate, format: TileFormat) -> bool {
        let key = TileKey::new(layer.id(), *coord, format);
        self.locks.lock().await.contains_key(&key)
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheBackend for MemoryCache {
    async fn lock(
        &self,
        layer: &Layer,
        coord: &Coordinate,
        format: TileFormat,
    ) -> Result<(), LayerError> {
        let key = TileKey::new(layer.id(), *coord, format);
        let timeout = layer.stale_lock_timeout();

        loop {
            {
                let mut locks = self.locks.lock().await;
                let now = Instant::now();

                match locks.get(&key) {
                    None => {
                        locks.insert(key, now);
                        return Ok(());
                    }
                    Some(since) if now.duration_since(*since) >= timeout => {
                        debug!(coord = %coord, "Forcing stale lock");
                        locks.insert(key, now);
                        return Ok(());
                    }
                    Some(_) => {}
                }
            }

            tokio::time::sleep(LOCK_POLL_INTERVAL).await;
        }
    }

    async fn unlock(
        &self,
        layer: &Layer,
        coord: &Coordinate,
        format: TileFormat,
    ) -> Result<(), LayerError> {
        let key = TileKey::new(layer.id(), *coord, format);
        self.locks.lock().await.remove(&key);
        Ok(())
    }

    async fn read(
        &self,
        layer: &Layer,
        coord: &Coordinate,
        format: TileFormat,
    ) -> Result<Option<Bytes>, LayerError> {
        let key = TileKey::new(layer.id(), *coord, format);
        let mut tiles = self.tiles.write().await;

        let expired = match tiles.get(&key) {
            None => return Ok(None),
            Some(entry) => layer
                .cache_lifespan()
                .is_some_and(|lifespan| entry.saved_at.elapsed() > lifespan),
        };

        if expired {
            tiles.pop(&key);
            return Ok(None);
        }

        Ok(tiles.get(&key).map(|entry| entry.body.clone()))
    }

    async fn save(
        &self,
        body: Bytes,
        layer: &Layer,
        coord: &Coordinate,
        format: TileFormat,
    ) -> Result<(), LayerError> {
        let key = TileKey::new(layer.id(), *coord, format);
        self.tiles.write().await.put(
            key,
            Entry {
                body,
                saved_at: Instant::now(),
            },
        );
        Ok(())
    }

    async fn remove(
        &self,
        layer: &Layer,
        coord: &Coordinate,
        format: TileFormat,
    ) -> Result<(), LayerError> {
        let key = TileKey::new(layer.id(), *coord, format);
        self.tiles.write().await.pop(&key);
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

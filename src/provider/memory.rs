use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::RwLock;

use crate::error::LayerError;

use super::TileStore;

#[derive(Debug, Clone)]
struct StoredTile {
    data: Bytes,
    updated_at: Option<i64>,
}

/// Key-value tile store held in memory.
///
/// Tiles are addressed by `"{zoom}/{column}/{row}/{scale}"` document ids,
/// the layout used by document-database tilesets.
#[derive(Debug, Default)]
pub struct MemoryStore {
    format: Option<String>,
    tiles: RwLock<HashMap<String, StoredTile>>,
}

impl MemoryStore {
    /// Create an empty store whose metadata declares `format`.
    pub fn new(format: Option<&str>) -> Self {
        Self {
            format: format.map(str::to_string),
            tiles: RwLock::new(HashMap::new()),
        }
    }

    /// Document id of a stored tile.
    pub fn tile_id(zoom: u8, column: u32, row: u32, scale: u32) -> String {
        format!("{}/{}/{}/{}", zoom, column, row, scale)
    }

    /// Store a tile. `row` is the stored (bottom-origin) row.
    pub async fn insert(
        &self,
        zoom: u8,
        column: u32,
        row: u32,
        scale: u32,
        data: Bytes,
        updated_at: Option<i64>,
    ) {
        self.tiles.write().await.insert(
            Self::tile_id(zoom, column, row, scale),
            StoredTile { data, updated_at },
        );
    }

    pub async fn len(&self) -> usize {
        self.tiles.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tiles.read().await.is_empty()
    }
}

#[async_trait]
impl TileStore for MemoryStore {
    async fn format(&self) -> Result<Option<String>, LayerError> {
        Ok(self.format.clone())
    }

    async fn tile(
        &self,
        zoom: u8,
        column: u32,
        row: u32,
        scale: u32,
    ) -> Result<Option<Bytes>, LayerError> {
        let id = Self::tile_id(zoom, column, row, scale);
        Ok(self.tiles.read().await.get(&id).map(|t| t.data.clone()))
    }

    async fn updated_at(
        &self,
        zoom: u8,
        column: u32,
        row: u32,
    ) -> Result<Option<i64>, LayerError> {
        let id = Self::tile_id(zoom, column, row, 1);
        Ok(self.tiles.read().await.get(&id).and_then(|t| t.updated_at))
    }
}

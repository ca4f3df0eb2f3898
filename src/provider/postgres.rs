//! MBTiles tilesets stored in PostgreSQL.
//!
//! The database holds the two MBTiles tables:
//!
//! ```text
//!   metadata(name, value)                     -- name = 'format' → png | jpg
//!   tiles(zoom_level, tile_column, tile_row,
//!         tile_scale, tile_data, updated_at)
//! ```
//!
//! Connections are described with a libpq keyword string such as
//! `host=localhost dbname=mbtiles user=tiles password=secret`.

use std::collections::BTreeMap;

use async_trait::async_trait;
use bytes::Bytes;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::PgPool;
use tracing::{info, warn};

use crate::error::{LayerError, StoreError};

use super::TileStore;

/// Default pool size per tileset.
const DEFAULT_MAX_CONNECTIONS: u32 = 5;

// =============================================================================
// Connect Parameters
// =============================================================================

/// Parsed libpq-style `key=value` connect string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectParams {
    params: BTreeMap<String, String>,
}

impl ConnectParams {
    /// Parse a whitespace-separated `key=value` list. `dbname` is required.
    pub fn parse(tileset: &str) -> Result<Self, LayerError> {
        let mut params = BTreeMap::new();

        for option in tileset.split_whitespace() {
            let (key, value) = option.split_once('=').ok_or_else(|| {
                LayerError::config(format!(
                    "Bad scheme in Postgres provider, must be a PostgreSQL connect string: \"{}\"",
                    tileset
                ))
            })?;
            params.insert(key.to_string(), value.to_string());
        }

        if !params.contains_key("dbname") {
            return Err(LayerError::config(format!(
                "Bad scheme in Postgres provider, must be a PostgreSQL connect string: \"{}\"",
                tileset
            )));
        }

        Ok(Self { params })
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    pub fn dbname(&self) -> &str {
        self.get("dbname").unwrap_or_default()
    }

    /// Build sqlx connect options from the recognised keys.
    pub fn to_options(&self) -> Result<PgConnectOptions, LayerError> {
        let mut options = PgConnectOptions::new().database(self.dbname());

        for (key, value) in &self.params {
            options = match key.as_str() {
                "dbname" => options,
                "host" => options.host(value),
                "user" => options.username(value),
                "password" => options.password(value),
                "port" => {
                    let port = value.parse::<u16>().map_err(|_| {
                        LayerError::config(format!("Invalid Postgres port: \"{}\"", value))
                    })?;
                    options.port(port)
                }
                other => {
                    warn!(key = other, "Ignoring unsupported Postgres connect option");
                    options
                }
            };
        }

        Ok(options)
    }
}

// =============================================================================
// Store
// =============================================================================

/// Tile store reading an MBTiles schema through a connection pool.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Connect using a libpq `key=value` string.
    pub async fn connect(tileset: &str) -> Result<Self, LayerError> {
        let params = ConnectParams::parse(tileset)?;

        let pool = PgPoolOptions::new()
            .max_connections(DEFAULT_MAX_CONNECTIONS)
            .connect_with(params.to_options()?)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        info!(dbname = params.dbname(), "Connected to Postgres tileset");
        Ok(Self { pool })
    }

    pub fn with_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn query_error(e: sqlx::Error) -> LayerError {
    StoreError::Query(e.to_string()).into()
}

#[async_trait]
impl TileStore for PostgresStore {
    async fn format(&self) -> Result<Option<String>, LayerError> {
        sqlx::query_scalar::<_, String>("SELECT value FROM metadata WHERE name = 'format'")
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| LayerError::config(format!("Bad tileset: {}", e)))
    }

    async fn tile(
        &self,
        zoom: u8,
        column: u32,
        row: u32,
        scale: u32,
    ) -> Result<Option<Bytes>, LayerError> {
        let data = sqlx::query_scalar::<_, Vec<u8>>(
            "SELECT tile_data FROM tiles \
             WHERE zoom_level = $1 AND tile_column = $2 AND tile_row = $3 AND tile_scale = $4",
        )
        .bind(i32::from(zoom))
        .bind(i64::from(column))
        .bind(i64::from(row))
        .bind(i64::from(scale))
        .fetch_optional(&self.pool)
        .await
        .map_err(query_error)?;

        Ok(data.map(Bytes::from))
    }

    async fn updated_at(
        &self,
        zoom: u8,
        column: u32,
        row: u32,
    ) -> Result<Option<i64>, LayerError> {
        let updated_at = sqlx::query_scalar::<_, Option<i64>>(
            "SELECT updated_at FROM tiles \
             WHERE zoom_level = $1 AND tile_column = $2 AND tile_row = $3",
        )
        .bind(i32::from(zoom))
        .bind(i64::from(column))
        .bind(i64::from(row))
        .fetch_optional(&self.pool)
        .await
        .map_err(query_error)?;

        Ok(updated_at.flatten())
    }
}

use thiserror::Error;

use crate::bitmap::TileFormat;
use crate::geo::Coordinate;

/// Errors raised while rendering, encoding or storing tiles.
///
/// These propagate unchanged to the caller; nothing in the render path
/// retries or recovers from them.
#[derive(Debug, Clone, Error)]
pub enum LayerError {
    /// Setup or contract violation (missing provider capability, wrong
    /// image size, malformed connection parameters, ...)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Extension not recognized by the layer or its provider
    #[error("Unknown extension in configuration: \"{0}\"")]
    UnknownExtension(String),

    /// No layer registered under this name
    #[error("Unknown layer: {0}")]
    UnknownLayer(String),

    /// A store-backed provider was asked for a format it does not hold
    #[error("Requested format \"{requested}\" does not match tileset format \"{stored}\"")]
    FormatMismatch {
        requested: TileFormat,
        stored: TileFormat,
    },

    /// The backing store has no data for this coordinate
    #[error("Tile not found: {coord}")]
    TileNotFound { coord: Coordinate },

    /// Tile store (database) failure
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Image encoding failed
    #[error("Failed to encode tile: {message}")]
    Encode { message: String },

    /// Image decoding failed
    #[error("Failed to decode tile: {message}")]
    Decode { message: String },

    /// Backing cache failure
    #[error("Cache error: {0}")]
    Cache(String),
}

impl LayerError {
    /// Shorthand for [`LayerError::Configuration`].
    pub fn config(message: impl Into<String>) -> Self {
        LayerError::Configuration(message.into())
    }
}

/// Errors from relational or key-value tile stores.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// Could not reach the store
    #[error("Connection error: {0}")]
    Connection(String),

    /// A query failed or returned malformed data
    #[error("Query error: {0}")]
    Query(String),
}

/// Errors raised while loading a layer configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read
    #[error("Failed to read {path}: {message}")]
    Read { path: String, message: String },

    /// The file is not valid configuration JSON
    #[error("Invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),

    /// A layer failed validation or construction
    #[error("Invalid layer \"{layer}\": {source}")]
    Layer {
        layer: String,
        #[source]
        source: LayerError,
    },
}

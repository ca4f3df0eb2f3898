//! Layer configuration files.
//!
//! A configuration file is a JSON object naming a cache and a set of layers:
//!
//! ```json
//! {
//!   "cache": { "name": "memory", "entries": 10000 },
//!   "layers": {
//!     "base": {
//!       "provider": { "name": "postgres", "tileset": "dbname=tiles host=db" },
//!       "maximum cache age": 3600
//!     },
//!     "tinted": {
//!       "provider": {
//!         "name": "sandwich",
//!         "stack": [
//!           { "src": "base" },
//!           { "color": "#ff990080", "mode": "multiply" }
//!         ]
//!       },
//!       "png options": { "palette": "palettes/web.act" }
//!     }
//!   }
//! }
//! ```
//!
//! Layer keys keep their spaced spellings (`"stale lock timeout"`,
//! `"cache lifespan"`, ...). Durations are whole seconds. Relative palette
//! paths are resolved against the directory holding the configuration file.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info};

use crate::bitmap::blend::{BlendMode, Color};
use crate::bitmap::{JpegOptions, Palette};
use crate::cache::{CacheBackend, MemoryCache, NoCache, DEFAULT_MAX_ENTRIES};
use crate::error::{ConfigError, LayerError};
use crate::geo::Bounds;
use crate::metatile::Metatile;
use crate::provider::{PostgresStore, Provider, SandwichProvider, Slice, StoreProvider};

use super::{Layer, LayerRegistry};

// =============================================================================
// File Model
// =============================================================================

/// Top level of a configuration file.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    #[serde(default)]
    pub cache: CacheConfig,
    pub layers: BTreeMap<String, LayerConfig>,
}

impl ConfigFile {
    /// Parse configuration JSON.
    pub fn parse(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Backing cache selection.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "name", rename_all = "lowercase")]
pub enum CacheConfig {
    /// In-process LRU cache of encoded tiles.
    Memory {
        #[serde(default = "default_entries")]
        entries: usize,
    },

    /// No backing cache: every request renders.
    Disabled,
}

fn default_entries() -> usize {
    DEFAULT_MAX_ENTRIES
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig::Memory {
            entries: DEFAULT_MAX_ENTRIES,
        }
    }
}

impl CacheConfig {
    /// Build the backend this configuration describes.
    pub fn backend(&self) -> Arc<dyn CacheBackend> {
        match self {
            CacheConfig::Memory { entries } => Arc::new(MemoryCache::with_capacity(*entries)),
            CacheConfig::Disabled => Arc::new(NoCache),
        }
    }

    /// Replace the entry count of a memory cache.
    pub fn with_entries(self, entries: usize) -> Self {
        match self {
            CacheConfig::Memory { .. } => CacheConfig::Memory { entries },
            CacheConfig::Disabled => CacheConfig::Disabled,
        }
    }
}

/// One layer's settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LayerConfig {
    pub provider: ProviderConfig,
    pub metatile: Option<MetatileConfig>,
    pub projection: Option<String>,
    #[serde(rename = "stale lock timeout")]
    pub stale_lock_timeout: Option<u64>,
    /// Zero keeps tiles forever.
    #[serde(rename = "cache lifespan")]
    pub cache_lifespan: Option<u64>,
    #[serde(rename = "write cache", default = "default_true")]
    pub write_cache: bool,
    pub bounds: Option<BoundsConfig>,
    #[serde(rename = "allowed origin")]
    pub allowed_origin: Option<String>,
    #[serde(rename = "maximum cache age")]
    pub max_cache_age: Option<u64>,
    #[serde(default)]
    pub redirects: BTreeMap<String, String>,
    #[serde(rename = "tile height")]
    pub tile_height: Option<u32>,
    #[serde(rename = "fallback layer")]
    pub fallback_layer: Option<String>,
    #[serde(rename = "jpeg options")]
    pub jpeg_options: Option<JpegConfig>,
    #[serde(rename = "png options")]
    pub png_options: Option<PngConfig>,
}

fn default_true() -> bool {
    true
}

/// Provider selection, tagged by `"name"`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "name", rename_all = "lowercase")]
pub enum ProviderConfig {
    Postgres(PostgresConfig),
    Sandwich(SandwichConfig),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PostgresConfig {
    /// libpq `key=value` connection string; must name a `dbname`.
    pub tileset: String,
    #[serde(rename = "flip y", default = "default_true")]
    pub flip_y: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SandwichConfig {
    pub stack: Vec<SliceConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SliceConfig {
    pub src: Option<String>,
    pub mask: Option<String>,
    pub color: Option<String>,
    pub opacity: Option<f32>,
    pub mode: Option<String>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetatileConfig {
    #[serde(default = "default_one")]
    pub rows: u32,
    #[serde(default = "default_one")]
    pub columns: u32,
    #[serde(default)]
    pub buffer: u32,
}

fn default_one() -> u32 {
    1
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BoundsConfig {
    #[serde(default)]
    pub low: u8,
    #[serde(default = "default_high")]
    pub high: u8,
    #[serde(default = "default_north")]
    pub north: f64,
    #[serde(default = "default_west")]
    pub west: f64,
    #[serde(default = "default_south")]
    pub south: f64,
    #[serde(default = "default_east")]
    pub east: f64,
}

fn default_high() -> u8 {
    31
}

fn default_north() -> f64 {
    89.0
}

fn default_west() -> f64 {
    -180.0
}

fn default_south() -> f64 {
    -89.0
}

fn default_east() -> f64 {
    180.0
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JpegConfig {
    pub quality: Option<u8>,
    #[serde(default = "default_true")]
    pub optimize: bool,
    #[serde(default)]
    pub progressive: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PngConfig {
    #[serde(default = "default_true")]
    pub optimize: bool,
    /// Path to an Adobe `.act` palette.
    pub palette: Option<String>,
}

// =============================================================================
// Loading
// =============================================================================

/// Everything a configuration file produces.
#[derive(Debug)]
pub struct LoadedConfig {
    pub registry: LayerRegistry,
    pub cache: CacheConfig,
}

/// Read, parse and build the configuration at `path`.
pub async fn load_config(path: impl AsRef<Path>) -> Result<LoadedConfig, ConfigError> {
    let path = path.as_ref();
    let json = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

    let file = ConfigFile::parse(&json)?;
    let base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();

    let loaded = LoadedConfig::build(file, &base_dir).await?;
    info!(
        path = %path.display(),
        layers = loaded.registry.len(),
        "Loaded layer configuration"
    );
    Ok(loaded)
}

impl LoadedConfig {
    /// Build providers and layers from a parsed file.
    ///
    /// Sandwich providers are built after every layer they read from, so
    /// the stack must reference existing layers and must not loop.
    pub async fn build(file: ConfigFile, base_dir: &Path) -> Result<Self, ConfigError> {
        let providers = build_providers(&file.layers).await?;

        let mut registry = LayerRegistry::new();
        for (name, config) in &file.layers {
            let provider = providers
                .get(name)
                .cloned()
                .ok_or_else(|| layer_error(name, LayerError::UnknownLayer(name.clone())))?;

            let layer = build_layer(config, provider, base_dir)
                .await
                .map_err(|e| layer_error(name, e))?;
            registry.insert(name.clone(), layer).map_err(|e| layer_error(name, e))?;
        }

        for (name, config) in &file.layers {
            if let Some(fallback) = &config.fallback_layer {
                if registry.get(fallback).is_none() {
                    return Err(layer_error(
                        name,
                        LayerError::config(format!("Unknown fallback layer: \"{}\"", fallback)),
                    ));
                }
            }
        }

        Ok(Self {
            registry,
            cache: file.cache,
        })
    }
}

fn layer_error(layer: &str, source: LayerError) -> ConfigError {
    ConfigError::Layer {
        layer: layer.to_string(),
        source,
    }
}

/// Build every provider, resolving sandwich dependencies in passes.
async fn build_providers(
    layers: &BTreeMap<String, LayerConfig>,
) -> Result<HashMap<String, Arc<dyn Provider>>, ConfigError> {
    let mut built: HashMap<String, Arc<dyn Provider>> = HashMap::new();
    let mut pending: Vec<&String> = layers.keys().collect();

    while !pending.is_empty() {
        let mut waiting = Vec::new();

        for name in pending.iter().copied() {
            let provider: Arc<dyn Provider> = match &layers[name].provider {
                ProviderConfig::Postgres(config) => {
                    let store = PostgresStore::connect(&config.tileset)
                        .await
                        .map_err(|e| layer_error(name, e))?;
                    let provider = StoreProvider::new(name.clone(), store)
                        .await
                        .map_err(|e| layer_error(name, e))?
                        .with_flip_y(config.flip_y);
                    Arc::new(provider)
                }
                ProviderConfig::Sandwich(config) => {
                    for dependency in sandwich_dependencies(config) {
                        if !layers.contains_key(dependency) {
                            return Err(layer_error(
                                name,
                                LayerError::config(format!(
                                    "Sandwich references unknown layer \"{}\"",
                                    dependency
                                )),
                            ));
                        }
                    }
                    if !sandwich_dependencies(config).all(|d| built.contains_key(d)) {
                        waiting.push(name);
                        continue;
                    }
                    let provider =
                        build_sandwich(name, config, &built).map_err(|e| layer_error(name, e))?;
                    Arc::new(provider)
                }
            };

            debug!(layer = %name, provider = provider.name(), "Built provider");
            built.insert(name.clone(), provider);
        }

        if waiting.len() == pending.len() {
            let name = waiting[0];
            return Err(layer_error(
                name,
                LayerError::config("Sandwich layers reference each other in a cycle"),
            ));
        }
        pending = waiting;
    }

    Ok(built)
}

fn sandwich_dependencies(config: &SandwichConfig) -> impl Iterator<Item = &str> {
    config
        .stack
        .iter()
        .flat_map(|slice| slice.src.iter().chain(slice.mask.iter()))
        .map(String::as_str)
}

fn build_sandwich(
    name: &str,
    config: &SandwichConfig,
    built: &HashMap<String, Arc<dyn Provider>>,
) -> Result<SandwichProvider, LayerError> {
    let lookup = |layer: &str| {
        built
            .get(layer)
            .cloned()
            .ok_or_else(|| LayerError::UnknownLayer(layer.to_string()))
    };

    let mut stack = Vec::with_capacity(config.stack.len());
    for slice_config in &config.stack {
        let mut slice = Slice::new();
        if let Some(src) = &slice_config.src {
            slice = slice.with_src(src.clone(), lookup(src)?);
        }
        if let Some(mask) = &slice_config.mask {
            slice = slice.with_mask(mask.clone(), lookup(mask)?);
        }
        if let Some(color) = &slice_config.color {
            slice = slice.with_color(color.parse::<Color>()?);
        }
        if let Some(opacity) = slice_config.opacity {
            slice = slice.with_opacity(opacity);
        }
        if let Some(mode) = &slice_config.mode {
            slice = slice.with_mode(mode.parse::<BlendMode>()?);
        }
        stack.push(slice);
    }

    SandwichProvider::new(name, stack)
}

async fn build_layer(
    config: &LayerConfig,
    provider: Arc<dyn Provider>,
    base_dir: &Path,
) -> Result<Layer, LayerError> {
    let mut layer = Layer::new(provider).with_write_cache(config.write_cache);

    if let Some(projection) = &config.projection {
        if !projection.eq_ignore_ascii_case("spherical mercator") {
            return Err(LayerError::config(format!(
                "Unsupported projection: \"{}\"",
                projection
            )));
        }
    }

    if let Some(metatile) = config.metatile {
        layer = layer.with_metatile(Metatile::new(
            metatile.rows,
            metatile.columns,
            metatile.buffer,
        )?);
    }

    if let Some(seconds) = config.stale_lock_timeout {
        layer = layer.with_stale_lock_timeout(Duration::from_secs(seconds));
    }

    if let Some(seconds) = config.cache_lifespan {
        let lifespan = (seconds > 0).then(|| Duration::from_secs(seconds));
        layer = layer.with_cache_lifespan(lifespan);
    }

    if let Some(bounds) = config.bounds {
        layer = layer.with_bounds(Bounds::new(
            bounds.low,
            bounds.high,
            bounds.north,
            bounds.west,
            bounds.south,
            bounds.east,
        )?);
    }

    if let Some(origin) = &config.allowed_origin {
        layer = layer.with_allowed_origin(origin.clone());
    }

    if let Some(seconds) = config.max_cache_age {
        layer = layer.with_max_cache_age(Duration::from_secs(seconds));
    }

    for (from, to) in &config.redirects {
        layer = layer.with_redirect(from, to.clone());
    }

    if let Some(height) = config.tile_height {
        if height == 0 {
            return Err(LayerError::config("Tile height must be greater than 0"));
        }
        layer = layer.with_tile_dim(height);
    }

    if let Some(fallback) = &config.fallback_layer {
        layer = layer.with_fallback_layer(fallback.clone());
    }

    if let Some(jpeg) = &config.jpeg_options {
        layer = layer.with_jpeg_options(JpegOptions::new(
            jpeg.quality,
            jpeg.optimize,
            jpeg.progressive,
        )?);
    }

    if let Some(png) = &config.png_options {
        let palette = match png.palette.as_deref() {
            Some(path) => Some(Palette::load(&resolve_path(base_dir, path)).await?),
            None => None,
        };
        layer = layer.with_png_options(png.optimize, palette);
    }

    Ok(layer)
}

fn resolve_path(base_dir: &Path, path: &str) -> PathBuf {
    let path = Path::new(path);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}

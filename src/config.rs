//! Command-line configuration.
//!
//! This module provides the command-line interface, which supports:
//! - Subcommands for serving tiles and rendering a single tile
//! - Environment variables with `TILESMITH_` prefix
//! - Defaults for all optional settings
//!
//! Layers themselves are described in a JSON file (see
//! [`crate::layer::load_config`]); the command line only points at it and
//! sets process-level options.
//!
//! # Example
//!
//! ```ignore
//! use clap::Parser;
//! use tilesmith::config::{Cli, Command};
//!
//! match Cli::parse().command {
//!     Command::Serve(config) => println!("Listening on {}", config.bind_address()),
//!     Command::Render(config) => println!("Rendering {}", config.tile),
//! }
//! ```
//!
//! # Environment Variables
//!
//! - `TILESMITH_CONFIG` - Layer configuration file (required)
//! - `TILESMITH_HOST` - Server bind address (default: 0.0.0.0)
//! - `TILESMITH_PORT` - Server port (default: 8080)
//! - `TILESMITH_CACHE_ENTRIES` - Override the memory cache size
//! - `TILESMITH_CORS_ORIGINS` - Allowed CORS origins, comma-separated

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::geo::Coordinate;

// =============================================================================
// Default Values
// =============================================================================

/// Default server host.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default server port.
pub const DEFAULT_PORT: u16 = 8080;

// =============================================================================
// CLI Arguments
// =============================================================================

/// Tilesmith - a map tile server with metatile rendering.
#[derive(Parser, Debug, Clone)]
#[command(name = "tilesmith")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Serve tiles over HTTP
    Serve(ServeConfig),

    /// Render one tile to a file, bypassing the cache
    Render(RenderConfig),
}

/// Options for `tilesmith serve`.
#[derive(Args, Debug, Clone)]
pub struct ServeConfig {
    /// Layer configuration file.
    #[arg(short, long, env = "TILESMITH_CONFIG")]
    pub config: PathBuf,

    /// Host address to bind the server to.
    #[arg(long, default_value = DEFAULT_HOST, env = "TILESMITH_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(short, long, default_value_t = DEFAULT_PORT, env = "TILESMITH_PORT")]
    pub port: u16,

    /// Maximum number of tiles in the memory cache.
    ///
    /// Overrides the entry count in the configuration file.
    #[arg(long, env = "TILESMITH_CACHE_ENTRIES")]
    pub cache_entries: Option<usize>,

    /// Allowed CORS origins (comma-separated).
    ///
    /// If not specified, allows any origin.
    #[arg(long, env = "TILESMITH_CORS_ORIGINS", value_delimiter = ',')]
    pub cors_origins: Option<Vec<String>>,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,

    /// Disable request tracing.
    #[arg(long, default_value_t = false)]
    pub no_tracing: bool,
}

impl ServeConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.config.as_os_str().is_empty() {
            return Err(
                "Layer configuration is required. Set --config or TILESMITH_CONFIG".to_string(),
            );
        }

        if self.cache_entries == Some(0) {
            return Err("cache_entries must be greater than 0".to_string());
        }

        Ok(())
    }

    /// Get the server bind address as "host:port".
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Options for `tilesmith render`.
#[derive(Args, Debug, Clone)]
pub struct RenderConfig {
    /// Layer configuration file.
    #[arg(short, long, env = "TILESMITH_CONFIG")]
    pub config: PathBuf,

    /// Name of the layer to render.
    #[arg(short, long)]
    pub layer: String,

    /// Tile to render, as `z/x/y.ext`.
    #[arg(short, long)]
    pub tile: String,

    /// File to write the tile to.
    #[arg(short, long)]
    pub output: PathBuf,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl RenderConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.layer.is_empty() {
            return Err("Layer name is required".to_string());
        }
        self.parse_tile().map(|_| ())
    }

    /// Split `z/x/y.ext` into a coordinate and an extension.
    pub fn parse_tile(&self) -> Result<(Coordinate, &str), String> {
        let invalid = || format!("Tile must look like z/x/y.ext, got \"{}\"", self.tile);

        let mut parts = self.tile.trim_start_matches('/').splitn(3, '/');
        let (Some(z), Some(x), Some(rest)) = (parts.next(), parts.next(), parts.next()) else {
            return Err(invalid());
        };
        let (y, extension) = rest.rsplit_once('.').ok_or_else(invalid)?;
        if extension.is_empty() {
            return Err(invalid());
        }

        let zoom: u8 = z.parse().map_err(|_| invalid())?;
        let column: u32 = x.parse().map_err(|_| invalid())?;
        let row: u32 = y.parse().map_err(|_| invalid())?;

        Ok((Coordinate::new(zoom, row, column), extension))
    }
}

// =============================================================================
// Tests
// =============================================================================

//! Tilesmith - a map tile server with metatile rendering.
//!
//! This binary loads a layer configuration and either serves tiles over
//! HTTP or renders a single tile to disk.

use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tilesmith::{
    config::{Cli, Command, RenderConfig, ServeConfig},
    layer::{load_config, LoadedConfig},
    server::{create_router, RouterConfig},
    tile::{TileOutcome, TileService},
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.command {
        Command::Serve(config) => run_serve(config).await,
        Command::Render(config) => run_render(config).await,
    }
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "tilesmith=debug,tower_http=debug"
    } else {
        "tilesmith=info,tower_http=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn load(path: &std::path::Path) -> Option<LoadedConfig> {
    match load_config(path).await {
        Ok(loaded) => Some(loaded),
        Err(e) => {
            error!("Failed to load {}: {}", path.display(), e);
            None
        }
    }
}

// =============================================================================
// Serve Command
// =============================================================================

async fn run_serve(config: ServeConfig) -> ExitCode {
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let Some(loaded) = load(&config.config).await else {
        return ExitCode::FAILURE;
    };

    let cache_config = match config.cache_entries {
        Some(entries) => loaded.cache.with_entries(entries),
        None => loaded.cache,
    };

    info!("Configuration:");
    info!("  Layers: {}", loaded.registry.names().collect::<Vec<_>>().join(", "));
    info!("  Cache: {:?}", cache_config);

    let tile_service = TileService::new(loaded.registry, cache_config.backend());

    let mut router_config = RouterConfig::new().with_tracing(!config.no_tracing);
    if let Some(origins) = &config.cors_origins {
        router_config = router_config.with_cors_origins(origins.clone());
    }
    let router = create_router(tile_service, router_config);

    let addr = config.bind_address();
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            return ExitCode::FAILURE;
        }
    };

    info!("Server listening on: http://{}", addr);
    info!("  curl http://{}/health", addr);

    if let Err(e) = axum::serve(listener, router).await {
        error!("Server error: {}", e);
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

// =============================================================================
// Render Command
// =============================================================================

async fn run_render(config: RenderConfig) -> ExitCode {
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }
    let (coord, extension) = match config.parse_tile() {
        Ok(tile) => tile,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let Some(loaded) = load(&config.config).await else {
        return ExitCode::FAILURE;
    };
    let tile_service = TileService::new(loaded.registry, loaded.cache.backend());

    let response = match tile_service.render_tile(&config.layer, coord, extension).await {
        Ok(TileOutcome::Tile(response)) => response,
        Ok(TileOutcome::Skipped) => {
            error!("Layer {} has no tile at {}", config.layer, coord);
            return ExitCode::FAILURE;
        }
        Ok(TileOutcome::Redirect(location)) => {
            error!("Tile {} redirects to {}", coord, location);
            return ExitCode::FAILURE;
        }
        Err(e) => {
            error!("Failed to render {}: {}", coord, e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = tokio::fs::write(&config.output, &response.data).await {
        error!("Failed to write {}: {}", config.output.display(), e);
        return ExitCode::FAILURE;
    }

    info!(
        "Wrote {} ({} bytes, {})",
        config.output.display(),
        response.data.len(),
        response.mime_type
    );
    ExitCode::SUCCESS
}

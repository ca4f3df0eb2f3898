//! HTTP request handlers for the tile API.
//!
//! # Endpoints
//!
//! - `GET /{layer}/{z}/{x}/{y}.{ext}` - Serve a tile
//! - `GET /health` - Health check endpoint

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use crate::error::LayerError;
use crate::geo::Coordinate;
use crate::tile::{TileOutcome, TileResponse, TileService};

/// Header reporting whether a tile came from cache.
pub const CACHE_HIT_HEADER: &str = "x-tile-cache-hit";

// =============================================================================
// Application State
// =============================================================================

/// Shared application state containing the tile service.
#[derive(Clone)]
pub struct AppState {
    pub tile_service: Arc<TileService>,
}

impl AppState {
    pub fn new(tile_service: TileService) -> Self {
        Self {
            tile_service: Arc::new(tile_service),
        }
    }
}

// =============================================================================
// Request Parameters
// =============================================================================

/// Path parameters for tile requests.
///
/// Extracted from: `/{layer}/{z}/{x}/{filename}` where filename is
/// `{y}.{ext}`.
#[derive(Debug, Deserialize)]
pub struct TilePathParams {
    pub layer: String,
    pub z: u8,
    pub x: u32,
    pub filename: String,
}

impl TilePathParams {
    /// Split the filename into row and extension.
    pub fn y_and_extension(&self) -> Option<(u32, &str)> {
        let (y, extension) = self.filename.rsplit_once('.')?;
        if extension.is_empty() {
            return None;
        }
        Some((y.parse().ok()?, extension))
    }

    pub fn coordinate(&self, y: u32) -> Coordinate {
        Coordinate::new(self.z, y, self.x)
    }
}

// =============================================================================
// Response Types
// =============================================================================

/// JSON error response returned for all error conditions.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error type identifier (e.g., "not_found", "unknown_extension")
    pub error: String,

    /// Human-readable error message
    pub message: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
        }
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub layers: usize,
}

// =============================================================================
// Error Mapping
// =============================================================================

/// Errors a handler can answer with.
#[derive(Debug)]
pub enum HandlerError {
    Layer(LayerError),

    /// The request path could not be understood
    BadRequest(String),

    /// The layer produced nothing for this tile
    Skipped { layer: String, coord: Coordinate },
}

impl From<LayerError> for HandlerError {
    fn from(err: LayerError) -> Self {
        HandlerError::Layer(err)
    }
}

/// Convert handler errors to HTTP responses.
///
/// 4xx errors are logged at WARN level, 5xx errors at ERROR level.
impl IntoResponse for HandlerError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match &self {
            HandlerError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, "invalid_request", message.clone())
            }
            HandlerError::Skipped { layer, coord } => (
                StatusCode::NOT_FOUND,
                "skipped",
                format!("Layer {} has no tile at {}", layer, coord),
            ),
            HandlerError::Layer(err) => {
                let (status, error_type) = match err {
                    LayerError::UnknownLayer(_) => (StatusCode::NOT_FOUND, "not_found"),
                    LayerError::TileNotFound { .. } => (StatusCode::NOT_FOUND, "tile_not_found"),
                    LayerError::UnknownExtension(_) => {
                        (StatusCode::BAD_REQUEST, "unknown_extension")
                    }
                    LayerError::FormatMismatch { .. } => {
                        (StatusCode::BAD_REQUEST, "format_mismatch")
                    }
                    LayerError::Configuration(_) => {
                        (StatusCode::INTERNAL_SERVER_ERROR, "configuration_error")
                    }
                    LayerError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "store_error"),
                    LayerError::Encode { .. } => {
                        (StatusCode::INTERNAL_SERVER_ERROR, "encode_error")
                    }
                    LayerError::Decode { .. } => {
                        (StatusCode::INTERNAL_SERVER_ERROR, "decode_error")
                    }
                    LayerError::Cache(_) => (StatusCode::INTERNAL_SERVER_ERROR, "cache_error"),
                };
                (status, error_type, err.to_string())
            }
        };

        if status.is_server_error() {
            error!(status = status.as_u16(), error_type, %message, "Tile request failed");
        } else {
            warn!(status = status.as_u16(), error_type, %message, "Tile request rejected");
        }

        (status, Json(ErrorResponse::new(error_type, message))).into_response()
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// Handle tile requests.
///
/// # Endpoint
///
/// `GET /{layer}/{z}/{x}/{y}.{ext}`
///
/// # Response
///
/// - `200 OK`: the tile, typed by extension
/// - `302 Found`: the tile lives elsewhere (`Location` header)
/// - `400 Bad Request`: malformed path or unknown extension
/// - `404 Not Found`: unknown layer, or no tile here
/// - `500 Internal Server Error`: rendering, store or cache failure
///
/// # Headers
///
/// - `Content-Type`
/// - `X-Tile-Cache-Hit: true|false`
/// - `Access-Control-Allow-Origin` if the layer sets an allowed origin
/// - `Cache-Control` and `Expires` if the layer sets a maximum cache age
pub async fn tile_handler(
    State(state): State<AppState>,
    Path(params): Path<TilePathParams>,
) -> Result<Response, HandlerError> {
    let (y, extension) = params.y_and_extension().ok_or_else(|| {
        HandlerError::BadRequest(format!(
            "Expected a tile path ending in {{y}}.{{ext}}, got \"{}\"",
            params.filename
        ))
    })?;
    let coord = params.coordinate(y);
    if !coord.in_grid() {
        return Err(HandlerError::BadRequest(format!(
            "Tile {} is outside the zoom {} grid",
            coord, coord.zoom
        )));
    }

    let outcome = state
        .tile_service
        .get_tile(&params.layer, coord, extension, false)
        .await?;

    match outcome {
        TileOutcome::Tile(response) => tile_response(response),
        TileOutcome::Redirect(location) => redirect_response(&location),
        TileOutcome::Skipped => Err(HandlerError::Skipped {
            layer: params.layer,
            coord,
        }),
    }
}

fn header_value(value: &str) -> Result<HeaderValue, HandlerError> {
    HeaderValue::from_str(value).map_err(|e| {
        HandlerError::Layer(LayerError::config(format!(
            "Invalid header value \"{}\": {}",
            value, e
        )))
    })
}

fn tile_response(response: TileResponse) -> Result<Response, HandlerError> {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(response.mime_type),
    );
    headers.insert(
        CACHE_HIT_HEADER,
        HeaderValue::from_static(if response.cache_hit { "true" } else { "false" }),
    );

    if let Some(origin) = &response.allowed_origin {
        headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, header_value(origin)?);
    }

    if let Some(age) = response.max_cache_age {
        headers.insert(
            header::CACHE_CONTROL,
            header_value(&format!("public, max-age={}", age.as_secs()))?,
        );
        if let Some(expires) = expires_at(age) {
            headers.insert(header::EXPIRES, header_value(&expires)?);
        }
    }

    Ok((StatusCode::OK, headers, Body::from(response.data)).into_response())
}

/// HTTP date `age` from now.
fn expires_at(age: Duration) -> Option<String> {
    let delta = chrono::Duration::from_std(age).ok()?;
    let expires = Utc::now().checked_add_signed(delta)?;
    Some(expires.format("%a, %d %b %Y %H:%M:%S GMT").to_string())
}

fn redirect_response(location: &str) -> Result<Response, HandlerError> {
    Ok((StatusCode::FOUND, [(header::LOCATION, header_value(location)?)]).into_response())
}

/// Handle health check requests.
///
/// # Endpoint
///
/// `GET /health`
///
/// # Response
///
/// `200 OK` with JSON body:
/// ```json
/// {
///   "status": "healthy",
///   "version": "0.1.0",
///   "layers": 3
/// }
/// ```
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        layers: state.tile_service.registry().len(),
    })
}

// =============================================================================
// Tests
// =============================================================================

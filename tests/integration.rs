//! Integration tests for Tilesmith.
//!
//! These tests verify end-to-end functionality including:
//! - Metatile rendering, slicing and cache fan-out
//! - Request handling through the tile service (locks, recent tiles, fallbacks)
//! - HTTP responses, headers and error mapping
//! - Loading layer configuration files from disk

mod integration {
    pub mod test_utils;

    pub mod api_tests;
    pub mod config_tests;
    pub mod render_tests;
    pub mod service_tests;
}

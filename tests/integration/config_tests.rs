//! Configuration file tests.
//!
//! Tests verify:
//! - Files are read from disk and palettes resolved next to them
//! - Sandwich layers composite the layers they name
//! - A loaded configuration serves tiles end to end

use std::path::PathBuf;

use tilesmith::error::ConfigError;
use tilesmith::geo::Coordinate;
use tilesmith::layer::{load_config, CacheConfig};
use tilesmith::tile::{TileOutcome, TileService};

use super::test_utils::decode;

/// A fresh directory under the system temp dir.
fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("tilesmith-{}-{}", name, std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

/// A two-colour palette: black and white, no transparency.
fn write_palette(path: &std::path::Path) {
    let mut act = vec![0u8; 768];
    act[3..6].copy_from_slice(&[0xFF, 0xFF, 0xFF]);
    act.extend_from_slice(&[0x00, 0x02, 0xFF, 0xFF]);
    std::fs::write(path, act).unwrap();
}

const LAYERS: &str = r##"{
    "cache": { "name": "memory", "entries": 64 },
    "layers": {
        "paper": {
            "provider": { "name": "sandwich", "stack": [ { "color": "#d8d8d8" } ] }
        },
        "ink": {
            "provider": {
                "name": "sandwich",
                "stack": [
                    { "src": "paper" },
                    { "color": "#000000", "mode": "multiply", "opacity": 0.0 }
                ]
            },
            "png options": { "palette": "palettes/bw.act" },
            "maximum cache age": 120
        }
    }
}"##;

#[tokio::test]
async fn test_load_config_from_disk() {
    let dir = scratch_dir("load");
    std::fs::create_dir_all(dir.join("palettes")).unwrap();
    write_palette(&dir.join("palettes/bw.act"));
    let path = dir.join("layers.json");
    std::fs::write(&path, LAYERS).unwrap();

    let loaded = load_config(&path).await.unwrap();
    assert_eq!(loaded.cache, CacheConfig::Memory { entries: 64 });
    assert_eq!(loaded.registry.names().collect::<Vec<_>>(), vec!["ink", "paper"]);

    let ink = loaded.registry.get("ink").unwrap();
    assert_eq!(ink.bitmap_palette().map(|p| p.bits()), Some(1));

    let service = TileService::new(loaded.registry, loaded.cache.backend());
    let coord = Coordinate::new(2, 1, 1);

    // Light grey paper snaps to white through the palette
    let png = match service.get_tile("ink", coord, "png", false).await.unwrap() {
        TileOutcome::Tile(response) => response,
        other => panic!("Expected a tile, got {:?}", other),
    };
    assert_eq!(png.max_cache_age.map(|d| d.as_secs()), Some(120));
    assert_eq!(decode(&png.data).get_pixel(0, 0).0, [0xFF, 0xFF, 0xFF, 0xFF]);

    // JPEG tiles are not palette-snapped
    let jpeg = match service.get_tile("ink", coord, "jpg", false).await.unwrap() {
        TileOutcome::Tile(response) => response,
        other => panic!("Expected a tile, got {:?}", other),
    };
    let pixel = decode(&jpeg.data).get_pixel(5, 5).0;
    assert!(pixel[0] > 0xC0 && pixel[0] < 0xF0, "unexpected pixel {:?}", pixel);

    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn test_missing_palette_names_layer() {
    let dir = scratch_dir("palette");
    let path = dir.join("layers.json");
    std::fs::write(&path, LAYERS).unwrap();

    match load_config(&path).await {
        Err(ConfigError::Layer { layer, .. }) => assert_eq!(layer, "ink"),
        other => panic!("Expected a layer error, got {:?}", other),
    }

    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn test_invalid_json() {
    let dir = scratch_dir("json");
    let path = dir.join("layers.json");
    std::fs::write(&path, "{ \"layers\": ").unwrap();

    assert!(matches!(load_config(&path).await, Err(ConfigError::Parse(_))));

    let _ = std::fs::remove_dir_all(&dir);
}

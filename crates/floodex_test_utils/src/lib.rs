//! Floodex Test Utilities
//!
//! On-disk fixtures for archive trees, GeoTIFF rasters, AOI files, tile
//! indexes, catalogs and configuration.
//!
//! # Usage
//!
//! ```rust,ignore
//! use floodex_test_utils::{ArchiveFixture, ensemble_name};
//!
//! let fx = ArchiveFixture::new();
//! let day = fx.day_dir(&fx.nrt_root(), "layers", "flood_extent", "EU020M", date);
//! fx.write_raster(&day, &ensemble_name("20230801T043012", "EU020M", "E051N012T3"), &[1, 1, 0, 0]);
//! let config = fx.write_config();
//! ```

use chrono::{Datelike, NaiveDate};
use serde_json::json;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tiff::encoder::{colortype, TiffEncoder};

/// Grid used by most fixtures.
pub const GRID: &str = "EU020M";

/// Flood extent filename of the ensemble product.
pub fn ensemble_name(time: &str, grid: &str, tile: &str) -> String {
    format!("ENSEMBLE_FLOOD_{}_VV_{}_{}.tif", time, grid, tile)
}

/// Flood extent filename of a single-provider product (`TUW`, `DLR`, `LIST`).
pub fn provider_name(tag: &str, time: &str, grid: &str, tile: &str) -> String {
    format!("{}_FLOOD_{}_VV_{}_{}.tif", tag, time, grid, tile)
}

/// Legacy `FLOOD-HM` flood extent filename.
pub fn legacy_hm_name(time: &str, grid: &str, tile: &str) -> String {
    format!("FLOOD-HM_{}_VVH_A099_{}_{}_V0M2R2_S1.tif", time, tile, grid)
}

/// Temporary archive with an `archive` (`.../output`) and an `nrt` root.
pub struct ArchiveFixture {
    temp: TempDir,
}

impl Default for ArchiveFixture {
    fn default() -> Self {
        Self::new()
    }
}

impl ArchiveFixture {
    pub fn new() -> Self {
        let temp = TempDir::new().expect("create fixture temp dir");
        Self { temp }
    }

    pub fn base(&self) -> &Path {
        self.temp.path()
    }

    /// Root of the 2015-2022 period. Its name makes it an archive layout.
    pub fn archive_root(&self) -> PathBuf {
        self.base().join("historical").join("output")
    }

    /// Root of the open-ended period from 2023.
    pub fn nrt_root(&self) -> PathBuf {
        self.base().join("realtime")
    }

    pub fn catalog_path(&self) -> PathBuf {
        self.base().join("catalog.csv")
    }

    pub fn aoi_dir(&self) -> PathBuf {
        self.base().join("aoi")
    }

    pub fn results_dir(&self) -> PathBuf {
        self.base().join("results")
    }

    pub fn layers_dir(&self) -> PathBuf {
        self.base().join("layers_out")
    }

    pub fn tile_index_path(&self) -> PathBuf {
        self.base().join("tile_index.json")
    }

    /// `{root}/{sub}/{layer_dir}/{grid}/YYYY/MM/DD`, created.
    pub fn day_dir(&self, root: &Path, sub: &str, layer_dir: &str, grid: &str, day: NaiveDate) -> PathBuf {
        let dir = root
            .join(sub)
            .join(layer_dir)
            .join(grid)
            .join(format!("{:04}", day.year()))
            .join(format!("{:02}", day.month()))
            .join(format!("{:02}", day.day()));
        fs::create_dir_all(&dir).expect("create day dir");
        dir
    }

    /// Create every layer directory for one grid under `root`.
    pub fn create_layer_dirs(&self, root: &Path, grid: &str) {
        let archive = root.file_name().map_or(false, |n| n == "output");
        let (exclusion, observed) = if archive {
            ("exclusion_layer", "observed_water")
        } else {
            ("exlusion_mask", "obswater_mask")
        };
        for sub in ["layers", "interim_layers"] {
            for layer in ["flood_extent", "uncertainty"] {
                fs::create_dir_all(root.join(sub).join(layer).join(grid)).expect("create layer dir");
            }
        }
        for layer in [exclusion, observed, "advisory_flags"] {
            fs::create_dir_all(root.join("layers").join(layer).join(grid)).expect("create layer dir");
        }
    }

    /// Write a `width` x 1 Gray8 TIFF holding `pixels`.
    pub fn write_raster(&self, dir: &Path, name: &str, pixels: &[u8]) -> PathBuf {
        fs::create_dir_all(dir).expect("create raster dir");
        let path = dir.join(name);
        let file = File::create(&path).expect("create raster");
        let mut encoder = TiffEncoder::new(file).expect("tiff encoder");
        encoder
            .write_image::<colortype::Gray8>(pixels.len() as u32, 1, pixels)
            .expect("write raster");
        path
    }

    /// Empty placeholder file.
    pub fn touch(&self, dir: &Path, name: &str) -> PathBuf {
        fs::create_dir_all(dir).expect("create dir");
        let path = dir.join(name);
        fs::write(&path, b"").expect("touch");
        path
    }

    /// AOI file with one Polygon feature per ring, rings in (lon, lat).
    pub fn write_aoi(&self, event_id: &str, rings: &[Vec<(f64, f64)>]) -> PathBuf {
        let features: Vec<_> = rings
            .iter()
            .map(|ring| {
                let coords: Vec<Vec<f64>> = ring.iter().map(|(lon, lat)| vec![*lon, *lat]).collect();
                json!({
                    "type": "Feature",
                    "properties": {},
                    "geometry": {"type": "Polygon", "coordinates": [coords]}
                })
            })
            .collect();
        let doc = json!({"type": "FeatureCollection", "features": features});
        fs::create_dir_all(self.aoi_dir()).expect("create aoi dir");
        let path = self.aoi_dir().join(format!("{}.json", event_id));
        fs::write(&path, doc.to_string()).expect("write aoi");
        path
    }

    /// Tile index from `(grid, tile, [min_lat, min_lon, max_lat, max_lon])`.
    pub fn write_tile_index(&self, tiles: &[(&str, &str, [f64; 4])]) -> PathBuf {
        let mut grids = serde_json::Map::new();
        for (grid, tile, extent) in tiles {
            let entry = grids
                .entry(grid.to_string())
                .or_insert_with(|| json!({}));
            if let Some(map) = entry.as_object_mut() {
                map.insert(tile.to_string(), json!(extent));
            }
        }
        let path = self.tile_index_path();
        fs::write(&path, serde_json::Value::Object(grids).to_string()).expect("write tile index");
        path
    }

    /// Catalog from `(id, country, fromdate, todate, grid)` rows.
    pub fn write_catalog(&self, rows: &[(&str, &str, &str, &str, &str)]) -> PathBuf {
        let mut text = String::from("GDACS_ID,country,fromdate,todate,equi7_grid_code,alertlevel\n");
        for (id, country, from, to, grid) in rows {
            text.push_str(&format!("{},{},{},{},{},Orange\n", id, country, from, to, grid));
        }
        let path = self.catalog_path();
        fs::write(&path, text).expect("write catalog");
        path
    }

    /// `floodex.toml` pointing every path at this fixture.
    pub fn write_config(&self) -> PathBuf {
        let toml = format!(
            r#"[paths]
catalog = "{catalog}"
aoi_dir = "{aoi}"
results_dir = "{results}"
layers_dir = "{layers}"
tile_index = "{tiles}"
log_dir = "{logs}"

[run]
buffer_days = 1
layers_buffer_days = 1

[raster]
read_timeout_secs = 10

[[storage_periods]]
name = "archive"
start = "2015-01-01"
end = "2022-12-31"
root = "{archive}"

[[storage_periods]]
name = "nrt"
start = "2023-01-01"
root = "{nrt}"
"#,
            catalog = self.catalog_path().display(),
            aoi = self.aoi_dir().display(),
            results = self.results_dir().display(),
            layers = self.layers_dir().display(),
            tiles = self.tile_index_path().display(),
            logs = self.base().join("logs").display(),
            archive = self.archive_root().display(),
            nrt = self.nrt_root().display(),
        );
        let path = self.base().join("floodex.toml");
        fs::write(&path, toml).expect("write config");
        path
    }
}

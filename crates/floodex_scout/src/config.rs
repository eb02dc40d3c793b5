//! Configuration for floodex runs

use crate::aoi::{AoiSelector, DEFAULT_BASE_TOLERANCE, DEFAULT_SIMPLIFY_STEPS};
use crate::error::{FloodexError, Result};
use crate::grammar::GrammarTable;
use crate::layout::{StorageLayout, StoragePeriod};
use crate::ledger::FlushPolicy;
use crate::metrics::{ProcessingMode, DEFAULT_PIXEL_SIZE_M};
use crate::raster::{TiffPixelCounter, DEFAULT_NODATA_VALUES};
use crate::register::DEFAULT_MAX_POLYGON_VERTICES;
use crate::types::Algorithm;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Largest day buffer accepted around an event window.
pub const MAX_BUFFER_DAYS: u32 = 366;

/// Main configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FloodexConfig {
    /// Input and output locations
    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub run: RunConfig,

    #[serde(default)]
    pub selection: SelectionConfig,

    #[serde(default)]
    pub raster: RasterConfig,

    /// Archive periods, oldest first
    #[serde(default = "default_storage_periods")]
    pub storage_periods: Vec<StoragePeriod>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "default_catalog")]
    pub catalog: PathBuf,

    /// Directory of `{event_id}.json` AOI files
    #[serde(default = "default_aoi_dir")]
    pub aoi_dir: PathBuf,

    /// Extent CSVs, extent ledger and extent markers
    #[serde(default = "default_results_dir")]
    pub results_dir: PathBuf,

    /// Retrieved layers, their ledger and markers
    #[serde(default = "default_layers_dir")]
    pub layers_dir: PathBuf,

    #[serde(default = "default_tile_index")]
    pub tile_index: PathBuf,

    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(default = "default_algorithms")]
    pub algorithms: Vec<Algorithm>,

    /// Day buffer around the event window for extent runs
    #[serde(default = "default_buffer_days")]
    pub buffer_days: u32,

    /// Day buffer for layer retrieval
    #[serde(default = "default_layers_buffer_days")]
    pub layers_buffer_days: u32,

    #[serde(default)]
    pub flush: FlushPolicy,

    /// Pixel-count workers per event; 0 reads sequentially
    #[serde(default)]
    pub workers: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionConfig {
    #[serde(default = "default_simplify_steps")]
    pub simplify_steps: u32,

    #[serde(default = "default_base_tolerance")]
    pub base_tolerance: f64,

    /// Polygons with more vertices are refused by the file register
    #[serde(default = "default_max_polygon_vertices")]
    pub max_polygon_vertices: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RasterConfig {
    #[serde(default = "default_pixel_size_m")]
    pub pixel_size_m: f64,

    #[serde(default = "default_nodata_values")]
    pub nodata_values: Vec<i64>,

    /// 0 disables the timeout
    #[serde(default = "default_read_timeout_secs")]
    pub read_timeout_secs: u64,
}

fn default_storage_periods() -> Vec<StoragePeriod> {
    vec![
        StoragePeriod {
            name: "archive".to_string(),
            start: NaiveDate::from_ymd_opt(2015, 1, 1).unwrap_or_default(),
            end: NaiveDate::from_ymd_opt(2022, 12, 31),
            root: PathBuf::from(
                "/eodc/private/jrc_gfm/gfm_scratch/historical-flood/V02/process/output",
            ),
        },
        StoragePeriod {
            name: "nrt".to_string(),
            start: NaiveDate::from_ymd_opt(2023, 1, 1).unwrap_or_default(),
            end: None,
            root: PathBuf::from("/eodc/private/jrc_gfm/gfm_scratch/realtime"),
        },
    ]
}

fn default_catalog() -> PathBuf {
    PathBuf::from("catalog.csv")
}

fn default_aoi_dir() -> PathBuf {
    PathBuf::from("aoi")
}

fn default_results_dir() -> PathBuf {
    PathBuf::from("results")
}

fn default_layers_dir() -> PathBuf {
    PathBuf::from("layers")
}

fn default_tile_index() -> PathBuf {
    PathBuf::from("tile_index.json")
}

fn default_algorithms() -> Vec<Algorithm> {
    Algorithm::ALL.to_vec()
}

fn default_buffer_days() -> u32 {
    1
}

fn default_layers_buffer_days() -> u32 {
    5
}

fn default_simplify_steps() -> u32 {
    DEFAULT_SIMPLIFY_STEPS
}

fn default_base_tolerance() -> f64 {
    DEFAULT_BASE_TOLERANCE
}

fn default_max_polygon_vertices() -> usize {
    DEFAULT_MAX_POLYGON_VERTICES
}

fn default_pixel_size_m() -> f64 {
    DEFAULT_PIXEL_SIZE_M
}

fn default_nodata_values() -> Vec<i64> {
    DEFAULT_NODATA_VALUES.to_vec()
}

fn default_read_timeout_secs() -> u64 {
    120
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            catalog: default_catalog(),
            aoi_dir: default_aoi_dir(),
            results_dir: default_results_dir(),
            layers_dir: default_layers_dir(),
            tile_index: default_tile_index(),
            log_dir: None,
        }
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            algorithms: default_algorithms(),
            buffer_days: default_buffer_days(),
            layers_buffer_days: default_layers_buffer_days(),
            flush: FlushPolicy::default(),
            workers: 0,
        }
    }
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            simplify_steps: default_simplify_steps(),
            base_tolerance: default_base_tolerance(),
            max_polygon_vertices: default_max_polygon_vertices(),
        }
    }
}

impl Default for RasterConfig {
    fn default() -> Self {
        Self {
            pixel_size_m: default_pixel_size_m(),
            nodata_values: default_nodata_values(),
            read_timeout_secs: default_read_timeout_secs(),
        }
    }
}

impl Default for FloodexConfig {
    fn default() -> Self {
        Self {
            paths: PathsConfig::default(),
            run: RunConfig::default(),
            selection: SelectionConfig::default(),
            raster: RasterConfig::default(),
            storage_periods: default_storage_periods(),
        }
    }
}

impl FloodexConfig {
    /// Load configuration from a TOML file and validate it
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: FloodexConfig = toml::from_str(&content)
            .map_err(|e| FloodexError::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| FloodexError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject settings no run could work with. Also checks the compiled-in
    /// filename grammars.
    pub fn validate(&self) -> Result<()> {
        self.storage_layout()?;
        GrammarTable::default().validate()?;

        if self.run.algorithms.is_empty() {
            return Err(FloodexError::Config("run.algorithms is empty".to_string()));
        }
        if !(self.selection.base_tolerance > 0.0) {
            return Err(FloodexError::Config(
                "selection.base_tolerance must be positive".to_string(),
            ));
        }
        for (key, days) in [
            ("run.buffer_days", self.run.buffer_days),
            ("run.layers_buffer_days", self.run.layers_buffer_days),
        ] {
            if days > MAX_BUFFER_DAYS {
                return Err(FloodexError::Config(format!(
                    "{} is {}, at most {} allowed",
                    key, days, MAX_BUFFER_DAYS
                )));
            }
        }
        if self.selection.max_polygon_vertices < 4 {
            return Err(FloodexError::Config(
                "selection.max_polygon_vertices must be at least 4".to_string(),
            ));
        }
        if !(self.raster.pixel_size_m > 0.0) {
            return Err(FloodexError::Config(
                "raster.pixel_size_m must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn storage_layout(&self) -> Result<StorageLayout> {
        StorageLayout::new(self.storage_periods.clone())
    }

    pub fn selector(&self) -> AoiSelector {
        AoiSelector::new(self.selection.simplify_steps, self.selection.base_tolerance)
    }

    pub fn pixel_counter(&self) -> TiffPixelCounter {
        let timeout = match self.raster.read_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };
        TiffPixelCounter::new(self.raster.nodata_values.clone(), timeout)
    }

    pub fn processing_mode(&self) -> ProcessingMode {
        ProcessingMode::from_workers(self.run.workers)
    }

    /// Extent ledger location.
    pub fn extent_ledger_path(&self) -> PathBuf {
        self.paths.results_dir.join("ledger.csv")
    }

    /// Layer retrieval ledger location.
    pub fn layers_ledger_path(&self) -> PathBuf {
        self.paths.layers_dir.join("layers_ledger.csv")
    }
}

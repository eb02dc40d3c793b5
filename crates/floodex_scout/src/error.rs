//! Error types for flood-product discovery and processing

use chrono::NaiveDate;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Floodex error type
#[derive(Error, Debug)]
pub enum FloodexError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] geojson::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("No storage period covers {date}")]
    NoStoragePeriod { date: NaiveDate },

    #[error("Storage periods '{first}' and '{second}' overlap")]
    OverlappingPeriods { first: String, second: String },

    #[error("Layer directories missing:\n{}", format_paths(.missing))]
    LayerDirectoryMissing { missing: Vec<PathBuf> },

    #[error("Filename grammar error: {0}")]
    Grammar(String),

    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("Selection error: {0}")]
    Selection(#[from] SelectionError),

    #[error("Raster error: {0}")]
    Raster(#[from] RasterReadError),

    #[error("Invalid state: {0}")]
    InvalidState(String),
}

fn format_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Refusal from the geometry engine while selecting by polygon.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SelectionError {
    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("polygon has {vertices} vertices, engine limit is {limit}")]
    TooComplex { vertices: usize, limit: usize },

    #[error("unsupported spatial reference EPSG:{0}")]
    UnsupportedReference(u32),
}

/// Why a single raster could not be read.
///
/// Callers skip the file and keep going; the variant is only there so the
/// log says which of these actually happened.
#[derive(Error, Debug)]
pub enum RasterReadError {
    #[error("raster not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("permission denied: {}", .0.display())]
    PermissionDenied(PathBuf),

    #[error("corrupt raster {}: {reason}", .path.display())]
    Corrupt { path: PathBuf, reason: String },

    #[error("unsupported raster {}: {reason}", .path.display())]
    Unsupported { path: PathBuf, reason: String },

    #[error("read of {} timed out after {secs}s", .path.display())]
    TimedOut { path: PathBuf, secs: u64 },

    #[error("IO error reading {}: {source}", .path.display())]
    Io { path: PathBuf, source: io::Error },
}

impl RasterReadError {
    pub fn from_io(path: &Path, err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => Self::NotFound(path.to_path_buf()),
            io::ErrorKind::PermissionDenied => Self::PermissionDenied(path.to_path_buf()),
            _ => Self::Io {
                path: path.to_path_buf(),
                source: err,
            },
        }
    }

    /// Short label for log fields.
    pub fn cause(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "missing",
            Self::PermissionDenied(_) => "permission",
            Self::Corrupt { .. } => "corrupt",
            Self::Unsupported { .. } => "unsupported",
            Self::TimedOut { .. } => "timeout",
            Self::Io { .. } => "io",
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, FloodexError>;

//! Spatial dataset seam
//!
//! The AOI selector and the batch code only ever talk to a dataset through
//! [`SpatialDataset`]. The built-in implementation is
//! [`crate::register::FileRegister`]; tests substitute their own.

use crate::error::{Result, SelectionError};
use crate::grammar::GrammarEntry;
use crate::layout::LayoutVersion;
use crate::types::{Algorithm, Layer};
use geo::Polygon;
use std::path::PathBuf;

/// Coordinate reference system, by EPSG code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SpatialRef {
    pub epsg: u32,
}

impl SpatialRef {
    /// Geographic lat/lon, the reference of every AOI file.
    pub const WGS84: SpatialRef = SpatialRef { epsg: 4326 };
}

/// A table of raster files with decoded filename fields and footprints.
pub trait SpatialDataset: Sized + Send + Sync {
    /// Number of rows (files).
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Rows whose footprint intersects `polygon`.
    ///
    /// `Ok(None)` means nothing intersected. An `Err` is a refusal by the
    /// geometry engine and is recoverable by simplifying the polygon.
    fn select_polygon(
        &self,
        polygon: &Polygon<f64>,
        sref: SpatialRef,
    ) -> std::result::Result<Option<Self>, SelectionError>;

    /// Rows whose `field` equals `value`.
    fn select_by_attribute(&self, field: &str, value: &str) -> Self;

    /// File paths in row order.
    fn filepaths(&self) -> Vec<PathBuf>;

    /// Values of `field` in row order.
    fn attribute_values(&self, field: &str) -> Vec<String>;
}

/// Builds a dataset from indexed files.
pub trait DatasetBuilder: Send + Sync {
    type Dataset: SpatialDataset;

    /// `grammar` is the entry selected for (algorithm, layer, version); the
    /// builder may still pick the legacy entry for individual files.
    fn build(
        &self,
        files: &[PathBuf],
        algorithm: Algorithm,
        layer: Layer,
        version: LayoutVersion,
        grammar: &GrammarEntry,
    ) -> Result<Self::Dataset>;
}

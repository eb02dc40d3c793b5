//! Storage layout resolution
//!
//! The archive is split into storage periods, each with its own root:
//!
//! ```text
//! {period root}/layers/{layer}/{grid}/YYYY/MM/DD/*.tif          (ensemble + context layers)
//! {period root}/interim_layers/{layer}/{grid}/YYYY/MM/DD/*.tif  (single-provider products)
//! ```
//!
//! Context layer directory names differ between layout versions. The version
//! is read off the name of the period root directory through
//! [`LAYOUT_VERSIONS`], so a new layout only needs a new table row.

use crate::error::{FloodexError, Result};
use crate::types::{Algorithm, Layer};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Archival storage period. Immutable once the layout is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoragePeriod {
    pub name: String,
    pub start: NaiveDate,
    /// Inclusive end; `None` means open-ended
    #[serde(default)]
    pub end: Option<NaiveDate>,
    pub root: PathBuf,
}

impl StoragePeriod {
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && self.end.map_or(true, |end| date <= end)
    }

    fn overlaps(&self, other: &StoragePeriod) -> bool {
        let self_end = self.end.unwrap_or(NaiveDate::MAX);
        let other_end = other.end.unwrap_or(NaiveDate::MAX);
        self.start <= other_end && other.start <= self_end
    }
}

/// Sub-root convention under a period root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sublayout {
    /// `layers`: ensemble products and all context layers
    Primary,
    /// `interim_layers`: single-provider products
    Interim,
}

impl Sublayout {
    pub fn dir_name(&self) -> &'static str {
        match self {
            Self::Primary => "layers",
            Self::Interim => "interim_layers",
        }
    }

    pub fn for_algorithm(algorithm: Algorithm) -> Self {
        if algorithm.uses_primary_layers() {
            Self::Primary
        } else {
            Self::Interim
        }
    }
}

/// Layout version of a period root, used to pick directory names and grammars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayoutVersion {
    /// Historical reprocessing archive
    Archive,
    /// Near-real-time production
    NearRealTime,
}

impl LayoutVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Archive => "archive",
            Self::NearRealTime => "nrt",
        }
    }

    /// Directory name of a layer under `{root}/layers` or `{root}/interim_layers`.
    pub fn layer_dir_name(&self, layer: Layer) -> &'static str {
        match (self, layer) {
            (_, Layer::FloodExtent) => "flood_extent",
            (_, Layer::Uncertainty) => "uncertainty",
            (_, Layer::AdvisoryFlags) => "advisory_flags",
            (Self::Archive, Layer::Exclusion) => "exclusion_layer",
            (Self::Archive, Layer::ObservedWater) => "observed_water",
            // the production tree really is spelled this way
            (Self::NearRealTime, Layer::Exclusion) => "exlusion_mask",
            (Self::NearRealTime, Layer::ObservedWater) => "obswater_mask",
        }
    }
}

impl fmt::Display for LayoutVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Period-root directory name → layout version. Unlisted names are near-real-time.
pub const LAYOUT_VERSIONS: &[(&str, LayoutVersion)] = &[("output", LayoutVersion::Archive)];

/// Discriminate the layout version from a period root directory.
pub fn layout_version_of(storage_root: &Path) -> LayoutVersion {
    let name = storage_root
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("");
    LAYOUT_VERSIONS
        .iter()
        .find(|(dir, _)| *dir == name)
        .map(|(_, version)| *version)
        .unwrap_or(LayoutVersion::NearRealTime)
}

/// Resolved root for one date and algorithm.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutRoot {
    pub period: String,
    pub storage_root: PathBuf,
    pub sublayout: Sublayout,
    pub version: LayoutVersion,
}

impl LayoutRoot {
    /// `{storage_root}/{layers|interim_layers}`
    pub fn sub_root(&self) -> PathBuf {
        self.storage_root.join(self.sublayout.dir_name())
    }

    /// Directory holding a layer for a grid.
    ///
    /// Flood extent and uncertainty sit under the algorithm's sub-root, context
    /// layers always under the primary one.
    pub fn layer_dir(&self, layer: Layer, grid_code: &str) -> PathBuf {
        let base = if layer.is_algorithm_specific() {
            self.sub_root()
        } else {
            self.storage_root.join(Sublayout::Primary.dir_name())
        };
        base.join(self.version.layer_dir_name(layer)).join(grid_code)
    }
}

/// Ordered, disjoint storage periods.
#[derive(Debug, Clone)]
pub struct StorageLayout {
    periods: Vec<StoragePeriod>,
}

impl StorageLayout {
    /// Build a layout, rejecting overlapping periods.
    pub fn new(periods: Vec<StoragePeriod>) -> Result<Self> {
        for (i, a) in periods.iter().enumerate() {
            if let Some(end) = a.end {
                if end < a.start {
                    return Err(FloodexError::Config(format!(
                        "storage period '{}' ends before it starts",
                        a.name
                    )));
                }
            }
            for b in &periods[i + 1..] {
                if a.overlaps(b) {
                    return Err(FloodexError::OverlappingPeriods {
                        first: a.name.clone(),
                        second: b.name.clone(),
                    });
                }
            }
        }
        Ok(Self { periods })
    }

    pub fn periods(&self) -> &[StoragePeriod] {
        &self.periods
    }

    pub fn period_for(&self, date: NaiveDate) -> Result<&StoragePeriod> {
        self.periods
            .iter()
            .find(|p| p.contains(date))
            .ok_or(FloodexError::NoStoragePeriod { date })
    }

    pub fn resolve_root(&self, date: NaiveDate) -> Result<&Path> {
        Ok(self.period_for(date)?.root.as_path())
    }

    pub fn resolve_layout_root(&self, date: NaiveDate, algorithm: Algorithm) -> Result<LayoutRoot> {
        let period = self.period_for(date)?;
        Ok(LayoutRoot {
            period: period.name.clone(),
            storage_root: period.root.clone(),
            sublayout: Sublayout::for_algorithm(algorithm),
            version: layout_version_of(&period.root),
        })
    }

    /// Flood-extent directory for the single-layer index.
    pub fn flood_extent_dir(
        &self,
        date: NaiveDate,
        grid_code: &str,
        algorithm: Algorithm,
    ) -> Result<PathBuf> {
        Ok(self
            .resolve_layout_root(date, algorithm)?
            .layer_dir(Layer::FloodExtent, grid_code))
    }

    /// All five layer directories, failing if any of them is absent.
    pub fn layer_dirs(
        &self,
        date: NaiveDate,
        grid_code: &str,
        algorithm: Algorithm,
    ) -> Result<(LayoutRoot, Vec<(Layer, PathBuf)>)> {
        let root = self.resolve_layout_root(date, algorithm)?;
        let dirs: Vec<(Layer, PathBuf)> = Layer::ALL
            .iter()
            .map(|layer| (*layer, root.layer_dir(*layer, grid_code)))
            .collect();

        let missing: Vec<PathBuf> = dirs
            .iter()
            .filter(|(_, dir)| !dir.is_dir())
            .map(|(_, dir)| dir.clone())
            .collect();
        if !missing.is_empty() {
            return Err(FloodexError::LayerDirectoryMissing { missing });
        }

        Ok((root, dirs))
    }
}

//! Core types for flood-product discovery
//!
//! Algorithms name the flood-detection providers, layers name the raster
//! product families, and statuses form the closed vocabulary stored in the
//! processing ledger.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

// ============================================================================
// Algorithms
// ============================================================================

/// Flood-detection product whose files are being discovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Algorithm {
    /// Ensemble product, stored under the primary `layers` tree
    Ensemble,
    /// TU Wien algorithm, `TUW` prefix (legacy `FLOOD-HM`)
    Tuw,
    /// LIST algorithm, `LIST` prefix
    List,
    /// DLR algorithm, `DLR` prefix
    Dlr,
}

/// Filename prefix of the legacy product that stands in for TUW files.
pub const LEGACY_HM_TAG: &str = "FLOOD-HM";

impl Algorithm {
    pub const ALL: [Algorithm; 4] = [
        Algorithm::Ensemble,
        Algorithm::Tuw,
        Algorithm::List,
        Algorithm::Dlr,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ensemble => "ensemble",
            Self::Tuw => "tuw",
            Self::List => "list",
            Self::Dlr => "dlr",
        }
    }

    /// Filename prefix for single-provider products. Ensemble files carry none.
    pub fn tag(&self) -> Option<&'static str> {
        match self {
            Self::Ensemble => None,
            Self::Tuw => Some("TUW"),
            Self::List => Some("LIST"),
            Self::Dlr => Some("DLR"),
        }
    }

    /// Prefix accepted when no file carries [`Algorithm::tag`].
    pub fn legacy_tag(&self) -> Option<&'static str> {
        match self {
            Self::Tuw => Some(LEGACY_HM_TAG),
            _ => None,
        }
    }

    /// Whether products live under the primary (`layers`) sub-root.
    pub fn uses_primary_layers(&self) -> bool {
        matches!(self, Self::Ensemble)
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Algorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ensemble" => Ok(Self::Ensemble),
            "tuw" => Ok(Self::Tuw),
            "list" => Ok(Self::List),
            "dlr" => Ok(Self::Dlr),
            other => Err(format!(
                "unknown algorithm '{}' (expected ensemble, tuw, list or dlr)",
                other
            )),
        }
    }
}

// ============================================================================
// Layers
// ============================================================================

/// Raster product family for one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Layer {
    FloodExtent,
    Uncertainty,
    Exclusion,
    ObservedWater,
    AdvisoryFlags,
}

impl Layer {
    pub const ALL: [Layer; 5] = [
        Layer::FloodExtent,
        Layer::Uncertainty,
        Layer::Exclusion,
        Layer::ObservedWater,
        Layer::AdvisoryFlags,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FloodExtent => "flood_extent",
            Self::Uncertainty => "uncertainty",
            Self::Exclusion => "exclusion",
            Self::ObservedWater => "observed_water",
            Self::AdvisoryFlags => "advisory_flags",
        }
    }

    /// Flood extent and uncertainty follow per-algorithm naming; context layers do not.
    pub fn is_algorithm_specific(&self) -> bool {
        matches!(self, Self::FloodExtent | Self::Uncertainty)
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Processing status
// ============================================================================

/// Per event, per algorithm outcome stored in the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    /// Row created, nothing recorded yet
    Unprocessed,
    /// No AOI polygon found for the event
    NoAoi,
    /// No product intersected the AOI (or nothing was indexed)
    NoData,
    /// Layers retrieved
    Done,
    /// Unexpected failure, retried on the next invocation
    Error,
    /// At least one timestamp had flooded pixels
    Detected,
    /// Every timestamp had zero flooded pixels
    Missed,
}

impl ProcessingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unprocessed => "",
            Self::NoAoi => "no_aoi",
            Self::NoData => "no_data",
            Self::Done => "done",
            Self::Error => "error",
            Self::Detected => "detected",
            Self::Missed => "missed",
        }
    }

    /// Display label; the unprocessed state is stored as an empty cell.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Unprocessed => "unprocessed",
            other => other.as_str(),
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "" | "unprocessed" => Some(Self::Unprocessed),
            "no_aoi" => Some(Self::NoAoi),
            "no_data" => Some(Self::NoData),
            "done" => Some(Self::Done),
            "error" => Some(Self::Error),
            "detected" => Some(Self::Detected),
            "missed" => Some(Self::Missed),
            _ => None,
        }
    }
}

impl fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ============================================================================
// Events and indexed files
// ============================================================================

/// One row of the flood-event catalog. Never mutated by the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct FloodEvent {
    pub id: String,
    pub country: String,
    pub from: NaiveDateTime,
    pub to: NaiveDateTime,
    pub grid_code: String,
    pub alert_level: Option<String>,
}

/// Indexed files of the five layers for one event, algorithm and window.
///
/// Each list is sorted by path and comes from a single storage period.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LayerImageSet {
    pub flood_extent: Vec<PathBuf>,
    pub uncertainty: Vec<PathBuf>,
    pub exclusion: Vec<PathBuf>,
    pub observed_water: Vec<PathBuf>,
    pub advisory_flags: Vec<PathBuf>,
}

impl LayerImageSet {
    pub fn get(&self, layer: Layer) -> &[PathBuf] {
        match layer {
            Layer::FloodExtent => &self.flood_extent,
            Layer::Uncertainty => &self.uncertainty,
            Layer::Exclusion => &self.exclusion,
            Layer::ObservedWater => &self.observed_water,
            Layer::AdvisoryFlags => &self.advisory_flags,
        }
    }

    pub fn get_mut(&mut self, layer: Layer) -> &mut Vec<PathBuf> {
        match layer {
            Layer::FloodExtent => &mut self.flood_extent,
            Layer::Uncertainty => &mut self.uncertainty,
            Layer::Exclusion => &mut self.exclusion,
            Layer::ObservedWater => &mut self.observed_water,
            Layer::AdvisoryFlags => &mut self.advisory_flags,
        }
    }

    pub fn total(&self) -> usize {
        Layer::ALL.iter().map(|layer| self.get(*layer).len()).sum()
    }
}

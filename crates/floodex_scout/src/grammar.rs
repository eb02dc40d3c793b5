//! Filename grammars
//!
//! Product filenames are `_`-joined fixed-width fields. Which widths apply
//! depends on the algorithm, the layer and the layout version, plus the
//! legacy `FLOOD-HM` naming that can stand in for TUW flood extents. All of
//! that lives in one table, looked up by key and checked once at startup.

use crate::error::{FloodexError, Result};
use crate::layout::LayoutVersion;
use crate::types::{Algorithm, Layer};
use std::collections::HashSet;
use std::path::Path;

/// Separator between filename fields.
pub const FIELD_SEPARATOR: char = '_';

/// One fixed-width filename field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    pub name: &'static str,
    pub width: usize,
}

const fn field(name: &'static str, width: usize) -> Field {
    Field { name, width }
}

/// Which algorithms an entry applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlgorithmMatch {
    Any,
    Only(Algorithm),
}

impl AlgorithmMatch {
    fn matches(&self, algorithm: Algorithm) -> bool {
        match self {
            Self::Any => true,
            Self::Only(a) => *a == algorithm,
        }
    }
}

/// A row of the grammar table.
#[derive(Debug, Clone, Copy)]
pub struct GrammarEntry {
    pub algorithm: AlgorithmMatch,
    pub layer: Layer,
    /// `None` applies to every layout version
    pub version: Option<LayoutVersion>,
    /// Entry for files carrying the algorithm's legacy tag
    pub legacy: bool,
    pub fields: &'static [Field],
    /// Expected stem length (fields plus separators)
    pub stem_len: usize,
}

impl GrammarEntry {
    fn matches(&self, algorithm: Algorithm, layer: Layer, version: LayoutVersion, legacy: bool) -> bool {
        self.algorithm.matches(algorithm)
            && self.layer == layer
            && self.version.map_or(true, |v| v == version)
            && self.legacy == legacy
    }

    /// Field names in order, for handing to a dataset builder.
    pub fn field_names(&self) -> Vec<&'static str> {
        self.fields.iter().map(|f| f.name).collect()
    }

    /// Split a filename stem into field values.
    pub fn decode(&self, stem: &str) -> Result<DecodedName> {
        let parts: Vec<&str> = stem.split(FIELD_SEPARATOR).collect();
        if parts.len() != self.fields.len() {
            return Err(FloodexError::Grammar(format!(
                "'{}' has {} fields, expected {}",
                stem,
                parts.len(),
                self.fields.len()
            )));
        }

        let mut values = Vec::with_capacity(parts.len());
        for (part, field) in parts.iter().zip(self.fields) {
            if part.len() != field.width {
                return Err(FloodexError::Grammar(format!(
                    "'{}': field '{}' is '{}' ({} chars), expected {} chars",
                    stem,
                    field.name,
                    part,
                    part.len(),
                    field.width
                )));
            }
            values.push((field.name, part.to_string()));
        }
        Ok(DecodedName { values })
    }

    fn validate(&self) -> std::result::Result<(), String> {
        if self.fields.is_empty() {
            return Err("no fields".to_string());
        }
        let mut seen = HashSet::new();
        for f in self.fields {
            if !seen.insert(f.name) {
                return Err(format!("duplicate field '{}'", f.name));
            }
        }
        for required in ["time", "tile_name"] {
            if !seen.contains(required) {
                return Err(format!("missing required field '{}'", required));
            }
        }
        let total: usize =
            self.fields.iter().map(|f| f.width).sum::<usize>() + self.fields.len() - 1;
        if total != self.stem_len {
            return Err(format!(
                "field widths add up to {} but stem length is {}",
                total, self.stem_len
            ));
        }
        Ok(())
    }
}

/// Field values decoded from one filename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedName {
    values: Vec<(&'static str, String)>,
}

impl DecodedName {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &str)> {
        self.values.iter().map(|(n, v)| (*n, v.as_str()))
    }
}

// ============================================================================
// Field layouts
// ============================================================================

const ENSEMBLE_FLOOD: &[Field] = &[
    field("algorithm", 8),
    field("var_name", 5),
    field("time", 15),
    field("pol", 2),
    field("equi7_grid", 6),
    field("tile_name", 10),
];

// TUW and DLR share widths
const TRIGRAM_FLOOD: &[Field] = &[
    field("algorithm", 3),
    field("var_name", 5),
    field("time", 15),
    field("pol", 2),
    field("equi7_grid", 6),
    field("tile_name", 10),
];

const LIST_FLOOD: &[Field] = &[
    field("algorithm", 4),
    field("var_name", 5),
    field("time", 15),
    field("pol", 2),
    field("equi7_grid", 6),
    field("tile_name", 10),
];

const HM_FLOOD: &[Field] = &[
    field("algorithm", 8),
    field("time", 15),
    field("pol", 3),
    field("orbit", 4),
    field("tile_name", 10),
    field("equi7_grid", 6),
    field("param3", 6),
    field("param4", 2),
];

const ENSEMBLE_UNCERTAINTY: &[Field] = &[
    field("algorithm", 8),
    field("var_name", 11),
    field("time", 15),
    field("pol", 2),
    field("equi7_grid", 6),
    field("tile_name", 10),
];

const ARCHIVE_UNCERTAINTY: &[Field] = &[
    field("algorithm", 3),
    field("var_name", 4),
    field("time", 15),
    field("pol", 2),
    field("equi7_grid", 6),
    field("tile_name", 10),
];

const ARCHIVE_LIST_UNCERTAINTY: &[Field] = &[
    field("algorithm", 4),
    field("var_name", 4),
    field("time", 15),
    field("pol", 2),
    field("equi7_grid", 6),
    field("tile_name", 10),
];

const NRT_UNCERTAINTY: &[Field] = &[
    field("algorithm", 3),
    field("var_name", 11),
    field("time", 15),
    field("pol", 2),
    field("equi7_grid", 6),
    field("tile_name", 10),
];

const NRT_LIST_UNCERTAINTY: &[Field] = &[
    field("algorithm", 4),
    field("var_name", 11),
    field("time", 15),
    field("pol", 2),
    field("equi7_grid", 6),
    field("tile_name", 10),
];

const NRT_EXCLUSION: &[Field] = &[
    field("algorithm", 8),
    field("var_name", 8),
    field("time", 15),
    field("pol", 2),
    field("equi7_grid", 6),
    field("tile_name", 10),
];

// EXCLUSION_LAYER_...
const ARCHIVE_EXCLUSION: &[Field] = &[
    field("algorithm", 9),
    field("var_name", 5),
    field("time", 15),
    field("pol", 2),
    field("equi7_grid", 6),
    field("tile_name", 10),
];

// xxxxxxxx_OBSWATER_...
const NRT_OBSERVED_WATER: &[Field] = &[
    field("algorithm", 8),
    field("var_name", 8),
    field("time", 15),
    field("pol", 2),
    field("equi7_grid", 6),
    field("tile_name", 10),
];

// OBSERVED_WATER_...
const ARCHIVE_OBSERVED_WATER: &[Field] = &[
    field("algorithm", 8),
    field("var_name", 5),
    field("time", 15),
    field("pol", 2),
    field("equi7_grid", 6),
    field("tile_name", 10),
];

// ADVFLAG_{time}__VV_A099_E048N021T3_EQUI7_AS020M_V0M2R2_S1
const NRT_ADVISORY: &[Field] = &[
    field("var_name", 7),
    field("time", 15),
    field("empty", 0),
    field("pol", 2),
    field("orbit", 4),
    field("tile_name", 10),
    field("equi7_tag", 5),
    field("equi7_grid", 6),
    field("version", 6),
    field("sensor", 2),
];

const ARCHIVE_ADVISORY: &[Field] = &[
    field("var_name", 7),
    field("time", 15),
    field("pol", 2),
    field("equi7_grid", 6),
    field("tile_name", 10),
];

const fn entry(
    algorithm: AlgorithmMatch,
    layer: Layer,
    version: Option<LayoutVersion>,
    legacy: bool,
    fields: &'static [Field],
    stem_len: usize,
) -> GrammarEntry {
    GrammarEntry {
        algorithm,
        layer,
        version,
        legacy,
        fields,
        stem_len,
    }
}

use AlgorithmMatch::{Any, Only};
use LayoutVersion::{Archive, NearRealTime};

/// The grammar table. Lookup takes the first matching row.
pub const GRAMMARS: &[GrammarEntry] = &[
    // flood extent
    entry(Only(Algorithm::Ensemble), Layer::FloodExtent, None, false, ENSEMBLE_FLOOD, 51),
    entry(Only(Algorithm::Tuw), Layer::FloodExtent, None, false, TRIGRAM_FLOOD, 46),
    entry(Only(Algorithm::Tuw), Layer::FloodExtent, None, true, HM_FLOOD, 61),
    entry(Only(Algorithm::Dlr), Layer::FloodExtent, None, false, TRIGRAM_FLOOD, 46),
    entry(Only(Algorithm::List), Layer::FloodExtent, None, false, LIST_FLOOD, 47),
    // uncertainty
    entry(Only(Algorithm::Ensemble), Layer::Uncertainty, None, false, ENSEMBLE_UNCERTAINTY, 57),
    entry(Only(Algorithm::List), Layer::Uncertainty, Some(Archive), false, ARCHIVE_LIST_UNCERTAINTY, 46),
    entry(Only(Algorithm::List), Layer::Uncertainty, Some(NearRealTime), false, NRT_LIST_UNCERTAINTY, 53),
    entry(Any, Layer::Uncertainty, Some(Archive), false, ARCHIVE_UNCERTAINTY, 45),
    entry(Any, Layer::Uncertainty, Some(NearRealTime), false, NRT_UNCERTAINTY, 52),
    // context layers
    entry(Any, Layer::Exclusion, Some(Archive), false, ARCHIVE_EXCLUSION, 52),
    entry(Any, Layer::Exclusion, Some(NearRealTime), false, NRT_EXCLUSION, 54),
    entry(Any, Layer::ObservedWater, Some(Archive), false, ARCHIVE_OBSERVED_WATER, 51),
    entry(Any, Layer::ObservedWater, Some(NearRealTime), false, NRT_OBSERVED_WATER, 54),
    entry(Any, Layer::AdvisoryFlags, Some(Archive), false, ARCHIVE_ADVISORY, 44),
    entry(Any, Layer::AdvisoryFlags, Some(NearRealTime), false, NRT_ADVISORY, 66),
];

/// Lookup over [`GRAMMARS`].
#[derive(Debug, Clone, Copy)]
pub struct GrammarTable {
    entries: &'static [GrammarEntry],
}

impl Default for GrammarTable {
    fn default() -> Self {
        Self { entries: GRAMMARS }
    }
}

impl GrammarTable {
    pub fn new(entries: &'static [GrammarEntry]) -> Self {
        Self { entries }
    }

    pub fn lookup(
        &self,
        algorithm: Algorithm,
        layer: Layer,
        version: LayoutVersion,
    ) -> Option<&'static GrammarEntry> {
        self.find(algorithm, layer, version, false)
    }

    /// Grammar for a concrete file, honoring the legacy tag fallback.
    pub fn for_file(
        &self,
        algorithm: Algorithm,
        layer: Layer,
        version: LayoutVersion,
        file_name: &str,
    ) -> Option<&'static GrammarEntry> {
        let legacy = algorithm
            .legacy_tag()
            .map_or(false, |tag| file_name.starts_with(tag));
        if legacy {
            if let Some(entry) = self.find(algorithm, layer, version, true) {
                return Some(entry);
            }
        }
        self.lookup(algorithm, layer, version)
    }

    /// Decode a path's stem with the grammar that applies to it.
    pub fn decode_path(
        &self,
        algorithm: Algorithm,
        layer: Layer,
        version: LayoutVersion,
        path: &Path,
    ) -> Result<DecodedName> {
        let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
        let stem = path.file_stem().and_then(|n| n.to_str()).unwrap_or("");
        let entry = self
            .for_file(algorithm, layer, version, file_name)
            .ok_or_else(|| {
                FloodexError::Grammar(format!(
                    "no grammar for {}/{}/{}",
                    algorithm, layer, version
                ))
            })?;
        entry.decode(stem)
    }

    fn find(
        &self,
        algorithm: Algorithm,
        layer: Layer,
        version: LayoutVersion,
        legacy: bool,
    ) -> Option<&'static GrammarEntry> {
        self.entries
            .iter()
            .find(|e| e.matches(algorithm, layer, version, legacy))
    }

    /// Check every row and that every (algorithm, layer, version) resolves.
    pub fn validate(&self) -> Result<()> {
        for (i, entry) in self.entries.iter().enumerate() {
            entry.validate().map_err(|reason| {
                FloodexError::Grammar(format!(
                    "entry {} ({:?}/{}): {}",
                    i, entry.algorithm, entry.layer, reason
                ))
            })?;
        }

        for algorithm in Algorithm::ALL {
            for layer in Layer::ALL {
                for version in [Archive, NearRealTime] {
                    if self.lookup(algorithm, layer, version).is_none() {
                        return Err(FloodexError::Grammar(format!(
                            "no grammar for {}/{}/{}",
                            algorithm, layer, version
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

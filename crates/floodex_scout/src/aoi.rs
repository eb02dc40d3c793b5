//! Area-of-interest loading and selection
//!
//! AOI files are GeoJSON in (lon, lat) order; polygons are kept in
//! (lat, lon) order internally so they line up with tile footprints.
//!
//! Selection walks a fixed ladder: exact polygon, then the polygon simplified
//! at increasing tolerances, then its bounding box. Whatever comes out is
//! dropped if it did not actually reduce the dataset.

use crate::error::Result;
use crate::spatial::{SpatialDataset, SpatialRef};
use geo::{BoundingRect, LineString, Polygon, Simplify};
use geojson::{GeoJson, Geometry, Value};
use std::fmt;
use std::fs;
use std::path::PathBuf;
use tracing::{debug, warn};

/// AOI polygons of one event.
#[derive(Debug, Clone, PartialEq)]
pub struct EventAoi {
    pub polygons: Vec<Polygon<f64>>,
    pub sref: SpatialRef,
}

/// Where AOIs come from. `Ok(None)` means the event has no AOI.
pub trait AoiSource: Send + Sync {
    fn load(&self, event_id: &str) -> Result<Option<EventAoi>>;
}

/// Reads `{dir}/{event_id}.json`.
#[derive(Debug, Clone)]
pub struct GeoJsonAoiSource {
    dir: PathBuf,
}

impl GeoJsonAoiSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, event_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", event_id))
    }
}

impl AoiSource for GeoJsonAoiSource {
    fn load(&self, event_id: &str) -> Result<Option<EventAoi>> {
        let path = self.path_for(event_id);
        if !path.is_file() {
            return Ok(None);
        }
        let text = fs::read_to_string(&path)?;
        let geojson: GeoJson = text.parse()?;
        let polygons = polygons_of(&geojson);
        if polygons.is_empty() {
            debug!(event_id, path = %path.display(), "AOI file has no polygons");
            return Ok(None);
        }
        Ok(Some(EventAoi {
            polygons,
            sref: SpatialRef::WGS84,
        }))
    }
}

/// Polygon exteriors in (lat, lon) order. Points and lines are ignored.
pub fn polygons_of(geojson: &GeoJson) -> Vec<Polygon<f64>> {
    let mut out = Vec::new();
    match geojson {
        GeoJson::FeatureCollection(fc) => {
            for feature in &fc.features {
                if let Some(geometry) = &feature.geometry {
                    collect_geometry(geometry, &mut out);
                }
            }
        }
        GeoJson::Feature(feature) => {
            if let Some(geometry) = &feature.geometry {
                collect_geometry(geometry, &mut out);
            }
        }
        GeoJson::Geometry(geometry) => collect_geometry(geometry, &mut out),
    }
    out
}

fn collect_geometry(geometry: &Geometry, out: &mut Vec<Polygon<f64>>) {
    match &geometry.value {
        Value::Polygon(rings) => out.extend(exterior_lat_lon(rings)),
        Value::MultiPolygon(polygons) => {
            for rings in polygons {
                out.extend(exterior_lat_lon(rings));
            }
        }
        Value::GeometryCollection(members) => {
            for member in members {
                collect_geometry(member, out);
            }
        }
        _ => {}
    }
}

fn exterior_lat_lon(rings: &[Vec<Vec<f64>>]) -> Option<Polygon<f64>> {
    let exterior = rings.first()?;
    let coords: Vec<(f64, f64)> = exterior
        .iter()
        .filter(|pos| pos.len() >= 2)
        .map(|pos| (pos[1], pos[0]))
        .collect();
    if coords.is_empty() {
        return None;
    }
    Some(Polygon::new(LineString::from(coords), vec![]))
}

// ============================================================================
// Selection ladder
// ============================================================================

/// Which rung of the ladder produced a selection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SelectionStage {
    Exact,
    Simplified { step: u32, tolerance: f64 },
    BoundingBox,
}

impl fmt::Display for SelectionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact => f.write_str("exact"),
            Self::Simplified { step, tolerance } => {
                write!(f, "simplified(step {}, tol {})", step, tolerance)
            }
            Self::BoundingBox => f.write_str("bounding_box"),
        }
    }
}

/// A selection that passed the sanity check.
#[derive(Debug, Clone)]
pub struct AoiSelection<D> {
    pub dataset: D,
    pub stage: SelectionStage,
}

pub const DEFAULT_SIMPLIFY_STEPS: u32 = 10;
pub const DEFAULT_BASE_TOLERANCE: f64 = 0.01;

#[derive(Debug, Clone, Copy)]
pub struct AoiSelector {
    simplify_steps: u32,
    base_tolerance: f64,
}

impl Default for AoiSelector {
    fn default() -> Self {
        Self::new(DEFAULT_SIMPLIFY_STEPS, DEFAULT_BASE_TOLERANCE)
    }
}

impl AoiSelector {
    pub fn new(simplify_steps: u32, base_tolerance: f64) -> Self {
        Self {
            simplify_steps,
            base_tolerance,
        }
    }

    /// Tolerance of simplification step `step` (1-based).
    pub fn tolerance(&self, step: u32) -> f64 {
        self.base_tolerance * f64::from(step)
    }

    /// Select the rows of `dataset` intersecting `polygon`.
    ///
    /// Returns `None` when every rung failed, when nothing intersected, or
    /// when the selection kept every row.
    pub fn select_by_polygon<D: SpatialDataset>(
        &self,
        dataset: &D,
        polygon: &Polygon<f64>,
        sref: SpatialRef,
    ) -> Option<AoiSelection<D>> {
        let attempt = match dataset.select_polygon(polygon, sref) {
            Ok(selection) => selection.map(|dataset| AoiSelection {
                dataset,
                stage: SelectionStage::Exact,
            }),
            Err(e) => {
                debug!(error = %e, "Exact AOI selection failed, simplifying");
                self.degrade(dataset, polygon, sref)
            }
        };

        match attempt {
            Some(selection) if selection.dataset.len() == dataset.len() => {
                warn!(
                    stage = %selection.stage,
                    rows = dataset.len(),
                    "AOI selection kept every row, discarding"
                );
                None
            }
            other => other,
        }
    }

    fn degrade<D: SpatialDataset>(
        &self,
        dataset: &D,
        polygon: &Polygon<f64>,
        sref: SpatialRef,
    ) -> Option<AoiSelection<D>> {
        for step in 1..=self.simplify_steps {
            let tolerance = self.tolerance(step);
            let simplified = simplify(polygon, tolerance);
            match dataset.select_polygon(&simplified, sref) {
                Ok(Some(selected)) => {
                    return Some(AoiSelection {
                        dataset: selected,
                        stage: SelectionStage::Simplified { step, tolerance },
                    })
                }
                Ok(None) => continue,
                Err(e) => debug!(step, tolerance, error = %e, "Simplified selection failed"),
            }
        }

        let bbox = polygon.bounding_rect()?.to_polygon();
        match dataset.select_polygon(&bbox, sref) {
            Ok(selected) => selected.map(|dataset| AoiSelection {
                dataset,
                stage: SelectionStage::BoundingBox,
            }),
            Err(e) => {
                warn!(error = %e, "Bounding box selection failed");
                None
            }
        }
    }

    /// Run the ladder once per AOI polygon.
    ///
    /// Each selection is paired with the index of its polygon. `None` if every
    /// polygon came back empty.
    pub fn select_event<D: SpatialDataset>(
        &self,
        dataset: &D,
        aoi: &EventAoi,
    ) -> Option<Vec<(usize, AoiSelection<D>)>> {
        let selections: Vec<(usize, AoiSelection<D>)> = aoi
            .polygons
            .iter()
            .enumerate()
            .filter_map(|(i, polygon)| {
                self.select_by_polygon(dataset, polygon, aoi.sref)
                    .map(|selection| (i, selection))
            })
            .collect();
        if selections.is_empty() {
            None
        } else {
            Some(selections)
        }
    }
}

/// Douglas-Peucker on the exterior ring; topology is not preserved.
fn simplify(polygon: &Polygon<f64>, tolerance: f64) -> Polygon<f64> {
    Polygon::new(polygon.exterior().simplify(&tolerance), vec![])
}

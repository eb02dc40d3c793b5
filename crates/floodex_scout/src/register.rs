//! Built-in file register
//!
//! A [`FileRegister`] is one row per raster file: its path, the fields decoded
//! from its name, and the footprint of its tile. Footprints come from a
//! [`TileIndex`] and use the same latitude-first order as AOI polygons.

use crate::error::{FloodexError, Result, SelectionError};
use crate::grammar::{DecodedName, GrammarEntry, GrammarTable};
use crate::layout::LayoutVersion;
use crate::spatial::{DatasetBuilder, SpatialDataset, SpatialRef};
use crate::types::{Algorithm, Layer};
use geo::{coord, CoordsIter, Intersects, Polygon, Rect};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Default refusal threshold for AOI polygons.
pub const DEFAULT_MAX_POLYGON_VERTICES: usize = 2000;

/// Tile footprints per grid: `{grid: {tile: [min_lat, min_lon, max_lat, max_lon]}}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TileIndex {
    grids: BTreeMap<String, BTreeMap<String, [f64; 4]>>,
}

impl TileIndex {
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| {
            FloodexError::Config(format!("cannot open tile index {}: {}", path.display(), e))
        })?;
        let index: TileIndex = serde_json::from_reader(BufReader::new(file))?;
        for (grid, tiles) in &index.grids {
            for (tile, [min_lat, min_lon, max_lat, max_lon]) in tiles {
                if min_lat > max_lat || min_lon > max_lon {
                    return Err(FloodexError::Config(format!(
                        "tile {}/{} has an inverted extent",
                        grid, tile
                    )));
                }
            }
        }
        Ok(index)
    }

    pub fn insert(&mut self, grid: &str, tile: &str, extent: [f64; 4]) {
        self.grids
            .entry(grid.to_string())
            .or_default()
            .insert(tile.to_string(), extent);
    }

    pub fn tile_count(&self) -> usize {
        self.grids.values().map(BTreeMap::len).sum()
    }

    /// Footprint with x = latitude, y = longitude.
    pub fn footprint(&self, grid: &str, tile: &str) -> Option<Rect<f64>> {
        let [min_lat, min_lon, max_lat, max_lon] = *self.grids.get(grid)?.get(tile)?;
        Some(Rect::new(
            coord! { x: min_lat, y: min_lon },
            coord! { x: max_lat, y: max_lon },
        ))
    }
}

#[derive(Debug, Clone)]
struct RegisterRow {
    path: PathBuf,
    fields: DecodedName,
    footprint: Rect<f64>,
}

/// In-memory file register.
#[derive(Debug, Clone)]
pub struct FileRegister {
    rows: Vec<RegisterRow>,
    max_polygon_vertices: usize,
}

impl FileRegister {
    fn with_rows(&self, rows: Vec<RegisterRow>) -> Self {
        Self {
            rows,
            max_polygon_vertices: self.max_polygon_vertices,
        }
    }

    fn check_polygon(
        &self,
        polygon: &Polygon<f64>,
        sref: SpatialRef,
    ) -> std::result::Result<(), SelectionError> {
        if sref != SpatialRef::WGS84 {
            return Err(SelectionError::UnsupportedReference(sref.epsg));
        }
        if polygon.exterior().0.len() < 4 {
            return Err(SelectionError::InvalidGeometry(format!(
                "exterior ring has {} coordinates",
                polygon.exterior().0.len()
            )));
        }
        if polygon
            .coords_iter()
            .any(|c| !c.x.is_finite() || !c.y.is_finite())
        {
            return Err(SelectionError::InvalidGeometry(
                "non-finite coordinate".to_string(),
            ));
        }
        let vertices = polygon.coords_count();
        if vertices > self.max_polygon_vertices {
            return Err(SelectionError::TooComplex {
                vertices,
                limit: self.max_polygon_vertices,
            });
        }
        Ok(())
    }
}

impl SpatialDataset for FileRegister {
    fn len(&self) -> usize {
        self.rows.len()
    }

    fn select_polygon(
        &self,
        polygon: &Polygon<f64>,
        sref: SpatialRef,
    ) -> std::result::Result<Option<Self>, SelectionError> {
        self.check_polygon(polygon, sref)?;
        let rows: Vec<RegisterRow> = self
            .rows
            .iter()
            .filter(|row| polygon.intersects(&row.footprint))
            .cloned()
            .collect();
        if rows.is_empty() {
            return Ok(None);
        }
        Ok(Some(self.with_rows(rows)))
    }

    fn select_by_attribute(&self, field: &str, value: &str) -> Self {
        let rows = self
            .rows
            .iter()
            .filter(|row| row.fields.get(field) == Some(value))
            .cloned()
            .collect();
        self.with_rows(rows)
    }

    fn filepaths(&self) -> Vec<PathBuf> {
        self.rows.iter().map(|row| row.path.clone()).collect()
    }

    fn attribute_values(&self, field: &str) -> Vec<String> {
        self.rows
            .iter()
            .map(|row| row.fields.get(field).unwrap_or_default().to_string())
            .collect()
    }
}

/// Builds [`FileRegister`]s from indexed files.
#[derive(Debug, Clone)]
pub struct FileRegisterBuilder {
    grammars: GrammarTable,
    tiles: Arc<TileIndex>,
    max_polygon_vertices: usize,
}

impl FileRegisterBuilder {
    pub fn new(grammars: GrammarTable, tiles: Arc<TileIndex>) -> Self {
        Self {
            grammars,
            tiles,
            max_polygon_vertices: DEFAULT_MAX_POLYGON_VERTICES,
        }
    }

    pub fn with_max_polygon_vertices(mut self, limit: usize) -> Self {
        self.max_polygon_vertices = limit;
        self
    }
}

impl DatasetBuilder for FileRegisterBuilder {
    type Dataset = FileRegister;

    fn build(
        &self,
        files: &[PathBuf],
        algorithm: Algorithm,
        layer: Layer,
        version: LayoutVersion,
        grammar: &GrammarEntry,
    ) -> Result<FileRegister> {
        let mut rows = Vec::with_capacity(files.len());
        for path in files {
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
            let stem = path.file_stem().and_then(|n| n.to_str()).unwrap_or("");
            let entry = self
                .grammars
                .for_file(algorithm, layer, version, name)
                .unwrap_or(grammar);

            let fields = match entry.decode(stem) {
                Ok(fields) => fields,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping undecodable filename");
                    continue;
                }
            };

            let grid = fields.get("equi7_grid").unwrap_or_default();
            let tile = fields.get("tile_name").unwrap_or_default();
            let Some(footprint) = self.tiles.footprint(grid, tile) else {
                debug!(path = %path.display(), grid, tile, "Tile not in index");
                continue;
            };

            rows.push(RegisterRow {
                path: path.clone(),
                fields,
                footprint,
            });
        }

        Ok(FileRegister {
            rows,
            max_polygon_vertices: self.max_polygon_vertices,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::LineString;

    fn square(min_lat: f64, min_lon: f64, max_lat: f64, max_lon: f64) -> Polygon<f64> {
        Polygon::new(
            LineString::from(vec![
                (min_lat, min_lon),
                (max_lat, min_lon),
                (max_lat, max_lon),
                (min_lat, max_lon),
                (min_lat, min_lon),
            ]),
            vec![],
        )
    }

    fn tiles() -> Arc<TileIndex> {
        let mut index = TileIndex::default();
        index.insert("EU020M", "E051N012T3", [45.0, 10.0, 48.0, 13.0]);
        index.insert("EU020M", "E054N012T3", [45.0, 13.0, 48.0, 16.0]);
        Arc::new(index)
    }

    fn register(files: &[&str]) -> FileRegister {
        let table = GrammarTable::default();
        let grammar = table
            .lookup(Algorithm::Ensemble, Layer::FloodExtent, LayoutVersion::NearRealTime)
            .unwrap();
        let paths: Vec<PathBuf> = files.iter().map(|f| PathBuf::from("/d").join(f)).collect();
        FileRegisterBuilder::new(table, tiles())
            .with_max_polygon_vertices(10)
            .build(
                &paths,
                Algorithm::Ensemble,
                Layer::FloodExtent,
                LayoutVersion::NearRealTime,
                grammar,
            )
            .unwrap()
    }

    const A1: &str = "ENSEMBLE_FLOOD_20230801T043012_VV_EU020M_E051N012T3.tif";
    const B1: &str = "ENSEMBLE_FLOOD_20230801T043012_VV_EU020M_E054N012T3.tif";
    const A2: &str = "ENSEMBLE_FLOOD_20230802T043012_VV_EU020M_E051N012T3.tif";

    #[test]
    fn test_build_skips_bad_names_and_unknown_tiles() {
        let reg = register(&[
            A1,
            "ENSEMBLE_FLOOD_bad.tif",
            "ENSEMBLE_FLOOD_20230801T043012_VV_EU020M_E099N099T3.tif",
        ]);
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.attribute_values("time"), vec!["20230801T043012"]);
    }

    #[test]
    fn test_select_polygon_intersects_footprints() {
        let reg = register(&[A1, B1, A2]);
        let sel = reg
            .select_polygon(&square(46.0, 11.0, 47.0, 12.0), SpatialRef::WGS84)
            .unwrap()
            .unwrap();
        assert_eq!(sel.len(), 2);
        assert!(sel.attribute_values("tile_name").iter().all(|t| t == "E051N012T3"));

        let none = reg
            .select_polygon(&square(0.0, 0.0, 1.0, 1.0), SpatialRef::WGS84)
            .unwrap();
        assert!(none.is_none());
    }

    #[test]
    fn test_select_polygon_refusals() {
        let reg = register(&[A1]);
        let err = reg
            .select_polygon(&square(46.0, 11.0, 47.0, 12.0), SpatialRef { epsg: 3857 })
            .unwrap_err();
        assert_eq!(err, SelectionError::UnsupportedReference(3857));

        let ring: Vec<(f64, f64)> = (0..20)
            .map(|i| {
                let a = i as f64 / 20.0 * std::f64::consts::TAU;
                (46.5 + a.cos(), 11.5 + a.sin())
            })
            .chain(std::iter::once((47.5, 11.5)))
            .collect();
        let err = reg
            .select_polygon(&Polygon::new(LineString::from(ring), vec![]), SpatialRef::WGS84)
            .unwrap_err();
        assert!(matches!(err, SelectionError::TooComplex { limit: 10, .. }));
    }

    #[test]
    fn test_select_by_attribute() {
        let reg = register(&[A1, B1, A2]);
        let day = reg.select_by_attribute("time", "20230801T043012");
        assert_eq!(day.len(), 2);
        assert!(reg.select_by_attribute("time", "nope").is_empty());
    }

    #[test]
    fn test_tile_index_load() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("tiles.json");
        std::fs::write(&path, r#"{"AS020M": {"E048N021T3": [10.0, 80.0, 13.0, 83.0]}}"#).unwrap();
        let index = TileIndex::load(&path).unwrap();
        assert_eq!(index.tile_count(), 1);
        assert!(index.footprint("AS020M", "E048N021T3").is_some());
        assert!(index.footprint("AS020M", "E000N000T3").is_none());
    }
}

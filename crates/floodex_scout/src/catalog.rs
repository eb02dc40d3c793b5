//! Flood-event catalog (CSV).

use crate::error::{FloodexError, Result};
use crate::types::FloodEvent;
use chrono::{NaiveDate, NaiveDateTime};
use serde::Deserialize;
use std::path::Path;

const TIMESTAMP_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"];

#[derive(Debug, Deserialize)]
struct CatalogRecord {
    #[serde(rename = "GDACS_ID", alias = "event_id")]
    id: String,
    #[serde(default)]
    country: String,
    fromdate: String,
    todate: String,
    #[serde(rename = "equi7_grid_code", alias = "grid_code")]
    grid_code: String,
    #[serde(default)]
    alertlevel: Option<String>,
}

/// Accepts `YYYY-MM-DDTHH:MM:SS`, the same with a space, or a bare date (midnight).
pub fn parse_catalog_time(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

impl CatalogRecord {
    fn into_event(self) -> std::result::Result<FloodEvent, String> {
        let id = self.id.trim().to_string();
        if id.is_empty() {
            return Err("empty event id".to_string());
        }
        let from = parse_catalog_time(&self.fromdate)
            .ok_or_else(|| format!("bad fromdate '{}'", self.fromdate))?;
        let to = parse_catalog_time(&self.todate)
            .ok_or_else(|| format!("bad todate '{}'", self.todate))?;
        if to < from {
            return Err(format!("todate {} is before fromdate {}", to, from));
        }
        let grid_code = self.grid_code.trim().to_string();
        if grid_code.is_empty() {
            return Err("empty grid code".to_string());
        }
        Ok(FloodEvent {
            id,
            country: self.country.trim().to_string(),
            from,
            to,
            grid_code,
            alert_level: self.alertlevel.filter(|a| !a.trim().is_empty()),
        })
    }
}

/// Load every event of a catalog, failing on the first bad row.
pub fn load_catalog(path: &Path) -> Result<Vec<FloodEvent>> {
    let mut reader = csv::Reader::from_path(path).map_err(|e| {
        FloodexError::Catalog(format!("cannot open {}: {}", path.display(), e))
    })?;
    let mut events = Vec::new();
    for (i, record) in reader.deserialize::<CatalogRecord>().enumerate() {
        // header is line 1
        let line = i + 2;
        let record = record
            .map_err(|e| FloodexError::Catalog(format!("{} line {}: {}", path.display(), line, e)))?;
        let event = record
            .into_event()
            .map_err(|e| FloodexError::Catalog(format!("{} line {}: {}", path.display(), line, e)))?;
        events.push(event);
    }
    Ok(events)
}

/// Which events of a catalog a run takes.
#[derive(Debug, Clone, Default)]
pub struct CatalogFilter {
    /// Only these ids, when non-empty
    pub events: Vec<String>,
    pub skip: usize,
    pub limit: Option<usize>,
}

impl CatalogFilter {
    pub fn apply(&self, events: Vec<FloodEvent>) -> Vec<FloodEvent> {
        events
            .into_iter()
            .filter(|e| self.events.is_empty() || self.events.contains(&e.id))
            .skip(self.skip)
            .take(self.limit.unwrap_or(usize::MAX))
            .collect()
    }
}

//! Per event, per algorithm results CSV
//!
//! Rows go to `{event}_{alg}.csv.part` while the event is running. On
//! completion the file becomes `{event}_{alg}.csv`, or
//! `{event}_{alg}_MISSED.csv` when no row was ever written.

use crate::error::Result;
use crate::types::Algorithm;
use chrono::NaiveDateTime;
use serde::Serialize;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

pub const RESULTS_HEADER: [&str; 6] = [
    "event_id",
    "country",
    "aoi",
    "timestamp",
    "extent_km2",
    "tile_name",
];

pub const PART_SUFFIX: &str = ".part";
pub const MISSED_SUFFIX: &str = "_MISSED";

/// One results row. Field order matches [`RESULTS_HEADER`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtentRow {
    pub event_id: String,
    pub country: String,
    pub aoi: String,
    pub timestamp: String,
    pub extent_km2: f64,
    pub tile_name: String,
}

/// `AOI_1`, `AOI_2`, ... for the n-th polygon (0-based input).
pub fn aoi_label(index: usize) -> String {
    format!("AOI_{}", index + 1)
}

/// `20230801T043012` → `2023-08-01T04:30:12`; anything else is returned as-is.
pub fn format_timestamp(raw: &str) -> String {
    NaiveDateTime::parse_from_str(raw, "%Y%m%dT%H%M%S")
        .map(|ts| ts.format("%Y-%m-%dT%H:%M:%S").to_string())
        .unwrap_or_else(|_| raw.to_string())
}

pub fn results_stem(event_id: &str, algorithm: Algorithm) -> String {
    format!("{}_{}", event_id, algorithm)
}

/// Outcome of [`ResultsFile::finish`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinishedResults {
    pub path: PathBuf,
    pub rows: usize,
}

impl FinishedResults {
    pub fn missed(&self) -> bool {
        self.rows == 0
    }
}

/// Results file being written for one event and algorithm.
pub struct ResultsFile {
    writer: csv::Writer<File>,
    dir: PathBuf,
    stem: String,
    rows: usize,
}

impl ResultsFile {
    /// Start (or restart) the partial file with a header.
    pub fn create(results_dir: &Path, event_id: &str, algorithm: Algorithm) -> Result<Self> {
        fs::create_dir_all(results_dir)?;
        let stem = results_stem(event_id, algorithm);
        let part = results_dir.join(format!("{}.csv{}", stem, PART_SUFFIX));
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_path(&part)?;
        writer.write_record(RESULTS_HEADER)?;
        writer.flush()?;
        Ok(Self {
            writer,
            dir: results_dir.to_path_buf(),
            stem,
            rows: 0,
        })
    }

    pub fn part_path(&self) -> PathBuf {
        self.dir.join(format!("{}.csv{}", self.stem, PART_SUFFIX))
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Append and flush one row.
    pub fn append(&mut self, row: &ExtentRow) -> Result<()> {
        self.writer.serialize(row)?;
        self.writer.flush()?;
        self.rows += 1;
        Ok(())
    }

    /// Move the partial file to its final name.
    pub fn finish(mut self) -> Result<FinishedResults> {
        self.writer.flush()?;
        let part = self.part_path();
        let name = if self.rows == 0 {
            format!("{}{}.csv", self.stem, MISSED_SUFFIX)
        } else {
            format!("{}.csv", self.stem)
        };
        let path = self.dir.join(name);
        drop(self.writer);
        fs::rename(&part, &path)?;
        Ok(FinishedResults {
            path,
            rows: self.rows,
        })
    }
}

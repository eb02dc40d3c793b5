//! Flood extent metrics per timestamp
//!
//! A selection is grouped by its `time` field; every file of a timestamp is
//! counted and the pixel total converted to km². Reads can run on a bounded
//! rayon pool; aggregation is always sequential and in timestamp order.

use crate::error::{FloodexError, Result};
use crate::raster::PixelCounter;
use crate::spatial::SpatialDataset;
use rayon::prelude::*;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

/// Ground sampling distance of the flood products.
pub const DEFAULT_PIXEL_SIZE_M: f64 = 20.0;

/// How per-file pixel counts are scheduled inside one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProcessingMode {
    #[default]
    Sequential,
    /// Fixed-size worker pool
    Workers(usize),
}

impl ProcessingMode {
    /// `0` means sequential.
    pub fn from_workers(workers: usize) -> Self {
        if workers == 0 {
            Self::Sequential
        } else {
            Self::Workers(workers)
        }
    }
}

/// Flooded area of one timestamp within one AOI selection.
#[derive(Debug, Clone, PartialEq)]
pub struct TimestampExtent {
    /// Raw `time` field, e.g. `20230801T043012`
    pub timestamp: String,
    pub flooded_pixels: u64,
    pub area_km2: f64,
    /// Tiles contributing to the timestamp, in row order
    pub tiles: Vec<String>,
}

pub struct MetricsExtractor<C> {
    counter: C,
    pixel_area_km2: f64,
    pool: Option<Arc<rayon::ThreadPool>>,
}

impl<C: PixelCounter> MetricsExtractor<C> {
    pub fn new(counter: C, pixel_size_m: f64, mode: ProcessingMode) -> Result<Self> {
        let pool = match mode {
            ProcessingMode::Sequential => None,
            ProcessingMode::Workers(threads) => {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(threads)
                    .thread_name(|i| format!("floodex-metrics-{}", i))
                    .build()
                    .map_err(|e| {
                        FloodexError::Config(format!("cannot build worker pool: {}", e))
                    })?;
                Some(Arc::new(pool))
            }
        };
        Ok(Self {
            counter,
            pixel_area_km2: pixel_size_m * pixel_size_m / 1_000_000.0,
            pool,
        })
    }

    pub fn pixel_area_km2(&self) -> f64 {
        self.pixel_area_km2
    }

    /// Counts for each path, in input order. `None` marks a failed read.
    fn count_all(&self, paths: &[PathBuf]) -> Vec<Option<u64>> {
        let count = |path: &PathBuf| match self.counter.count_flooded(path) {
            Ok(n) => Some(n),
            Err(e) => {
                warn!(path = %path.display(), cause = e.cause(), error = %e, "Raster read failed");
                None
            }
        };
        match &self.pool {
            None => paths.iter().map(count).collect(),
            Some(pool) => pool.install(|| paths.par_iter().map(count).collect()),
        }
    }

    /// Non-empty timestamp extents of a selection, ordered by timestamp.
    ///
    /// A timestamp with any unreadable file is skipped; zero totals produce
    /// no entry.
    pub fn extract<D: SpatialDataset>(&self, selection: &D) -> Vec<TimestampExtent> {
        let timestamps: BTreeSet<String> = selection.attribute_values("time").into_iter().collect();

        // (timestamp index, path) for every file, flattened for the pool
        let mut groups = Vec::with_capacity(timestamps.len());
        let mut jobs: Vec<(usize, PathBuf)> = Vec::new();
        for (i, ts) in timestamps.iter().enumerate() {
            let subset = selection.select_by_attribute("time", ts);
            jobs.extend(subset.filepaths().into_iter().map(|p| (i, p)));
            groups.push((ts.clone(), subset.attribute_values("tile_name")));
        }

        let paths: Vec<PathBuf> = jobs.iter().map(|(_, p)| p.clone()).collect();
        let counts = self.count_all(&paths);

        let mut totals: Vec<Option<u64>> = vec![Some(0); groups.len()];
        for ((group, _), count) in jobs.iter().zip(counts) {
            totals[*group] = match (totals[*group], count) {
                (Some(acc), Some(n)) => Some(acc + n),
                _ => None,
            };
        }

        let mut extents = Vec::new();
        for ((timestamp, tiles), total) in groups.into_iter().zip(totals) {
            match total {
                None => debug!(timestamp = %timestamp, "Skipping timestamp with unreadable files"),
                Some(0) => debug!(timestamp = %timestamp, "No flooded pixels"),
                Some(pixels) => extents.push(TimestampExtent {
                    area_km2: pixels as f64 * self.pixel_area_km2,
                    flooded_pixels: pixels,
                    timestamp,
                    tiles,
                }),
            }
        }
        extents
    }
}

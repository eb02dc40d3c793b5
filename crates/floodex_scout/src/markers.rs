//! Indicator files and the resumption check
//!
//! Markers are small text files, one per event (or event and algorithm),
//! under named directories below a batch's output root. They are both a
//! diagnostic for people browsing the output and the signal that lets a
//! re-run skip finished work.

use crate::error::Result;
use crate::results::MISSED_SUFFIX;
use crate::types::Algorithm;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Named marker directories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndicatorDir {
    /// No AOI polygon for the event
    NoAoi,
    /// Selection came back empty for every polygon
    NoData,
    /// The indexer found no flood extent files at all
    NoDataAtAll,
    /// A layer's selection came back empty during layer retrieval
    NoDataDcFilter,
    /// Layer retrieval finished
    Completed,
}

impl IndicatorDir {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoAoi => "no_aoi",
            Self::NoData => "no_data",
            Self::NoDataAtAll => "no_data_at_all",
            Self::NoDataDcFilter => "no_data_dc_filter",
            Self::Completed => "completed",
        }
    }

    pub fn path(&self, root: &Path) -> PathBuf {
        root.join(self.as_str())
    }
}

/// Write `{root}/{kind}/{name}.txt`, replacing any previous marker.
pub fn write_indicator(root: &Path, kind: IndicatorDir, name: &str, message: &str) -> Result<PathBuf> {
    let dir = kind.path(root);
    fs::create_dir_all(&dir)?;
    let path = dir.join(format!("{}.txt", name));
    fs::write(&path, format!("{}\n", message))?;
    debug!(marker = %path.display(), "Wrote indicator");
    Ok(path)
}

/// Extensions a finished output may carry.
const OUTPUT_EXTENSIONS: [&str; 2] = ["csv", "txt"];

/// Whether `{dir}/{stem}.{ext}` exists for any of the given stems and
/// extensions. Symlinks are followed.
fn any_exists(dir: &Path, stems: &[&str], extensions: &[&str]) -> Result<bool> {
    for stem in stems {
        for ext in extensions {
            if dir.join(format!("{}.{}", stem, ext)).try_exists()? {
                return Ok(true);
            }
        }
    }
    Ok(false)
}

/// Decides whether an (event, algorithm) pair was already handled.
#[derive(Debug, Clone)]
pub struct ResumeMarkers {
    indicator_root: PathBuf,
    output_dir: PathBuf,
}

impl ResumeMarkers {
    /// `output_dir` holds finished outputs named `{event}_{alg}[_MISSED].*`.
    pub fn new(indicator_root: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            indicator_root: indicator_root.into(),
            output_dir: output_dir.into(),
        }
    }

    /// Checks, in order, the no-AOI markers, the no-data markers and the
    /// finished outputs. Only the names a run writes are looked up, so the
    /// cost does not grow with the number of markers on disk.
    pub fn is_already_processed(&self, event_id: &str, algorithm: Algorithm) -> Result<bool> {
        let pair = format!("{}_{}", event_id, algorithm);
        let missed = format!("{}{}", pair, MISSED_SUFFIX);

        let no_aoi = IndicatorDir::NoAoi.path(&self.indicator_root);
        if any_exists(&no_aoi, &[event_id], &["txt"])? {
            return Ok(true);
        }

        let no_data = IndicatorDir::NoData.path(&self.indicator_root);
        if any_exists(&no_data, &[event_id, pair.as_str()], &["txt"])? {
            return Ok(true);
        }

        any_exists(&self.output_dir, &[pair.as_str(), missed.as_str()], &OUTPUT_EXTENSIONS)
    }
}

//! Filename classification for one day's directory listing.

use crate::types::Algorithm;
use std::path::{Path, PathBuf};

/// Extension of every raster product in the archive.
pub const RASTER_EXTENSION: &str = "tif";

/// Whether a path carries the raster extension (case-sensitive, like the archive).
pub fn has_raster_extension(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some(RASTER_EXTENSION)
}

/// Keep only raster files. Used as-is for context layers.
pub fn filter_extension(files: &[PathBuf]) -> Vec<PathBuf> {
    files
        .iter()
        .filter(|p| has_raster_extension(p))
        .cloned()
        .collect()
}

fn file_name(path: &Path) -> &str {
    path.file_name().and_then(|n| n.to_str()).unwrap_or("")
}

fn with_prefix(files: &[PathBuf], prefix: &str) -> Vec<PathBuf> {
    files
        .iter()
        .filter(|p| file_name(p).starts_with(prefix))
        .cloned()
        .collect()
}

/// Restrict a listing to the files produced by `algorithm`.
///
/// Ensemble takes every raster. Single-provider algorithms take files whose
/// name starts with their tag. When none do and the algorithm has a legacy
/// tag, files with the legacy tag are returned instead. Order is preserved.
pub fn classify(files: &[PathBuf], algorithm: Algorithm) -> Vec<PathBuf> {
    let rasters = filter_extension(files);
    let Some(tag) = algorithm.tag() else {
        return rasters;
    };

    let primary = with_prefix(&rasters, tag);
    if !primary.is_empty() {
        return primary;
    }

    match algorithm.legacy_tag() {
        Some(legacy) => with_prefix(&rasters, legacy),
        None => primary,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths(names: &[&str]) -> Vec<PathBuf> {
        names.iter().map(|n| PathBuf::from("/day").join(n)).collect()
    }

    #[test]
    fn test_ensemble_takes_all_rasters() {
        let files = paths(&["ENSEMBLE_FLOOD_a.tif", "TUW_FLOOD_b.tif", "readme.txt", "x.tif.aux"]);
        let got = classify(&files, Algorithm::Ensemble);
        assert_eq!(got, paths(&["ENSEMBLE_FLOOD_a.tif", "TUW_FLOOD_b.tif"]));
    }

    #[test]
    fn test_single_provider_filters_by_tag() {
        let files = paths(&["DLR_FLOOD_a.tif", "LIST_FLOOD_b.tif", "TUW_FLOOD_c.tif"]);
        assert_eq!(classify(&files, Algorithm::Dlr), paths(&["DLR_FLOOD_a.tif"]));
        assert_eq!(classify(&files, Algorithm::List), paths(&["LIST_FLOOD_b.tif"]));
    }

    #[test]
    fn test_tuw_falls_back_to_legacy_tag() {
        let files = paths(&["FLOOD-HM_a.tif", "FLOOD-HM_b.tif", "DLR_FLOOD_c.tif"]);
        assert_eq!(
            classify(&files, Algorithm::Tuw),
            paths(&["FLOOD-HM_a.tif", "FLOOD-HM_b.tif"])
        );
    }

    #[test]
    fn test_fallback_not_used_when_primary_present() {
        let files = paths(&["FLOOD-HM_a.tif", "FLOOD-HM_b.tif", "TUW_FLOOD_c.tif"]);
        assert_eq!(classify(&files, Algorithm::Tuw), paths(&["TUW_FLOOD_c.tif"]));
    }

    #[test]
    fn test_no_fallback_for_other_algorithms() {
        let files = paths(&["FLOOD-HM_a.tif"]);
        assert!(classify(&files, Algorithm::Dlr).is_empty());
        assert!(classify(&files, Algorithm::List).is_empty());
    }

    #[test]
    fn test_empty_result_when_nothing_matches() {
        assert!(classify(&paths(&["other.tif"]), Algorithm::Tuw).is_empty());
        assert!(classify(&[], Algorithm::Ensemble).is_empty());
    }

    #[test]
    fn test_classify_is_idempotent() {
        let listings = [
            paths(&["TUW_FLOOD_a.tif", "FLOOD-HM_b.tif", "DLR_FLOOD_c.tif", "n.txt"]),
            paths(&["FLOOD-HM_b.tif", "LIST_FLOOD_d.tif"]),
            paths(&["ENSEMBLE_FLOOD_e.tif"]),
        ];
        for files in &listings {
            for algo in Algorithm::ALL {
                let once = classify(files, algo);
                assert_eq!(classify(&once, algo), once, "{} on {:?}", algo, files);
            }
        }
    }
}

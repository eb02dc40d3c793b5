//! Temporal image indexing
//!
//! Walks the day directories of a buffered event window and collects the
//! product files of one algorithm. Missing days are skipped; the archive has
//! gaps. Output is always sorted by path and free of duplicates.

use crate::classify::{classify, filter_extension};
use crate::error::Result;
use crate::layout::{LayoutRoot, StorageLayout};
use crate::types::{Algorithm, Layer, LayerImageSet};
use chrono::{Datelike, Days, NaiveDate, NaiveDateTime};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Every calendar day from `start - buffer` to `end + buffer`, inclusive.
pub fn iterate_days(start: NaiveDate, end: NaiveDate, buffer_days: u32) -> Vec<NaiveDate> {
    let buffer = Days::new(u64::from(buffer_days));
    let first = start.checked_sub_days(buffer).unwrap_or(NaiveDate::MIN);
    let last = end.checked_add_days(buffer).unwrap_or(NaiveDate::MAX);
    if last < first {
        return Vec::new();
    }
    first.iter_days().take_while(|d| *d <= last).collect()
}

/// `{dir}/YYYY/MM/DD`
pub fn day_dir(dir: &Path, day: NaiveDate) -> PathBuf {
    dir.join(format!("{:04}", day.year()))
        .join(format!("{:02}", day.month()))
        .join(format!("{:02}", day.day()))
}

/// Files directly inside `dir`, symlinks to files included, or nothing if
/// it does not exist.
fn list_day(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() {
            files.push(path);
        }
    }
    Ok(files)
}

fn sort_unique(mut files: Vec<PathBuf>) -> Vec<PathBuf> {
    files.sort();
    files.dedup();
    files
}

/// Indexes archive files through a [`StorageLayout`].
#[derive(Debug, Clone)]
pub struct Indexer {
    layout: StorageLayout,
}

impl Indexer {
    pub fn new(layout: StorageLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &StorageLayout {
        &self.layout
    }

    /// Flood-extent files of `algorithm` for an event window.
    ///
    /// The storage period is picked from the window start; the whole window
    /// is read from that period.
    pub fn find_images(
        &self,
        start: NaiveDateTime,
        end: NaiveDateTime,
        grid_code: &str,
        algorithm: Algorithm,
        buffer_days: u32,
    ) -> Result<Vec<PathBuf>> {
        let dir = self
            .layout
            .flood_extent_dir(start.date(), grid_code, algorithm)?;

        let mut files = Vec::new();
        for day in iterate_days(start.date(), end.date(), buffer_days) {
            let listing = list_day(&day_dir(&dir, day))?;
            if listing.is_empty() {
                continue;
            }
            files.extend(classify(&listing, algorithm));
        }

        let files = sort_unique(files);
        debug!(
            grid = grid_code,
            algorithm = %algorithm,
            dir = %dir.display(),
            count = files.len(),
            "Indexed flood extent files"
        );
        Ok(files)
    }

    /// Files of all five layers for an event window.
    ///
    /// Fails with `LayerDirectoryMissing` unless every layer directory exists.
    /// Context layers only get the extension filter.
    pub fn find_layer_images(
        &self,
        start: NaiveDateTime,
        end: NaiveDateTime,
        grid_code: &str,
        algorithm: Algorithm,
        buffer_days: u32,
    ) -> Result<(LayoutRoot, LayerImageSet)> {
        let (root, dirs) = self.layout.layer_dirs(start.date(), grid_code, algorithm)?;
        let days = iterate_days(start.date(), end.date(), buffer_days);

        let mut images = LayerImageSet::default();
        for (layer, dir) in &dirs {
            let mut files = Vec::new();
            for day in &days {
                let listing = list_day(&day_dir(dir, *day))?;
                if listing.is_empty() {
                    continue;
                }
                if layer.is_algorithm_specific() {
                    files.extend(classify(&listing, algorithm));
                } else {
                    files.extend(filter_extension(&listing));
                }
            }
            *images.get_mut(*layer) = sort_unique(files);
        }

        debug!(
            grid = grid_code,
            algorithm = %algorithm,
            period = %root.period,
            flood_extent = images.get(Layer::FloodExtent).len(),
            total = images.total(),
            "Indexed layer files"
        );
        Ok((root, images))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::StoragePeriod;
    use tempfile::TempDir;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn at(y: i32, m: u32, d: u32, h: u32) -> NaiveDateTime {
        date(y, m, d).and_hms_opt(h, 0, 0).unwrap()
    }

    fn layout(base: &Path) -> StorageLayout {
        StorageLayout::new(vec![
            StoragePeriod {
                name: "archive".to_string(),
                start: date(2015, 1, 1),
                end: Some(date(2022, 12, 31)),
                root: base.join("output"),
            },
            StoragePeriod {
                name: "nrt".to_string(),
                start: date(2023, 1, 1),
                end: None,
                root: base.join("realtime"),
            },
        ])
        .unwrap()
    }

    fn touch(dir: &Path, name: &str) {
        fs::create_dir_all(dir).unwrap();
        fs::write(dir.join(name), b"").unwrap();
    }

    #[test]
    fn test_iterate_days_inclusive_with_buffer() {
        let days = iterate_days(date(2023, 1, 1), date(2023, 1, 3), 1);
        assert_eq!(days.first(), Some(&date(2022, 12, 31)));
        assert_eq!(days.last(), Some(&date(2023, 1, 4)));
        assert_eq!(days.len(), 5);
        assert_eq!(iterate_days(date(2023, 2, 28), date(2023, 2, 28), 0).len(), 1);
    }

    #[test]
    fn test_iterate_days_inverted_window_is_empty() {
        assert!(iterate_days(date(2023, 1, 5), date(2023, 1, 1), 1).is_empty());
    }

    #[test]
    fn test_day_dir_zero_pads() {
        assert_eq!(
            day_dir(Path::new("/r"), date(2023, 3, 7)),
            Path::new("/r/2023/03/07")
        );
    }

    #[test]
    fn test_legacy_files_only_on_one_day() {
        let temp = TempDir::new().unwrap();
        let layout = layout(temp.path());
        let dir = layout
            .flood_extent_dir(date(2020, 1, 1), "EU020M", Algorithm::Tuw)
            .unwrap();
        touch(&day_dir(&dir, date(2020, 1, 2)), "FLOOD-HM_b.tif");
        touch(&day_dir(&dir, date(2020, 1, 2)), "FLOOD-HM_a.tif");
        touch(&day_dir(&dir, date(2020, 1, 2)), "FLOOD-HM_a.tif.aux.xml");
        // outside the buffered window
        touch(&day_dir(&dir, date(2020, 1, 5)), "TUW_FLOOD_x.tif");

        let indexer = Indexer::new(layout);
        let files = indexer
            .find_images(at(2020, 1, 1, 6), at(2020, 1, 3, 18), "EU020M", Algorithm::Tuw, 1)
            .unwrap();
        let day = day_dir(&dir, date(2020, 1, 2));
        assert_eq!(files, vec![day.join("FLOOD-HM_a.tif"), day.join("FLOOD-HM_b.tif")]);
    }

    #[test]
    fn test_find_images_sorted_across_days() {
        let temp = TempDir::new().unwrap();
        let layout = layout(temp.path());
        let dir = layout
            .flood_extent_dir(date(2023, 6, 1), "AF020M", Algorithm::Dlr)
            .unwrap();
        touch(&day_dir(&dir, date(2023, 6, 2)), "DLR_FLOOD_2.tif");
        touch(&day_dir(&dir, date(2023, 6, 1)), "DLR_FLOOD_9.tif");
        touch(&day_dir(&dir, date(2023, 6, 1)), "DLR_FLOOD_1.tif");

        let files = Indexer::new(layout)
            .find_images(at(2023, 6, 1, 0), at(2023, 6, 2, 0), "AF020M", Algorithm::Dlr, 0)
            .unwrap();
        let mut sorted = files.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(files, sorted);
        assert_eq!(files.len(), 3);
    }

    #[test]
    fn test_sort_unique_drops_repeats() {
        let files = vec![
            PathBuf::from("/d/2023/06/02/b.tif"),
            PathBuf::from("/d/2023/06/01/a.tif"),
            PathBuf::from("/d/2023/06/02/b.tif"),
            PathBuf::from("/d/2023/06/01/a.tif"),
        ];
        assert_eq!(
            sort_unique(files),
            vec![PathBuf::from("/d/2023/06/01/a.tif"), PathBuf::from("/d/2023/06/02/b.tif")]
        );
    }

    #[test]
    fn test_find_images_same_for_any_creation_order() {
        let names = ["ENSEMBLE_FLOOD_c.tif", "ENSEMBLE_FLOOD_a.tif", "ENSEMBLE_FLOOD_b.tif"];
        let days = [date(2023, 6, 3), date(2023, 6, 1), date(2023, 6, 2)];

        let relative = |reversed: bool| {
            let temp = TempDir::new().unwrap();
            let layout = layout(temp.path());
            let dir = layout
                .flood_extent_dir(date(2023, 6, 1), "AF020M", Algorithm::Ensemble)
                .unwrap();
            let mut order: Vec<(NaiveDate, &str)> = days
                .iter()
                .flat_map(|d| names.iter().map(move |n| (*d, *n)))
                .collect();
            if reversed {
                order.reverse();
            }
            for (d, name) in order {
                touch(&day_dir(&dir, d), name);
            }
            Indexer::new(layout)
                .find_images(at(2023, 6, 1, 0), at(2023, 6, 3, 0), "AF020M", Algorithm::Ensemble, 0)
                .unwrap()
                .into_iter()
                .map(|f| f.strip_prefix(temp.path()).unwrap().to_path_buf())
                .collect::<Vec<_>>()
        };

        let forward = relative(false);
        assert_eq!(forward.len(), 9);
        assert_eq!(forward, relative(true));
        assert!(forward.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_wide_buffer_lists_each_file_once() {
        let temp = TempDir::new().unwrap();
        let layout = layout(temp.path());
        let dir = layout
            .flood_extent_dir(date(2023, 6, 1), "AF020M", Algorithm::Dlr)
            .unwrap();
        touch(&day_dir(&dir, date(2023, 6, 1)), "DLR_FLOOD_1.tif");
        touch(&day_dir(&dir, date(2023, 6, 2)), "DLR_FLOOD_2.tif");

        // a one-day window with a buffer wider than the window itself
        let files = Indexer::new(layout)
            .find_images(at(2023, 6, 1, 0), at(2023, 6, 1, 23), "AF020M", Algorithm::Dlr, 3)
            .unwrap();
        assert_eq!(
            files,
            vec![
                day_dir(&dir, date(2023, 6, 1)).join("DLR_FLOOD_1.tif"),
                day_dir(&dir, date(2023, 6, 2)).join("DLR_FLOOD_2.tif"),
            ]
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinked_files_are_listed() {
        let temp = TempDir::new().unwrap();
        let layout = layout(temp.path());
        let dir = layout
            .flood_extent_dir(date(2023, 1, 1), "EU020M", Algorithm::Tuw)
            .unwrap();
        let mirror = temp.path().join("mirror");
        touch(&mirror, "FLOOD-HM_20230102T051500_E051N012T3.tif");
        let day = day_dir(&dir, date(2023, 1, 2));
        fs::create_dir_all(&day).unwrap();
        let link = day.join("FLOOD-HM_20230102T051500_E051N012T3.tif");
        std::os::unix::fs::symlink(mirror.join("FLOOD-HM_20230102T051500_E051N012T3.tif"), &link).unwrap();
        // a dangling link is not a file
        std::os::unix::fs::symlink(mirror.join("gone.tif"), day.join("FLOOD-HM_gone.tif")).unwrap();

        let files = Indexer::new(layout)
            .find_images(at(2023, 1, 2, 0), at(2023, 1, 2, 12), "EU020M", Algorithm::Tuw, 0)
            .unwrap();
        assert_eq!(files, vec![link]);
    }

    #[test]
    fn test_find_images_no_directories_is_empty() {
        let temp = TempDir::new().unwrap();
        let files = Indexer::new(layout(temp.path()))
            .find_images(at(2023, 6, 1, 0), at(2023, 6, 2, 0), "AF020M", Algorithm::Ensemble, 3)
            .unwrap();
        assert!(files.is_empty());
    }

    #[test]
    fn test_find_layer_images_requires_all_dirs() {
        let temp = TempDir::new().unwrap();
        let indexer = Indexer::new(layout(temp.path()));
        let err = indexer
            .find_layer_images(at(2023, 6, 1, 0), at(2023, 6, 2, 0), "AF020M", Algorithm::Ensemble, 1)
            .unwrap_err();
        assert!(matches!(err, crate::error::FloodexError::LayerDirectoryMissing { missing } if missing.len() == 5));
    }

    #[test]
    fn test_find_layer_images_context_layers_unclassified() {
        let temp = TempDir::new().unwrap();
        let layout = layout(temp.path());
        let root = layout
            .resolve_layout_root(date(2023, 6, 1), Algorithm::Dlr)
            .unwrap();
        for layer in Layer::ALL {
            fs::create_dir_all(root.layer_dir(layer, "AF020M")).unwrap();
        }
        let day = date(2023, 6, 1);
        touch(&day_dir(&root.layer_dir(Layer::FloodExtent, "AF020M"), day), "DLR_FLOOD_a.tif");
        touch(&day_dir(&root.layer_dir(Layer::FloodExtent, "AF020M"), day), "LIST_FLOOD_a.tif");
        touch(&day_dir(&root.layer_dir(Layer::Exclusion, "AF020M"), day), "EXCLUSION_a.tif");
        touch(&day_dir(&root.layer_dir(Layer::AdvisoryFlags, "AF020M"), day), "ADVFLAG_a.tif");

        let (resolved, images) = Indexer::new(layout)
            .find_layer_images(at(2023, 6, 1, 0), at(2023, 6, 1, 12), "AF020M", Algorithm::Dlr, 0)
            .unwrap();
        assert_eq!(resolved, root);
        assert_eq!(images.flood_extent.len(), 1);
        assert_eq!(images.exclusion.len(), 1);
        assert_eq!(images.advisory_flags.len(), 1);
        assert!(images.uncertainty.is_empty());
        assert_eq!(images.total(), 3);
    }
}

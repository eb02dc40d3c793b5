//! Layer retrieval
//!
//! Copies the AOI-selected files of every layer into a per-event tree:
//!
//! ```text
//! {layers_dir}/{event}/{alg}_{version}/flood_extent/AOI_1/*.tif
//! {layers_dir}/{event}/{alg}_{version}/uncertainty/AOI_1/*.tif
//! {layers_dir}/{event}/exclusion/AOI_1/*.tif        (ensemble runs only)
//! ```

use crate::aoi::{AoiSelector, EventAoi};
use crate::error::{FloodexError, Result};
use crate::grammar::GrammarTable;
use crate::index::Indexer;
use crate::layout::LayoutRoot;
use crate::markers::{write_indicator, IndicatorDir};
use crate::pipeline::PairProcessor;
use crate::results::aoi_label;
use crate::spatial::{DatasetBuilder, SpatialDataset};
use crate::types::{Algorithm, FloodEvent, Layer, ProcessingStatus};
use filetime::FileTime;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Copy `src` into `dest_dir`, keeping its modification time.
pub fn copy_preserving_mtime(src: &Path, dest_dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(dest_dir)?;
    let name = src
        .file_name()
        .ok_or_else(|| FloodexError::InvalidState(format!("{} has no file name", src.display())))?;
    let dest = dest_dir.join(name);
    fs::copy(src, &dest)?;
    let mtime = FileTime::from_last_modification_time(&fs::metadata(src)?);
    filetime::set_file_mtime(&dest, mtime)?;
    Ok(dest)
}

/// Layers retrieved for an algorithm. Context layers come with ensemble only.
pub fn layers_for(algorithm: Algorithm) -> &'static [Layer] {
    if algorithm == Algorithm::Ensemble {
        &Layer::ALL
    } else {
        &[Layer::FloodExtent, Layer::Uncertainty]
    }
}

/// Retrieves layer files for one (event, algorithm) pair.
pub struct LayersProcessor<'a, B> {
    pub indexer: &'a Indexer,
    pub builder: &'a B,
    pub selector: AoiSelector,
    pub grammars: GrammarTable,
    pub layers_dir: PathBuf,
    pub buffer_days: u32,
}

impl<B: DatasetBuilder> LayersProcessor<'_, B> {
    fn layer_dest(&self, event: &FloodEvent, algorithm: Algorithm, root: &LayoutRoot, layer: Layer) -> PathBuf {
        let event_dir = self.layers_dir.join(&event.id);
        if layer.is_algorithm_specific() {
            event_dir
                .join(format!("{}_{}", algorithm, root.version))
                .join(layer.as_str())
        } else {
            event_dir.join(layer.as_str())
        }
    }

    /// Select and copy one layer. Returns the number of files copied, or
    /// `None` when the selection came back absent.
    fn retrieve_layer(
        &self,
        event: &FloodEvent,
        algorithm: Algorithm,
        root: &LayoutRoot,
        layer: Layer,
        files: &[PathBuf],
        aoi: &EventAoi,
    ) -> Result<Option<usize>> {
        let grammar = self
            .grammars
            .lookup(algorithm, layer, root.version)
            .ok_or_else(|| {
                FloodexError::Grammar(format!("no grammar for {}/{}/{}", algorithm, layer, root.version))
            })?;
        let dataset = self.builder.build(files, algorithm, layer, root.version, grammar)?;
        let Some(selections) = self.selector.select_event(&dataset, aoi) else {
            return Ok(None);
        };

        let dest = self.layer_dest(event, algorithm, root, layer);
        let mut copied = 0;
        for (polygon, selection) in &selections {
            let aoi_dir = dest.join(aoi_label(*polygon));
            for path in selection.dataset.filepaths() {
                copy_preserving_mtime(&path, &aoi_dir)?;
                copied += 1;
            }
        }
        debug!(layer = %layer, copied, dest = %dest.display(), "Layer retrieved");
        Ok(Some(copied))
    }
}

impl<B: DatasetBuilder> PairProcessor for LayersProcessor<'_, B> {
    fn process(&self, event: &FloodEvent, algorithm: Algorithm, aoi: &EventAoi) -> Result<ProcessingStatus> {
        let marker = format!("{}_{}", event.id, algorithm);
        let (root, images) = self.indexer.find_layer_images(
            event.from,
            event.to,
            &event.grid_code,
            algorithm,
            self.buffer_days,
        )?;

        if images.flood_extent.is_empty() {
            write_indicator(
                &self.layers_dir,
                IndicatorDir::NoDataAtAll,
                &marker,
                &format!("no {} flood extent files for grid {}", algorithm, event.grid_code),
            )?;
            return Ok(ProcessingStatus::NoData);
        }

        let mut total = 0;
        for layer in layers_for(algorithm) {
            let files = images.get(*layer);
            let copied = if files.is_empty() {
                None
            } else {
                self.retrieve_layer(event, algorithm, &root, *layer, files, aoi)?
            };

            match copied {
                Some(n) => total += n,
                None => {
                    write_indicator(
                        &self.layers_dir,
                        IndicatorDir::NoDataDcFilter,
                        &format!("{}_{}", marker, layer),
                        &format!("{} of {} files, none selected", layer, files.len()),
                    )?;
                }
            }
        }

        // every layer came back empty
        if total == 0 {
            write_indicator(
                &self.layers_dir,
                IndicatorDir::NoData,
                &marker,
                &format!("no {} layer file intersects an AOI polygon", algorithm),
            )?;
            return Ok(ProcessingStatus::NoData);
        }

        write_indicator(
            &self.layers_dir,
            IndicatorDir::Completed,
            &marker,
            &format!("{} files retrieved from {}", total, root.period),
        )?;
        info!(algorithm = %algorithm, files = total, period = %root.period, "Layers retrieved");
        Ok(ProcessingStatus::Done)
    }
}

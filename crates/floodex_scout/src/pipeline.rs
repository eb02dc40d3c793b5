//! Resumable batch orchestration
//!
//! Events are processed one at a time, algorithms in configured order. For
//! every (event, algorithm) pair the runner:
//!
//! 1. Skips the pair if its markers say it already ran
//! 2. Loads the event AOI (once per event) and records `no_aoi` if absent
//! 3. Hands the pair to a [`PairProcessor`]
//! 4. Records the resulting status; any error becomes `error`
//!
//! The ledger is the only mutable state shared across events and only the
//! runner touches it.

use crate::aoi::{AoiSelector, AoiSource, EventAoi};
use crate::error::{FloodexError, Result};
use crate::grammar::GrammarTable;
use crate::index::Indexer;
use crate::ledger::Ledger;
use crate::markers::{write_indicator, IndicatorDir, ResumeMarkers};
use crate::metrics::MetricsExtractor;
use crate::raster::PixelCounter;
use crate::results::{aoi_label, format_timestamp, ExtentRow, ResultsFile};
use crate::spatial::{DatasetBuilder, SpatialDataset};
use crate::types::{Algorithm, FloodEvent, Layer, ProcessingStatus};
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::{error, info, info_span, warn};

/// Work done for one (event, algorithm) pair once its AOI is known.
pub trait PairProcessor {
    fn process(&self, event: &FloodEvent, algorithm: Algorithm, aoi: &EventAoi) -> Result<ProcessingStatus>;
}

/// What happened to one pair in this run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairOutcome {
    /// Already handled by an earlier run
    Skipped,
    Recorded(ProcessingStatus),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventReport {
    pub event_id: String,
    pub outcomes: Vec<(Algorithm, PairOutcome)>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub events: usize,
    pub skipped: usize,
    recorded: HashMap<ProcessingStatus, usize>,
}

impl BatchSummary {
    pub fn count(&self, status: ProcessingStatus) -> usize {
        self.recorded.get(&status).copied().unwrap_or(0)
    }

    pub fn processed(&self) -> usize {
        self.recorded.values().sum()
    }

    fn add(&mut self, report: &EventReport) {
        self.events += 1;
        for (_, outcome) in &report.outcomes {
            match outcome {
                PairOutcome::Skipped => self.skipped += 1,
                PairOutcome::Recorded(status) => *self.recorded.entry(*status).or_default() += 1,
            }
        }
    }
}

/// Drives a [`PairProcessor`] over a list of events.
pub struct BatchRunner<'a, A: AoiSource> {
    aoi_source: &'a A,
    indicator_root: PathBuf,
    markers: ResumeMarkers,
    algorithms: Vec<Algorithm>,
}

impl<'a, A: AoiSource> BatchRunner<'a, A> {
    /// `indicator_root` holds the marker directories; `output_dir` the
    /// finished outputs checked for resumption.
    pub fn new(
        aoi_source: &'a A,
        indicator_root: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
        algorithms: Vec<Algorithm>,
    ) -> Self {
        let indicator_root = indicator_root.into();
        Self {
            aoi_source,
            markers: ResumeMarkers::new(indicator_root.clone(), output_dir),
            indicator_root,
            algorithms,
        }
    }

    pub fn markers(&self) -> &ResumeMarkers {
        &self.markers
    }

    /// Run every event. Only ledger failures abort the batch.
    pub fn run<P: PairProcessor>(
        &self,
        processor: &P,
        events: &[FloodEvent],
        ledger: &mut Ledger,
        mut on_event: impl FnMut(&EventReport),
    ) -> Result<BatchSummary> {
        let mut summary = BatchSummary::default();
        for event in events {
            let report = self.run_event(processor, event, ledger)?;
            summary.add(&report);
            on_event(&report);
        }
        ledger.flush()?;
        info!(
            events = summary.events,
            processed = summary.processed(),
            skipped = summary.skipped,
            errors = summary.count(ProcessingStatus::Error),
            "Batch finished"
        );
        Ok(summary)
    }

    fn run_event<P: PairProcessor>(
        &self,
        processor: &P,
        event: &FloodEvent,
        ledger: &mut Ledger,
    ) -> Result<EventReport> {
        let _span = info_span!("event", event_id = %event.id).entered();
        let mut aoi: Option<Option<EventAoi>> = None;
        let mut outcomes = Vec::with_capacity(self.algorithms.len());

        // checked up front so markers written for one algorithm do not skip the next
        let already: Vec<bool> = self
            .algorithms
            .iter()
            .map(|algorithm| {
                self.markers
                    .is_already_processed(&event.id, *algorithm)
                    .unwrap_or_else(|e| {
                        warn!(algorithm = %algorithm, error = %e, "Resume check failed, processing anyway");
                        false
                    })
            })
            .collect();

        for (algorithm, already) in self.algorithms.iter().copied().zip(already) {
            if already {
                info!(algorithm = %algorithm, "Already processed, skipping");
                outcomes.push((algorithm, PairOutcome::Skipped));
                continue;
            }

            let status = match self.process_pair(processor, event, algorithm, &mut aoi) {
                Ok(status) => status,
                Err(e) => {
                    error!(
                        algorithm = %algorithm,
                        grid = %event.grid_code,
                        from = %event.from,
                        to = %event.to,
                        error = %e,
                        "Event failed"
                    );
                    ProcessingStatus::Error
                }
            };
            info!(algorithm = %algorithm, status = %status, "Recorded");
            ledger.record_status(&event.id, algorithm, status)?;
            outcomes.push((algorithm, PairOutcome::Recorded(status)));
        }

        ledger.finish_event(&event.id)?;
        Ok(EventReport {
            event_id: event.id.clone(),
            outcomes,
        })
    }

    fn process_pair<P: PairProcessor>(
        &self,
        processor: &P,
        event: &FloodEvent,
        algorithm: Algorithm,
        aoi: &mut Option<Option<EventAoi>>,
    ) -> Result<ProcessingStatus> {
        if aoi.is_none() {
            *aoi = Some(self.aoi_source.load(&event.id)?);
        }
        match aoi.as_ref().and_then(Option::as_ref) {
            Some(aoi) => processor.process(event, algorithm, aoi),
            None => {
                write_indicator(
                    &self.indicator_root,
                    IndicatorDir::NoAoi,
                    &event.id,
                    &format!("no AOI polygon for event {}", event.id),
                )?;
                Ok(ProcessingStatus::NoAoi)
            }
        }
    }
}

// ============================================================================
// Flood extent statistics
// ============================================================================

/// Index, select and measure flood extents for one pair.
pub struct ExtentProcessor<'a, B, C> {
    pub indexer: &'a Indexer,
    pub builder: &'a B,
    pub selector: AoiSelector,
    pub metrics: &'a MetricsExtractor<C>,
    pub grammars: GrammarTable,
    pub results_dir: PathBuf,
    pub buffer_days: u32,
}

impl<B: DatasetBuilder, C: PixelCounter> PairProcessor for ExtentProcessor<'_, B, C> {
    fn process(&self, event: &FloodEvent, algorithm: Algorithm, aoi: &EventAoi) -> Result<ProcessingStatus> {
        let marker = format!("{}_{}", event.id, algorithm);

        let files = self.indexer.find_images(
            event.from,
            event.to,
            &event.grid_code,
            algorithm,
            self.buffer_days,
        )?;
        if files.is_empty() {
            write_indicator(
                &self.results_dir,
                IndicatorDir::NoDataAtAll,
                &marker,
                &format!("no {} files for grid {}", algorithm, event.grid_code),
            )?;
            return Ok(ProcessingStatus::NoData);
        }

        let root = self
            .indexer
            .layout()
            .resolve_layout_root(event.from.date(), algorithm)?;
        let grammar = self
            .grammars
            .lookup(algorithm, Layer::FloodExtent, root.version)
            .ok_or_else(|| {
                FloodexError::Grammar(format!("no flood extent grammar for {}/{}", algorithm, root.version))
            })?;
        let dataset = self
            .builder
            .build(&files, algorithm, Layer::FloodExtent, root.version, grammar)?;

        let Some(selections) = self.selector.select_event(&dataset, aoi) else {
            write_indicator(
                &self.results_dir,
                IndicatorDir::NoData,
                &marker,
                &format!("{} of {} files intersect no AOI polygon", dataset.len(), files.len()),
            )?;
            return Ok(ProcessingStatus::NoData);
        };

        let mut results = ResultsFile::create(&self.results_dir, &event.id, algorithm)?;
        for (polygon, selection) in &selections {
            info!(
                algorithm = %algorithm,
                aoi = polygon + 1,
                stage = %selection.stage,
                rows = selection.dataset.len(),
                "AOI selected"
            );
            for extent in self.metrics.extract(&selection.dataset) {
                results.append(&ExtentRow {
                    event_id: event.id.clone(),
                    country: event.country.clone(),
                    aoi: aoi_label(*polygon),
                    timestamp: format_timestamp(&extent.timestamp),
                    extent_km2: extent.area_km2,
                    tile_name: extent.tiles.join(";"),
                })?;
            }
        }

        let finished = results.finish()?;
        info!(path = %finished.path.display(), rows = finished.rows, "Results written");
        Ok(if finished.missed() {
            ProcessingStatus::Missed
        } else {
            ProcessingStatus::Detected
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::FlushPolicy;
    use crate::spatial::SpatialRef;
    use chrono::NaiveDate;
    use geo::{LineString, Polygon};
    use std::cell::RefCell;
    use tempfile::TempDir;

    struct StaticAoi(Vec<&'static str>);

    impl AoiSource for StaticAoi {
        fn load(&self, event_id: &str) -> Result<Option<EventAoi>> {
            if event_id == "BROKEN" {
                return Err(FloodexError::InvalidState("unreadable AOI".to_string()));
            }
            if !self.0.contains(&event_id) {
                return Ok(None);
            }
            Ok(Some(EventAoi {
                polygons: vec![Polygon::new(
                    LineString::from(vec![(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 0.0)]),
                    vec![],
                )],
                sref: SpatialRef::WGS84,
            }))
        }
    }

    /// Returns `done`, except for DLR which always fails.
    struct Recorder {
        calls: RefCell<Vec<(String, Algorithm)>>,
    }

    impl PairProcessor for Recorder {
        fn process(&self, event: &FloodEvent, algorithm: Algorithm, _aoi: &EventAoi) -> Result<ProcessingStatus> {
            self.calls.borrow_mut().push((event.id.clone(), algorithm));
            if algorithm == Algorithm::Dlr {
                return Err(FloodexError::InvalidState("boom".to_string()));
            }
            Ok(ProcessingStatus::Done)
        }
    }

    fn event(id: &str) -> FloodEvent {
        let day = NaiveDate::from_ymd_opt(2023, 8, 1).unwrap();
        FloodEvent {
            id: id.to_string(),
            country: "Italy".to_string(),
            from: day.and_hms_opt(0, 0, 0).unwrap(),
            to: day.and_hms_opt(12, 0, 0).unwrap(),
            grid_code: "EU020M".to_string(),
            alert_level: None,
        }
    }

    #[test]
    fn test_errors_recorded_and_batch_continues() {
        let temp = TempDir::new().unwrap();
        let events = vec![event("FL-1"), event("FL-2"), event("BROKEN")];
        let ids: Vec<String> = events.iter().map(|e| e.id.clone()).collect();
        let mut ledger =
            Ledger::open_or_create(&temp.path().join("ledger.csv"), &ids, FlushPolicy::PerEvent).unwrap();

        let aoi = StaticAoi(vec!["FL-1"]);
        let runner = BatchRunner::new(
            &aoi,
            temp.path(),
            temp.path().join("completed"),
            vec![Algorithm::Ensemble, Algorithm::Dlr],
        );
        let processor = Recorder {
            calls: RefCell::new(Vec::new()),
        };
        let mut reports = Vec::new();
        let summary = runner
            .run(&processor, &events, &mut ledger, |r| reports.push(r.clone()))
            .unwrap();

        assert_eq!(reports.len(), 3);
        assert_eq!(summary.events, 3);
        assert_eq!(ledger.status("FL-1", Algorithm::Ensemble), Some(ProcessingStatus::Done));
        assert_eq!(ledger.status("FL-1", Algorithm::Dlr), Some(ProcessingStatus::Error));
        assert_eq!(ledger.status("FL-2", Algorithm::Ensemble), Some(ProcessingStatus::NoAoi));
        assert_eq!(ledger.status("FL-2", Algorithm::Dlr), Some(ProcessingStatus::NoAoi));
        assert_eq!(ledger.status("BROKEN", Algorithm::Dlr), Some(ProcessingStatus::Error));
        assert!(temp.path().join("no_aoi/FL-2.txt").exists());
        assert_eq!(summary.count(ProcessingStatus::Error), 3);
        assert_eq!(processor.calls.borrow().len(), 2);
    }

    #[test]
    fn test_no_aoi_pairs_skipped_on_rerun() {
        let temp = TempDir::new().unwrap();
        let events = vec![event("FL-2")];
        let ids = vec!["FL-2".to_string()];
        let aoi = StaticAoi(vec![]);
        let runner = BatchRunner::new(&aoi, temp.path(), temp.path().join("completed"), vec![Algorithm::Tuw]);
        let processor = Recorder {
            calls: RefCell::new(Vec::new()),
        };

        let mut ledger =
            Ledger::open_or_create(&temp.path().join("ledger.csv"), &ids, FlushPolicy::PerEvent).unwrap();
        runner.run(&processor, &events, &mut ledger, |_| {}).unwrap();
        let second = runner.run(&processor, &events, &mut ledger, |_| {}).unwrap();

        assert_eq!(second.skipped, 1);
        assert_eq!(second.processed(), 0);
        assert_eq!(ledger.status("FL-2", Algorithm::Tuw), Some(ProcessingStatus::NoAoi));
    }
}

//! `floodex extent`: flood extent statistics per event and algorithm.

use crate::cli::context::{
    buffer_days_parser, progress_bar, register_builder, select_events, EventArgs, Loaded,
};
use crate::cli::output::print_summary;
use anyhow::{Context, Result};
use floodex_scout::{
    Algorithm, BatchRunner, ExtentProcessor, FlushPolicy, GeoJsonAoiSource, GrammarTable, Indexer,
    Ledger, MetricsExtractor,
};
use tracing::info;

#[derive(Debug, clap::Args)]
pub struct ExtentArgs {
    #[command(flatten)]
    pub events: EventArgs,

    /// Algorithms to run, overriding the configured list (repeatable)
    #[arg(short = 'a', long = "algorithm")]
    pub algorithms: Vec<Algorithm>,

    /// Pixel-count workers; 0 reads sequentially
    #[arg(short = 'w', long)]
    pub workers: Option<usize>,

    /// Day buffer around each event window
    #[arg(long, value_parser = buffer_days_parser())]
    pub buffer_days: Option<u32>,

    /// Write the ledger once at the end instead of after every event
    #[arg(long)]
    pub flush_at_end: bool,

    /// Print the summary as JSON
    #[arg(long)]
    pub json: bool,
}

pub fn run(args: ExtentArgs, loaded: &Loaded) -> Result<()> {
    let mut config = loaded.config.clone();
    if !args.algorithms.is_empty() {
        config.run.algorithms = args.algorithms.clone();
    }
    if let Some(workers) = args.workers {
        config.run.workers = workers;
    }
    if let Some(days) = args.buffer_days {
        config.run.buffer_days = days;
    }
    if args.flush_at_end {
        config.run.flush = FlushPolicy::EndOfBatch;
    }

    let selection = select_events(&config, &args.events)?;
    let indexer = Indexer::new(config.storage_layout()?);
    let builder = register_builder(&config)?;
    let metrics = MetricsExtractor::new(
        config.pixel_counter(),
        config.raster.pixel_size_m,
        config.processing_mode(),
    )?;
    let processor = ExtentProcessor {
        indexer: &indexer,
        builder: &builder,
        selector: config.selector(),
        metrics: &metrics,
        grammars: GrammarTable::default(),
        results_dir: config.paths.results_dir.clone(),
        buffer_days: config.run.buffer_days,
    };

    let ledger_path = config.extent_ledger_path();
    let mut ledger = Ledger::open_or_create(&ledger_path, &selection.catalog_ids, config.run.flush)
        .with_context(|| format!("Failed to open ledger {}", ledger_path.display()))?;

    let aoi = GeoJsonAoiSource::new(&config.paths.aoi_dir);
    let results_dir = &config.paths.results_dir;
    let runner = BatchRunner::new(&aoi, results_dir, results_dir, config.run.algorithms.clone());

    info!(
        events = selection.events.len(),
        algorithms = config.run.algorithms.len(),
        results = %results_dir.display(),
        "Starting extent run"
    );
    let pb = progress_bar(selection.events.len(), args.json);
    let summary = runner.run(&processor, &selection.events, &mut ledger, |report| {
        pb.set_message(report.event_id.clone());
        pb.inc(1);
    })?;
    pb.finish_and_clear();

    print_summary(&summary, args.json)
}

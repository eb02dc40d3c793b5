//! `floodex layers`: copy AOI-selected layer files per event.

use crate::cli::context::{
    buffer_days_parser, progress_bar, register_builder, select_events, EventArgs, Loaded,
};
use crate::cli::output::print_summary;
use anyhow::{Context, Result};
use floodex_scout::markers::IndicatorDir;
use floodex_scout::{
    Algorithm, BatchRunner, GeoJsonAoiSource, GrammarTable, Indexer, LayersProcessor, Ledger,
};
use tracing::info;

#[derive(Debug, clap::Args)]
pub struct LayersArgs {
    #[command(flatten)]
    pub events: EventArgs,

    /// Algorithms to retrieve, overriding the configured list (repeatable)
    #[arg(short = 'a', long = "algorithm")]
    pub algorithms: Vec<Algorithm>,

    /// Day buffer around each event window
    #[arg(long, value_parser = buffer_days_parser())]
    pub buffer_days: Option<u32>,

    /// Print the summary as JSON
    #[arg(long)]
    pub json: bool,
}

pub fn run(args: LayersArgs, loaded: &Loaded) -> Result<()> {
    let mut config = loaded.config.clone();
    if !args.algorithms.is_empty() {
        config.run.algorithms = args.algorithms.clone();
    }
    if let Some(days) = args.buffer_days {
        config.run.layers_buffer_days = days;
    }

    let selection = select_events(&config, &args.events)?;
    let indexer = Indexer::new(config.storage_layout()?);
    let builder = register_builder(&config)?;
    let layers_dir = config.paths.layers_dir.clone();
    let processor = LayersProcessor {
        indexer: &indexer,
        builder: &builder,
        selector: config.selector(),
        grammars: GrammarTable::default(),
        layers_dir: layers_dir.clone(),
        buffer_days: config.run.layers_buffer_days,
    };

    let ledger_path = config.layers_ledger_path();
    let mut ledger = Ledger::open_or_create(&ledger_path, &selection.catalog_ids, config.run.flush)
        .with_context(|| format!("Failed to open ledger {}", ledger_path.display()))?;

    let aoi = GeoJsonAoiSource::new(&config.paths.aoi_dir);
    let runner = BatchRunner::new(
        &aoi,
        &layers_dir,
        IndicatorDir::Completed.path(&layers_dir),
        config.run.algorithms.clone(),
    );

    info!(
        events = selection.events.len(),
        layers = %layers_dir.display(),
        "Starting layer retrieval"
    );
    let pb = progress_bar(selection.events.len(), args.json);
    let summary = runner.run(&processor, &selection.events, &mut ledger, |report| {
        pb.set_message(report.event_id.clone());
        pb.inc(1);
    })?;
    pb.finish_and_clear();

    print_summary(&summary, args.json)
}

//! `floodex index`: list the archive files found for one event.

use crate::cli::context::{buffer_days_parser, Loaded};
use crate::cli::output::print_table;
use anyhow::{anyhow, bail, Context, Result};
use floodex_scout::catalog::parse_catalog_time;
use floodex_scout::{load_catalog, Algorithm, FloodEvent, FloodexConfig, Indexer, Layer};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

#[derive(Debug, clap::Args)]
pub struct IndexArgs {
    /// Event id from the catalog
    #[arg(required_unless_present_all = ["from", "to", "grid"])]
    pub event: Option<String>,

    /// Window start (`YYYY-MM-DD[THH:MM:SS]`) when no event id is given
    #[arg(long, conflicts_with = "event")]
    pub from: Option<String>,

    /// Window end
    #[arg(long, conflicts_with = "event")]
    pub to: Option<String>,

    /// Equi7 grid code
    #[arg(long, conflicts_with = "event")]
    pub grid: Option<String>,

    /// Algorithm whose files to list
    #[arg(short = 'a', long = "algorithm", default_value = "ensemble")]
    pub algorithm: Algorithm,

    /// Index all five layers instead of flood extent only
    #[arg(long)]
    pub layers: bool,

    /// Day buffer around the event window (defaults to the configured one)
    #[arg(long, value_parser = buffer_days_parser())]
    pub buffer_days: Option<u32>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Serialize)]
struct IndexJson {
    event_id: String,
    algorithm: Algorithm,
    grid: String,
    period: String,
    files: BTreeMap<&'static str, Vec<PathBuf>>,
}

/// The catalog event named on the command line, or an ad-hoc one built
/// from `--from/--to/--grid`.
fn resolve_event(args: &IndexArgs, config: &FloodexConfig) -> Result<FloodEvent> {
    if let Some(id) = &args.event {
        let catalog = load_catalog(&config.paths.catalog).with_context(|| {
            format!("Failed to read catalog {}", config.paths.catalog.display())
        })?;
        return catalog
            .into_iter()
            .find(|e| &e.id == id)
            .ok_or_else(|| anyhow!("Event '{}' is not in {}", id, config.paths.catalog.display()));
    }

    let time = |raw: &Option<String>, flag: &str| -> Result<_> {
        let raw = raw.as_deref().unwrap_or_default();
        parse_catalog_time(raw).ok_or_else(|| anyhow!("Invalid --{} '{}'", flag, raw))
    };
    let from = time(&args.from, "from")?;
    let to = time(&args.to, "to")?;
    if to < from {
        bail!("--to {} is before --from {}", to, from);
    }
    Ok(FloodEvent {
        id: "adhoc".to_string(),
        country: String::new(),
        from,
        to,
        grid_code: args.grid.clone().unwrap_or_default(),
        alert_level: None,
    })
}

pub fn run(args: IndexArgs, loaded: &Loaded) -> Result<()> {
    let config = &loaded.config;
    let event = resolve_event(&args, config)?;

    let layout = config.storage_layout()?;
    let period = layout.period_for(event.from.date())?.name.clone();
    let indexer = Indexer::new(layout);
    let mut files = BTreeMap::new();
    if args.layers {
        let buffer = args.buffer_days.unwrap_or(config.run.layers_buffer_days);
        let (_, images) =
            indexer.find_layer_images(event.from, event.to, &event.grid_code, args.algorithm, buffer)?;
        for layer in Layer::ALL {
            files.insert(layer.as_str(), images.get(layer).to_vec());
        }
    } else {
        let buffer = args.buffer_days.unwrap_or(config.run.buffer_days);
        let found =
            indexer.find_images(event.from, event.to, &event.grid_code, args.algorithm, buffer)?;
        files.insert(Layer::FloodExtent.as_str(), found);
    }

    let result = IndexJson {
        event_id: event.id.clone(),
        algorithm: args.algorithm,
        grid: event.grid_code.clone(),
        period,
        files,
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    println!(
        "{} ({}, {} to {}) in period '{}'",
        result.event_id, result.grid, event.from, event.to, result.period
    );
    let rows = result
        .files
        .iter()
        .map(|(layer, paths)| vec![layer.to_string(), paths.len().to_string()])
        .collect();
    print_table(&["Layer", "Files"], rows);
    for paths in result.files.values() {
        for path in paths {
            println!("{}", path.display());
        }
    }
    Ok(())
}

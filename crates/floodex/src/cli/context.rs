//! Shared command context: resolved configuration, catalog selection and
//! the pieces every batch command builds from it.

use anyhow::{Context, Result};
use floodex_logging::floodex_home;
use floodex_scout::{
    load_catalog, CatalogFilter, FileRegisterBuilder, FloodEvent, FloodexConfig, GrammarTable,
    TileIndex, MAX_BUFFER_DAYS,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Configuration as resolved for this invocation.
#[derive(Debug, Clone)]
pub struct Loaded {
    pub path: PathBuf,
    /// False when no file existed and defaults are in use
    pub from_file: bool,
    pub config: FloodexConfig,
}

/// Default config location: `~/.floodex/config.toml`
pub fn default_config_path() -> PathBuf {
    floodex_home().join("config.toml")
}

/// Load `explicit` (which must exist), else the default file if present,
/// else built-in defaults.
pub fn load_config(explicit: Option<&Path>) -> Result<Loaded> {
    if let Some(path) = explicit {
        let config = FloodexConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?;
        return Ok(Loaded {
            path: path.to_path_buf(),
            from_file: true,
            config,
        });
    }

    let path = default_config_path();
    if path.is_file() {
        let config = FloodexConfig::load(&path)
            .with_context(|| format!("Failed to load config {}", path.display()))?;
        return Ok(Loaded {
            path,
            from_file: true,
            config,
        });
    }

    defaults_at(path)
}

/// Built-in defaults, validated like a loaded file.
fn defaults_at(path: PathBuf) -> Result<Loaded> {
    let config = FloodexConfig::default();
    config
        .validate()
        .context("Built-in default configuration is invalid")?;
    Ok(Loaded {
        path,
        from_file: false,
        config,
    })
}

/// `--buffer-days` values, capped at [`MAX_BUFFER_DAYS`].
pub fn buffer_days_parser() -> clap::builder::RangedI64ValueParser<u32> {
    clap::value_parser!(u32).range(0..=i64::from(MAX_BUFFER_DAYS))
}

/// Catalog selection flags shared by batch commands.
#[derive(Debug, Clone, clap::Args)]
pub struct EventArgs {
    /// Only process these event ids (repeatable)
    #[arg(short = 'e', long = "event")]
    pub events: Vec<String>,

    /// Skip the first N selected events
    #[arg(long, default_value = "0")]
    pub skip: usize,

    /// Process at most N events
    #[arg(long)]
    pub limit: Option<usize>,
}

impl EventArgs {
    pub fn filter(&self) -> CatalogFilter {
        CatalogFilter {
            events: self.events.clone(),
            skip: self.skip,
            limit: self.limit,
        }
    }
}

/// Whole catalog plus the events selected for this run.
pub struct EventSelection {
    pub catalog_ids: Vec<String>,
    pub events: Vec<FloodEvent>,
}

pub fn select_events(config: &FloodexConfig, args: &EventArgs) -> Result<EventSelection> {
    let catalog = load_catalog(&config.paths.catalog)
        .with_context(|| format!("Failed to read catalog {}", config.paths.catalog.display()))?;
    let catalog_ids = catalog.iter().map(|e| e.id.clone()).collect();
    let events = args.filter().apply(catalog);
    Ok(EventSelection {
        catalog_ids,
        events,
    })
}

pub fn register_builder(config: &FloodexConfig) -> Result<FileRegisterBuilder> {
    let tiles = TileIndex::load(&config.paths.tile_index)
        .with_context(|| format!("Failed to load tile index {}", config.paths.tile_index.display()))?;
    Ok(
        FileRegisterBuilder::new(GrammarTable::default(), Arc::new(tiles))
            .with_max_polygon_vertices(config.selection.max_polygon_vertices),
    )
}

/// Event progress bar; hidden in JSON mode so stdout stays parseable.
pub fn progress_bar(len: usize, hidden: bool) -> ProgressBar {
    if hidden {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(len as u64);
    let style = ProgressStyle::with_template(
        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .progress_chars("=>-");
    pb.set_style(style);
    pb
}

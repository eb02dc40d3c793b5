//! `floodex config`: show the resolved configuration or write a starter file.

use crate::cli::context::Loaded;
use crate::cli::output::print_table;
use anyhow::{bail, Context, Result};
use floodex_scout::FloodexConfig;

/// Arguments for the config command
#[derive(Debug, clap::Args)]
pub struct ConfigArgs {
    /// Write the default configuration to the config path
    #[arg(long)]
    pub init: bool,

    /// Overwrite an existing file with --init
    #[arg(long, requires = "init")]
    pub force: bool,

    /// Show the resolved configuration as JSON
    #[arg(long)]
    pub json: bool,
}

pub fn run(args: ConfigArgs, loaded: &Loaded) -> Result<()> {
    if args.init {
        return init(&args, loaded);
    }

    let config = &loaded.config;
    if args.json {
        let resolved = serde_json::to_value(config)?;
        let value = serde_json::json!({
            "path": loaded.path.to_string_lossy(),
            "from_file": loaded.from_file,
            "config": resolved,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    let source = if loaded.from_file { "" } else { " (not found, using defaults)" };
    println!("Config: {}{}", loaded.path.display(), source);
    println!();
    print_table(
        &["Path", "Location"],
        vec![
            vec!["catalog".to_string(), config.paths.catalog.display().to_string()],
            vec!["aoi_dir".to_string(), config.paths.aoi_dir.display().to_string()],
            vec!["results_dir".to_string(), config.paths.results_dir.display().to_string()],
            vec!["layers_dir".to_string(), config.paths.layers_dir.display().to_string()],
            vec!["tile_index".to_string(), config.paths.tile_index.display().to_string()],
        ],
    );
    print_table(
        &["Period", "Start", "End", "Root"],
        config
            .storage_periods
            .iter()
            .map(|p| {
                vec![
                    p.name.clone(),
                    p.start.to_string(),
                    p.end.map(|d| d.to_string()).unwrap_or_else(|| "open".to_string()),
                    p.root.display().to_string(),
                ]
            })
            .collect(),
    );
    let algorithms: Vec<&str> = config.run.algorithms.iter().map(|a| a.as_str()).collect();
    println!("Algorithms: {}", algorithms.join(", "));
    println!(
        "Buffer days: {} (extent), {} (layers); flush {}; workers {}",
        config.run.buffer_days,
        config.run.layers_buffer_days,
        config.run.flush.as_str(),
        config.run.workers
    );
    Ok(())
}

fn init(args: &ConfigArgs, loaded: &Loaded) -> Result<()> {
    let path = &loaded.path;
    if path.exists() && !args.force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    FloodexConfig::default()
        .save(path)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    println!("Wrote default configuration to {}", path.display());
    Ok(())
}

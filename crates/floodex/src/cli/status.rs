//! `floodex status`: per-algorithm status counts from a ledger.

use crate::cli::context::Loaded;
use crate::cli::output::{print_table, REPORTED_STATUSES};
use anyhow::{Context, Result};
use floodex_scout::{Algorithm, Ledger, ProcessingStatus};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, clap::Args)]
pub struct StatusArgs {
    /// Read the layer retrieval ledger instead of the extent ledger
    #[arg(long)]
    pub layers: bool,

    /// List events with unprocessed or errored pairs
    #[arg(long)]
    pub pending: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Serialize)]
struct StatusJson {
    ledger: String,
    events: usize,
    processed: usize,
    counts: BTreeMap<&'static str, BTreeMap<&'static str, usize>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pending: Option<Vec<String>>,
}

fn needs_work(status: ProcessingStatus) -> bool {
    matches!(status, ProcessingStatus::Unprocessed | ProcessingStatus::Error)
}

pub fn run(args: StatusArgs, loaded: &Loaded) -> Result<()> {
    let path = if args.layers {
        loaded.config.layers_ledger_path()
    } else {
        loaded.config.extent_ledger_path()
    };
    let ledger = Ledger::load(&path)
        .with_context(|| format!("Failed to read ledger {}", path.display()))?;
    let algorithms = &loaded.config.run.algorithms;

    let mut counts: BTreeMap<&'static str, BTreeMap<&'static str, usize>> = BTreeMap::new();
    for algorithm in algorithms {
        let per_status = counts.entry(algorithm.as_str()).or_default();
        for row in ledger.rows() {
            *per_status.entry(row.status(*algorithm).label()).or_default() += 1;
        }
    }
    let pending = args.pending.then(|| {
        ledger
            .rows()
            .iter()
            .filter(|row| algorithms.iter().any(|a| needs_work(row.status(*a))))
            .map(|row| row.event_id.clone())
            .collect::<Vec<_>>()
    });

    let report = StatusJson {
        ledger: path.display().to_string(),
        events: ledger.rows().len(),
        processed: ledger.rows().iter().filter(|r| r.processed).count(),
        counts,
        pending,
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("{}: {} events, {} processed", report.ledger, report.events, report.processed);
    let mut headers = vec!["Algorithm"];
    headers.extend(REPORTED_STATUSES.iter().map(ProcessingStatus::label));
    let rows = algorithms
        .iter()
        .map(|algorithm: &Algorithm| {
            let per_status = report.counts.get(algorithm.as_str());
            let mut row = vec![algorithm.to_string()];
            row.extend(REPORTED_STATUSES.iter().map(|s| {
                per_status
                    .and_then(|m| m.get(s.label()))
                    .copied()
                    .unwrap_or(0)
                    .to_string()
            }));
            row
        })
        .collect();
    print_table(&headers, rows);

    if let Some(pending) = &report.pending {
        println!("{} events need work:", pending.len());
        for id in pending {
            println!("  {}", id);
        }
    }
    Ok(())
}

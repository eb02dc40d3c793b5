//! Output formatting utilities for CLI commands

use comfy_table::{presets::UTF8_FULL_CONDENSED, Cell, Color, ContentArrangement, Table};
use floodex_scout::pipeline::BatchSummary;
use floodex_scout::ProcessingStatus;
use serde::Serialize;
use std::collections::BTreeMap;

/// Statuses shown in summaries, in display order.
pub const REPORTED_STATUSES: [ProcessingStatus; 7] = [
    ProcessingStatus::Detected,
    ProcessingStatus::Missed,
    ProcessingStatus::Done,
    ProcessingStatus::NoData,
    ProcessingStatus::NoAoi,
    ProcessingStatus::Error,
    ProcessingStatus::Unprocessed,
];

/// Print a table with headers and rows
pub fn print_table(headers: &[&str], rows: Vec<Vec<String>>) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic);

    let header_cells: Vec<Cell> = headers
        .iter()
        .map(|h| Cell::new(h).fg(Color::Cyan))
        .collect();
    table.set_header(header_cells);

    for row in rows {
        table.add_row(row);
    }

    println!("{}", table);
}

pub fn status_color(status: ProcessingStatus) -> Color {
    match status {
        ProcessingStatus::Detected | ProcessingStatus::Done => Color::Green,
        ProcessingStatus::Missed => Color::Yellow,
        ProcessingStatus::Error => Color::Red,
        _ => Color::Grey,
    }
}

/// JSON shape of a batch summary.
#[derive(Debug, Serialize)]
pub struct SummaryJson {
    pub events: usize,
    pub processed: usize,
    pub skipped: usize,
    pub statuses: BTreeMap<&'static str, usize>,
}

impl From<&BatchSummary> for SummaryJson {
    fn from(summary: &BatchSummary) -> Self {
        let statuses = REPORTED_STATUSES
            .iter()
            .map(|s| (s.label(), summary.count(*s)))
            .filter(|(_, n)| *n > 0)
            .collect();
        Self {
            events: summary.events,
            processed: summary.processed(),
            skipped: summary.skipped,
            statuses,
        }
    }
}

pub fn print_summary(summary: &BatchSummary, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(&SummaryJson::from(summary))?);
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Outcome").fg(Color::Cyan),
            Cell::new("Pairs").fg(Color::Cyan),
        ]);
    for status in REPORTED_STATUSES {
        let n = summary.count(status);
        if n > 0 {
            table.add_row(vec![
                Cell::new(status.label()).fg(status_color(status)),
                Cell::new(n),
            ]);
        }
    }
    table.add_row(vec![Cell::new("skipped"), Cell::new(summary.skipped)]);

    println!("{} events", summary.events);
    println!("{}", table);
    Ok(())
}

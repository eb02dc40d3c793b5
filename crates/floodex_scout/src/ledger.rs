//! Processing ledger
//!
//! One row per catalog event with a `processed` flag and one status column per
//! algorithm. The whole table is held in memory for the batch and rewritten
//! (never appended) through a temp file and rename.

use crate::error::{FloodexError, Result};
use crate::types::{Algorithm, ProcessingStatus};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// When the ledger is written back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlushPolicy {
    /// After every event; a crash loses at most the event in flight
    #[default]
    PerEvent,
    /// Once, when the batch ends
    EndOfBatch,
}

impl FlushPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PerEvent => "per_event",
            Self::EndOfBatch => "end_of_batch",
        }
    }
}

fn status_column(algorithm: Algorithm) -> String {
    format!("status_{}", algorithm)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerRow {
    pub event_id: String,
    pub processed: bool,
    statuses: [ProcessingStatus; 4],
}

impl LedgerRow {
    fn new(event_id: &str) -> Self {
        Self {
            event_id: event_id.to_string(),
            processed: false,
            statuses: [ProcessingStatus::Unprocessed; 4],
        }
    }

    fn slot(algorithm: Algorithm) -> usize {
        Algorithm::ALL
            .iter()
            .position(|a| *a == algorithm)
            .unwrap_or_default()
    }

    pub fn status(&self, algorithm: Algorithm) -> ProcessingStatus {
        self.statuses[Self::slot(algorithm)]
    }

    fn set_status(&mut self, algorithm: Algorithm, status: ProcessingStatus) {
        self.statuses[Self::slot(algorithm)] = status;
    }
}

/// In-memory ledger bound to a CSV file.
#[derive(Debug)]
pub struct Ledger {
    path: PathBuf,
    rows: Vec<LedgerRow>,
    index: HashMap<String, usize>,
    flush_policy: FlushPolicy,
    dirty: bool,
}

impl Ledger {
    /// Load the ledger at `path`, adding rows for events it does not know yet.
    ///
    /// A new or extended ledger is written immediately.
    pub fn open_or_create(path: &Path, event_ids: &[String], flush_policy: FlushPolicy) -> Result<Self> {
        let existed = path.exists();
        let rows = if existed { read_rows(path)? } else { Vec::new() };

        let mut ledger = Self {
            path: path.to_path_buf(),
            index: HashMap::with_capacity(rows.len()),
            rows: Vec::new(),
            flush_policy,
            dirty: !existed,
        };
        for row in rows {
            ledger.push(row);
        }
        for id in event_ids {
            if !ledger.index.contains_key(id) {
                ledger.push(LedgerRow::new(id));
                ledger.dirty = true;
            }
        }

        if ledger.dirty {
            ledger.flush()?;
        }
        info!(
            path = %path.display(),
            rows = ledger.rows.len(),
            flush = flush_policy.as_str(),
            "Opened ledger"
        );
        Ok(ledger)
    }

    /// Read-only load for reporting.
    pub fn load(path: &Path) -> Result<Self> {
        let rows = read_rows(path)?;
        let mut ledger = Self {
            path: path.to_path_buf(),
            index: HashMap::with_capacity(rows.len()),
            rows: Vec::new(),
            flush_policy: FlushPolicy::EndOfBatch,
            dirty: false,
        };
        for row in rows {
            ledger.push(row);
        }
        Ok(ledger)
    }

    fn push(&mut self, row: LedgerRow) {
        self.index.insert(row.event_id.clone(), self.rows.len());
        self.rows.push(row);
    }

    fn row_mut(&mut self, event_id: &str) -> Result<&mut LedgerRow> {
        let i = *self.index.get(event_id).ok_or_else(|| {
            FloodexError::InvalidState(format!("event '{}' is not in the ledger", event_id))
        })?;
        Ok(&mut self.rows[i])
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn flush_policy(&self) -> FlushPolicy {
        self.flush_policy
    }

    pub fn rows(&self) -> &[LedgerRow] {
        &self.rows
    }

    pub fn status(&self, event_id: &str, algorithm: Algorithm) -> Option<ProcessingStatus> {
        self.index
            .get(event_id)
            .map(|i| self.rows[*i].status(algorithm))
    }

    pub fn record_status(
        &mut self,
        event_id: &str,
        algorithm: Algorithm,
        status: ProcessingStatus,
    ) -> Result<()> {
        self.row_mut(event_id)?.set_status(algorithm, status);
        self.dirty = true;
        debug!(event_id, algorithm = %algorithm, status = %status, "Recorded status");
        Ok(())
    }

    /// Mark an event processed and flush if the policy says so.
    pub fn finish_event(&mut self, event_id: &str) -> Result<()> {
        self.row_mut(event_id)?.processed = true;
        self.dirty = true;
        if self.flush_policy == FlushPolicy::PerEvent {
            self.flush()?;
        }
        Ok(())
    }

    /// Rewrite the whole file if anything changed.
    pub fn flush(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let tmp = self.path.with_extension("csv.tmp");
        {
            let mut writer = csv::Writer::from_path(&tmp)?;
            let mut header = vec!["event_id".to_string(), "processed".to_string()];
            header.extend(Algorithm::ALL.iter().map(|a| status_column(*a)));
            writer.write_record(&header)?;
            for row in &self.rows {
                let mut record = vec![row.event_id.clone(), row.processed.to_string()];
                record.extend(
                    Algorithm::ALL
                        .iter()
                        .map(|a| row.status(*a).as_str().to_string()),
                );
                writer.write_record(&record)?;
            }
            writer.flush()?;
        }
        fs::rename(&tmp, &self.path)?;
        self.dirty = false;
        Ok(())
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" => Some(true),
        "false" | "0" | "" => Some(false),
        _ => None,
    }
}

fn read_rows(path: &Path) -> Result<Vec<LedgerRow>> {
    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.clone();
    let column = |name: &str| headers.iter().position(|h| h == name);

    let id_col = column("event_id").ok_or_else(|| {
        FloodexError::InvalidState(format!("{}: missing event_id column", path.display()))
    })?;
    let processed_col = column("processed");
    let status_cols: Vec<(Algorithm, usize)> = Algorithm::ALL
        .iter()
        .filter_map(|a| column(&status_column(*a)).map(|i| (*a, i)))
        .collect();

    let mut rows = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record = record?;
        let id = record.get(id_col).unwrap_or_default();
        let mut row = LedgerRow::new(id);

        if let Some(col) = processed_col {
            let raw = record.get(col).unwrap_or_default();
            row.processed = parse_bool(raw).ok_or_else(|| {
                FloodexError::InvalidState(format!(
                    "{} row {}: bad processed flag '{}'",
                    path.display(),
                    line + 1,
                    raw
                ))
            })?;
        }
        for (algorithm, col) in &status_cols {
            let raw = record.get(*col).unwrap_or_default();
            let status = ProcessingStatus::parse(raw).ok_or_else(|| {
                FloodexError::InvalidState(format!(
                    "{} row {}: unknown status '{}'",
                    path.display(),
                    line + 1,
                    raw
                ))
            })?;
            row.set_status(*algorithm, status);
        }
        rows.push(row);
    }
    Ok(rows)
}

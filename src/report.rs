use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::{fs::File, io::BufWriter, path::Path};

use crate::aggregate::OutputTable;
use crate::lookup::Identifier;
use crate::retry::{RoundStats, RunOutcome, RunStatus};

/// Summary of one run, written as JSON next to the table.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub generated_at: DateTime<Utc>,
    pub identifiers: usize,
    pub outcome: RunStatus,
    pub rounds: Vec<RoundStats>,
    pub row_sets: usize,
    pub rows: usize,
    pub columns: Vec<String>,
    pub unresolved: Vec<Identifier>,
}

impl RunReport {
    pub fn new(identifiers: usize, run: &RunOutcome, table: Option<&OutputTable>) -> Self {
        Self {
            generated_at: Utc::now(),
            identifiers,
            outcome: run.status,
            rounds: run.rounds.clone(),
            row_sets: run.results.len(),
            rows: table.map_or(0, |t| t.len()),
            columns: table.map(|t| t.columns().to_vec()).unwrap_or_default(),
            unresolved: run.unresolved.clone(),
        }
    }

    pub fn write(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let file = File::create(path)
            .with_context(|| format!("creating report {}", path.display()))?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)
            .with_context(|| format!("writing report {}", path.display()))?;
        Ok(())
    }
}

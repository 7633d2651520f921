// src/pipeline.rs

use anyhow::Result;
use std::{path::Path, sync::Arc};
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::aggregate::aggregate;
use crate::config::Settings;
use crate::error::AggregateError;
use crate::input::read_identifiers;
use crate::lookup::Lookup;
use crate::output::write_table;
use crate::report::RunReport;
use crate::retry::{RetryScheduler, RunStatus};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchStatus {
    /// Every identifier resolved and the table was written.
    Complete,
    /// A retry cap was hit; the table holds what did resolve.
    Partial { unresolved: usize },
    /// Nothing to write.
    NoData,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchSummary {
    pub status: BatchStatus,
    pub identifiers: usize,
    pub rounds: usize,
    pub rows: usize,
}

/// Read identifiers, run the retry loop, merge and write the table.
///
/// Only structural problems (unreadable input, unwritable output) are `Err`.
pub async fn run(
    settings: &Settings,
    input: &Path,
    output: &Path,
    report: Option<&Path>,
) -> Result<BatchSummary> {
    let start = Instant::now();
    let ids = read_identifiers(input, settings.input_delimiter)?;
    let identifiers = ids.len();

    let lookup = Lookup::new(Arc::new(settings.command()), settings.row_policy);
    let scheduler = RetryScheduler::new(lookup, settings.retry_policy());
    let run = scheduler.run(ids).await?;

    let table = match aggregate(&run.results) {
        Ok(table) => Some(table),
        Err(AggregateError::NoData) => None,
    };

    if let Some(table) = &table {
        write_table(table, output, settings.format, settings.output_delimiter)?;
    }
    if let Some(path) = report {
        RunReport::new(identifiers, &run, table.as_ref()).write(path)?;
        info!(path = %path.display(), "wrote report");
    }

    let status = match (&table, run.status) {
        (None, _) => {
            error!(identifiers, "no data obtained; nothing written");
            BatchStatus::NoData
        }
        (Some(_), RunStatus::GaveUp { reason }) => {
            warn!(unresolved = ?run.unresolved, ?reason, "wrote partial table");
            BatchStatus::Partial {
                unresolved: run.unresolved.len(),
            }
        }
        (Some(_), RunStatus::Completed) => BatchStatus::Complete,
    };

    let summary = BatchSummary {
        status,
        identifiers,
        rounds: run.rounds.len(),
        rows: table.as_ref().map_or(0, |t| t.len()),
    };
    info!(?summary, elapsed = ?start.elapsed(), "batch finished");
    Ok(summary)
}

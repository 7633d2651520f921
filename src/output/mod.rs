//! Writers for the aggregated table.

use anyhow::{Context, Result};
use csv::WriterBuilder;
use arrow::{
    array::{ArrayRef, StringArray},
    datatypes::{DataType, Field, Schema},
    record_batch::RecordBatch,
};
use parquet::{arrow::ArrowWriter, basic::Compression, file::properties::WriterProperties};
use serde::{Deserialize, Serialize};
use std::{
    fs::{self, File},
    path::Path,
    sync::Arc,
};
use tracing::info;

use crate::aggregate::OutputTable;
use crate::config::delimiter_byte;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Delimited text with a header row.
    #[default]
    Tsv,
    /// Parquet with every column as nullable Utf8.
    Parquet,
}

pub fn write_table(
    table: &OutputTable,
    path: impl AsRef<Path>,
    format: OutputFormat,
    delimiter: char,
) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating output directory {}", parent.display()))?;
    }
    match format {
        OutputFormat::Tsv => write_delimited(table, path, delimiter)?,
        OutputFormat::Parquet => write_parquet(table, path)?,
    }
    info!(path = %path.display(), rows = table.len(), columns = table.columns().len(), ?format, "wrote table");
    Ok(())
}

/// Header row, then one line per row. Absent values are written empty; the
/// CSV writer quotes fields holding the delimiter, a quote or a line break.
pub fn write_delimited(table: &OutputTable, path: &Path, delimiter: char) -> Result<()> {
    let mut wtr = WriterBuilder::new()
        .delimiter(delimiter_byte(delimiter)?)
        .from_path(path)
        .with_context(|| format!("creating {}", path.display()))?;

    wtr.write_record(table.columns())
        .context("writing header")?;
    for (idx, row) in table.rows().iter().enumerate() {
        wtr.write_record(row.iter().map(|v| v.as_deref().unwrap_or("")))
            .with_context(|| format!("writing row {}", idx))?;
    }
    wtr.flush().with_context(|| format!("flushing {}", path.display()))?;
    Ok(())
}

pub fn write_parquet(table: &OutputTable, path: &Path) -> Result<()> {
    let schema = Arc::new(Schema::new(
        table
            .columns()
            .iter()
            .map(|c| Field::new(c, DataType::Utf8, true))
            .collect::<Vec<_>>(),
    ));

    let arrays: Vec<ArrayRef> = (0..table.columns().len())
        .map(|i| {
            Arc::new(
                table
                    .rows()
                    .iter()
                    .map(|r| r[i].as_deref())
                    .collect::<StringArray>(),
            ) as ArrayRef
        })
        .collect();

    let batch = RecordBatch::try_new(schema.clone(), arrays).context("building record batch")?;
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();
    let mut writer =
        ArrowWriter::try_new(file, schema, Some(props)).context("creating Arrow writer")?;
    writer.write(&batch).context("writing batch")?;
    writer.close().context("closing parquet writer")?;
    Ok(())
}

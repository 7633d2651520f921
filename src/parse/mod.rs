// src/parse/mod.rs

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::ParseError;

/// Field delimiter of the lookup tool's tabular payload.
pub const FIELD_DELIMITER: char = '\t';

/// What to do with a data line whose field count differs from the header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum RowPolicy {
    /// Pad short rows with empty values, truncate long ones.
    #[default]
    Pad,
    /// Skip the offending line.
    Drop,
    /// Reject the whole payload.
    Fail,
}

/// A parsed table: ordered column names plus rows aligned to them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowSet {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl RowSet {
    /// Build a row-set from rows that must already match `columns`. Line
    /// numbers in the error count the header as line 1.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<String>>) -> Result<Self, ParseError> {
        if let Some((idx, row)) = rows
            .iter()
            .enumerate()
            .find(|(_, r)| r.len() != columns.len())
        {
            return Err(ParseError::FieldCountMismatch {
                line: idx + 2,
                expected: columns.len(),
                found: row.len(),
            });
        }
        Ok(Self { columns, rows })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Value of `column` in row `row`; the first matching column wins.
    pub fn get(&self, row: usize, column: &str) -> Option<&str> {
        let idx = self.columns.iter().position(|c| c == column)?;
        self.rows.get(row).map(|r| r[idx].as_str())
    }
}

/// Parse one raw payload: a header line followed by data lines, all split on
/// [`FIELD_DELIMITER`]. Empty input yields an empty row-set; blank data lines
/// are skipped.
pub fn parse_payload(payload: &str, policy: RowPolicy) -> Result<RowSet, ParseError> {
    let mut lines = payload.lines().enumerate();

    let header = match lines.next() {
        Some((_, h)) if !h.is_empty() => h,
        _ => return Ok(RowSet::default()),
    };
    let columns: Vec<String> = header.split(FIELD_DELIMITER).map(str::to_string).collect();
    let width = columns.len();

    let mut rows = Vec::new();
    for (idx, line) in lines {
        if line.is_empty() {
            continue;
        }
        let mut fields: Vec<String> = line.split(FIELD_DELIMITER).map(str::to_string).collect();
        if fields.len() != width {
            let (lineno, found) = (idx + 1, fields.len());
            match policy {
                RowPolicy::Pad => {
                    warn!(line = lineno, expected = width, found, "realigning row to header");
                    fields.resize(width, String::new());
                }
                RowPolicy::Drop => {
                    warn!(line = lineno, expected = width, found, "dropping misaligned row");
                    continue;
                }
                RowPolicy::Fail => {
                    return Err(ParseError::FieldCountMismatch {
                        line: lineno,
                        expected: width,
                        found,
                    });
                }
            }
        }
        rows.push(fields);
    }

    debug!(columns = width, rows = rows.len(), "parsed payload");
    Ok(RowSet { columns, rows })
}

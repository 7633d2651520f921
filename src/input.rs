// src/input.rs

use anyhow::{Context, Result};
use csv::{ReaderBuilder, Trim};
use std::{fs::File, io::Read, path::Path};
use tracing::info;

use crate::config::delimiter_byte;
use crate::lookup::Identifier;

/// Read the identifier list: one identifier per line, taken from the first
/// `delimiter`-separated field. No header row; blank lines are ignored.
pub fn read_identifiers(path: impl AsRef<Path>, delimiter: char) -> Result<Vec<Identifier>> {
    let path = path.as_ref();
    let file = File::open(path)
        .with_context(|| format!("reading identifier list {}", path.display()))?;
    let ids = identifiers_from_reader(file, delimiter)
        .with_context(|| format!("reading identifier list {}", path.display()))?;
    info!(path = %path.display(), count = ids.len(), "loaded identifiers");
    Ok(ids)
}

pub fn parse_identifiers(text: &str, delimiter: char) -> Result<Vec<Identifier>> {
    identifiers_from_reader(text.as_bytes(), delimiter)
}

fn identifiers_from_reader<R: Read>(reader: R, delimiter: char) -> Result<Vec<Identifier>> {
    let mut rdr = ReaderBuilder::new()
        .delimiter(delimiter_byte(delimiter)?)
        .has_headers(false)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(reader);

    let mut ids = Vec::new();
    for (idx, result) in rdr.records().enumerate() {
        let record = result.with_context(|| format!("parse error at record {}", idx))?;
        match record.get(0) {
            Some(id) if !id.is_empty() => ids.push(id.to_string()),
            _ => continue,
        }
    }
    Ok(ids)
}

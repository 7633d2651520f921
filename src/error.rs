//! Typed errors for the parts of the pipeline callers need to match on.
//!
//! Everything else flows through `anyhow::Result`.

use std::time::Duration;
use thiserror::Error;

/// Errors raised while turning a raw payload into a [`crate::parse::RowSet`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("line {line}: expected {expected} fields, found {found}")]
    FieldCountMismatch {
        line: usize,
        expected: usize,
        found: usize,
    },
}

/// Why a single lookup did not produce a row-set.
#[derive(Debug, Error)]
pub enum LookupError {
    #[error("failed to spawn `{tool}`: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("waiting on `{tool}`: {source}")]
    Wait {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("lookup timed out after {0:?}")]
    Timeout(Duration),

    #[error("exited with {status}: {stderr}")]
    NonZeroExit { status: String, stderr: String },

    #[error("malformed payload: {0}")]
    Malformed(#[from] ParseError),
}

/// Errors from merging row-sets into one table.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AggregateError {
    #[error("no data obtained: no lookup produced a row-set")]
    NoData,
}

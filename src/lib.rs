pub mod aggregate;
pub mod config;
pub mod error;
pub mod input;
pub mod lookup;
pub mod output;
pub mod parse;
pub mod pipeline;
pub mod report;
pub mod retry;

pub use aggregate::{aggregate, OutputTable, TableBuilder};
pub use config::{Cli, Settings};
pub use lookup::{Identifier, Lookup, LookupCommand, LookupResult, ProcessCommand};
pub use parse::{parse_payload, RowPolicy, RowSet};
pub use retry::{RetryPolicy, RetryScheduler, RunOutcome, RunStatus};

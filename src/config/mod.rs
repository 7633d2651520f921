//! Run settings: defaults, an optional YAML file, then command-line flags.

use anyhow::{bail, Context, Result};
use clap::Parser;
use serde::Deserialize;
use std::{fs, path::Path, path::PathBuf, time::Duration};

use crate::lookup::{ProcessCommand, DEFAULT_ARGS, DEFAULT_TOOL, ID_PLACEHOLDER};
use crate::output::OutputFormat;
use crate::parse::RowPolicy;
use crate::retry::RetryPolicy;

/// Fetch SRA metadata for a list of identifiers and merge it into one table.
#[derive(Debug, Parser)]
#[command(name = "sragather")]
#[command(version)]
pub struct Cli {
    /// Identifier list; the first field of each line is used.
    pub input: PathBuf,

    /// Where to write the merged table.
    pub output: PathBuf,

    /// YAML settings file; flags given here take precedence.
    #[arg(short, long, env = "SRAGATHER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Lookup tool to run per identifier.
    #[arg(long)]
    pub tool: Option<String>,

    /// Maximum simultaneous lookups.
    #[arg(short = 'j', long)]
    pub concurrency: Option<usize>,

    /// Pause after each round, in milliseconds.
    #[arg(long)]
    pub pacing_ms: Option<u64>,

    /// Give up after this many rounds (default: retry until done).
    #[arg(long)]
    pub max_rounds: Option<u32>,

    /// Give up once this many seconds have passed.
    #[arg(long)]
    pub max_elapsed_secs: Option<u64>,

    /// Kill a single lookup after this many seconds.
    #[arg(long)]
    pub call_timeout_secs: Option<u64>,

    #[arg(long, value_enum)]
    pub row_policy: Option<RowPolicy>,

    #[arg(long, value_enum)]
    pub format: Option<OutputFormat>,

    /// Write a JSON run report to this path.
    #[arg(long)]
    pub report: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub tool: String,
    /// Arguments passed to `tool`; `{id}` is replaced by the identifier.
    pub args: Vec<String>,
    pub concurrency: usize,
    pub pacing_ms: u64,
    pub max_rounds: Option<u32>,
    pub max_elapsed_secs: Option<u64>,
    pub call_timeout_secs: Option<u64>,
    pub row_policy: RowPolicy,
    pub input_delimiter: char,
    pub output_delimiter: char,
    pub format: OutputFormat,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            tool: DEFAULT_TOOL.into(),
            args: DEFAULT_ARGS.iter().map(|a| a.to_string()).collect(),
            concurrency: 3,
            pacing_ms: 1_000,
            max_rounds: None,
            max_elapsed_secs: None,
            call_timeout_secs: None,
            row_policy: RowPolicy::default(),
            input_delimiter: '\t',
            output_delimiter: '\t',
            format: OutputFormat::default(),
        }
    }
}

impl Settings {
    pub fn from_yaml(text: &str) -> Result<Self> {
        // an empty document deserialises to null, not a map
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text).context("parsing settings")
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading settings {}", path.display()))?;
        Self::from_yaml(&text).with_context(|| format!("in {}", path.display()))
    }

    /// Defaults or the `--config` file, overlaid with flags, validated.
    pub fn resolve(cli: &Cli) -> Result<Self> {
        let mut settings = match &cli.config {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        settings.apply(cli);
        settings.validate()?;
        Ok(settings)
    }

    pub fn apply(&mut self, cli: &Cli) {
        if let Some(tool) = &cli.tool {
            self.tool = tool.clone();
        }
        if let Some(n) = cli.concurrency {
            self.concurrency = n;
        }
        if let Some(ms) = cli.pacing_ms {
            self.pacing_ms = ms;
        }
        if cli.max_rounds.is_some() {
            self.max_rounds = cli.max_rounds;
        }
        if cli.max_elapsed_secs.is_some() {
            self.max_elapsed_secs = cli.max_elapsed_secs;
        }
        if cli.call_timeout_secs.is_some() {
            self.call_timeout_secs = cli.call_timeout_secs;
        }
        if let Some(policy) = cli.row_policy {
            self.row_policy = policy;
        }
        if let Some(format) = cli.format {
            self.format = format;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            bail!("concurrency must be at least 1");
        }
        if self.max_rounds == Some(0) {
            bail!("max_rounds must be at least 1 when set");
        }
        if self.tool.trim().is_empty() {
            bail!("tool must not be empty");
        }
        if !self.args.iter().any(|a| a.contains(ID_PLACEHOLDER)) {
            bail!("args must contain the {} placeholder", ID_PLACEHOLDER);
        }
        delimiter_byte(self.input_delimiter).context("input_delimiter")?;
        delimiter_byte(self.output_delimiter).context("output_delimiter")?;
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            concurrency: self.concurrency,
            pacing: Duration::from_millis(self.pacing_ms),
            max_rounds: self.max_rounds,
            max_elapsed: self.max_elapsed_secs.map(Duration::from_secs),
        }
    }

    pub fn command(&self) -> ProcessCommand {
        ProcessCommand::new(self.tool.clone(), self.args.clone())
            .with_timeout(self.call_timeout_secs.map(Duration::from_secs))
    }
}

/// Delimiters are single ASCII bytes for the CSV reader and writer.
pub(crate) fn delimiter_byte(delimiter: char) -> Result<u8> {
    if !delimiter.is_ascii() {
        bail!("delimiter {:?} is not a single ASCII character", delimiter);
    }
    Ok(delimiter as u8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn defaults_match_pysradb_invocation() {
        let s = Settings::default();
        assert_eq!(s.command().args_for("SRP1"), ["metadata", "SRP1", "--detailed"]);
        assert_eq!(s.retry_policy(), RetryPolicy::default());
        s.validate().unwrap();
    }

    #[test]
    fn partial_yaml_keeps_defaults() -> Result<()> {
        let s = Settings::from_yaml(
            "concurrency: 5\nmax_rounds: 10\nrow_policy: drop\nformat: parquet\noutput_delimiter: ','\n",
        )?;
        assert_eq!(s.concurrency, 5);
        assert_eq!(s.max_rounds, Some(10));
        assert_eq!(s.row_policy, RowPolicy::Drop);
        assert_eq!(s.format, OutputFormat::Parquet);
        assert_eq!(s.output_delimiter, ',');
        assert_eq!(s.tool, "pysradb");
        assert_eq!(s.pacing_ms, 1_000);
        Ok(())
    }

    #[test]
    fn empty_yaml_is_default() -> Result<()> {
        assert_eq!(Settings::from_yaml("")?, Settings::default());
        Ok(())
    }

    #[test]
    fn unknown_key_is_rejected() {
        assert!(Settings::from_yaml("concurency: 4\n").is_err());
    }

    #[test]
    fn flags_override_file() -> Result<()> {
        let mut file = NamedTempFile::new()?;
        writeln!(file, "concurrency: 8")?;
        writeln!(file, "pacing_ms: 50")?;
        writeln!(file, "tool: fake-tool")?;

        let cli = Cli::try_parse_from([
            "sragather",
            "ids.tsv",
            "out.tsv",
            "--config",
            file.path().to_str().unwrap(),
            "-j",
            "2",
            "--max-rounds",
            "4",
            "--row-policy",
            "fail",
        ])?;
        let s = Settings::resolve(&cli)?;

        assert_eq!(s.concurrency, 2);
        assert_eq!(s.pacing_ms, 50);
        assert_eq!(s.tool, "fake-tool");
        assert_eq!(s.max_rounds, Some(4));
        assert_eq!(s.row_policy, RowPolicy::Fail);
        assert_eq!(cli.output, PathBuf::from("out.tsv"));
        Ok(())
    }

    #[test]
    fn validation_rejects_bad_settings() {
        let zero = Settings {
            concurrency: 0,
            ..Settings::default()
        };
        assert!(zero.validate().is_err());

        let no_placeholder = Settings {
            args: vec!["metadata".into()],
            ..Settings::default()
        };
        assert!(no_placeholder.validate().is_err());

        let no_rounds = Settings {
            max_rounds: Some(0),
            ..Settings::default()
        };
        assert!(no_rounds.validate().is_err());

        let wide_delimiter = Settings {
            output_delimiter: '\u{00a7}',
            ..Settings::default()
        };
        assert!(wide_delimiter.validate().is_err());
    }

    #[test]
    fn ascii_delimiters_convert() -> Result<()> {
        assert_eq!(delimiter_byte('\t')?, b'\t');
        assert_eq!(delimiter_byte(',')?, b',');
        Ok(())
    }

    #[test]
    fn timeout_and_elapsed_caps_convert() {
        let s = Settings {
            max_elapsed_secs: Some(90),
            pacing_ms: 250,
            ..Settings::default()
        };
        let policy = s.retry_policy();
        assert_eq!(policy.max_elapsed, Some(Duration::from_secs(90)));
        assert_eq!(policy.pacing, Duration::from_millis(250));
    }
}

use anyhow::Result;
use clap::Parser;
use sragather::{
    config::{Cli, Settings},
    pipeline::{self, BatchStatus},
};
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // ─── 1) init logging ─────────────────────────────────────────────
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_span_events(fmt::format::FmtSpan::CLOSE)
        .init();
    info!("startup");

    // ─── 2) settings ─────────────────────────────────────────────────
    let settings = Settings::resolve(&cli)?;
    info!(
        tool = %settings.tool,
        concurrency = settings.concurrency,
        max_rounds = ?settings.max_rounds,
        "settings resolved"
    );

    // ─── 3) lookup, retry, aggregate, write ──────────────────────────
    let summary = pipeline::run(
        &settings,
        &cli.input,
        &cli.output,
        cli.report.as_deref(),
    )
    .await?;

    match summary.status {
        BatchStatus::Complete => {
            info!(rows = summary.rows, rounds = summary.rounds, "all done");
            Ok(ExitCode::SUCCESS)
        }
        BatchStatus::Partial { unresolved } => {
            error!(unresolved, rounds = summary.rounds, "gave up with identifiers unresolved");
            Ok(ExitCode::from(3))
        }
        BatchStatus::NoData => {
            error!("no data obtained");
            Ok(ExitCode::from(2))
        }
    }
}

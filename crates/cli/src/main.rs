mod cli;

use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use bronze_core::config::{load_dotenv, Config};
use bronze_ingest::{Bronze, RunMode, RunReport};

use crate::cli::{CliArgs, Command};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    load_dotenv();
    let args = CliArgs::parse();

    let config = match &args.profile {
        Some(profile) => Config::for_profile(&profile.to_uppercase()),
        None => Config::from_env(),
    };
    config.log_summary();
    let default_interval = config.ingest.poll_interval();

    let bronze = Bronze::new(config).context("invalid configuration")?;

    match args.command {
        Command::Consume {
            continuous,
            interval_secs,
        } => {
            let interval = interval_secs
                .map(Duration::from_secs)
                .unwrap_or(default_interval);
            consume(&bronze, continuous, interval).await?;
        }
        Command::Validate { sets } => {
            bronze.validate(sets).await.context("bronze validation failed")?;
        }
        Command::Run { sets } => {
            consume(&bronze, false, default_interval).await?;
            bronze.validate(sets).await.context("bronze validation failed")?;
        }
    }
    Ok(())
}

async fn consume(bronze: &Bronze, continuous: bool, interval: Duration) -> Result<()> {
    let report = if continuous {
        let run = bronze
            .consume(RunMode::Continuous, interval)
            .await
            .context("failed to start bronze consumption")?;
        tokio::signal::ctrl_c()
            .await
            .context("failed to listen for Ctrl-C")?;
        info!("Ctrl-C received");
        run.stop().await.context("bronze consumption failed")?
    } else {
        let run = bronze
            .consume(RunMode::Finite, interval)
            .await
            .context("bronze consumption failed")?;
        run.report()
            .cloned()
            .context("finite run finished without a report")?
    };
    log_report(&report);
    Ok(())
}

fn log_report(report: &RunReport) {
    for p in &report.pipelines {
        info!(
            source = %p.source,
            table = %p.table,
            state = ?p.state,
            batches = p.stats.batches,
            units = p.stats.units,
            rows = p.stats.records_committed,
            rejected = p.stats.records_rejected,
            "Pipeline summary"
        );
    }
    info!(
        mode = %report.mode,
        rows = report.records_committed(),
        rejected = report.records_rejected(),
        elapsed_secs = report.elapsed.as_secs(),
        "Run summary"
    );
}

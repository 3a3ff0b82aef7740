//! profload - load test for the profile manager API

use anyhow::{Context, Result, bail};
use clap::Parser;
use profload::{
    Reporter,
    aggregate::WorkflowAggregate,
    cli::Cli,
    config::{JsonTarget, LoadConfig},
    executor::StopSignal,
    report::{JsonReporter, StdoutReporter, WorkflowReport},
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(default_level.into())
                .from_env_lossy(),
        )
        .init();

    let settings = cli.resolve().context("failed to read configuration")?;
    let config = LoadConfig::try_from(settings).context("invalid configuration")?;
    tracing::debug!("Resolved configuration: {config:?}");

    let stop = StopSignal::new();
    tokio::spawn(stop_on_interrupt(stop.clone()));
    let results = profload::runner::run(&config, stop.clone())
        .await
        .context("load test failed")?;
    if stop.is_triggered() {
        tracing::warn!("Run interrupted, reporting partial results");
    }

    let report = WorkflowReport::from(results);
    StdoutReporter.report(&report).await?;
    if let Some(target) = &config.json_report {
        let path = match target {
            JsonTarget::Stdout => None,
            JsonTarget::File(path) => Some(path.clone()),
        };
        let json = JsonReporter { path };
        Reporter::<WorkflowAggregate, WorkflowReport>::report(&json, &report).await?;
    }

    if report.total.requests == 0 {
        bail!("no requests were made");
    }
    Ok(())
}

/// First Ctrl-C stops the run gracefully, a second one exits right away.
async fn stop_on_interrupt(stop: StopSignal) {
    if tokio::signal::ctrl_c().await.is_err() {
        return;
    }
    tracing::warn!("Interrupted, waiting for running iterations (Ctrl-C again to quit)...");
    stop.trigger();
    if tokio::signal::ctrl_c().await.is_ok() {
        std::process::exit(130);
    }
}

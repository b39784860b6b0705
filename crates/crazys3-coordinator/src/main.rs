#![warn(missing_docs)]

//! crazys3 coordinator CLI

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use crazys3_coordinator::cli::Cli;
use crazys3_coordinator::Coordinator;
use crazys3_storage::S3Connector;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = cli.load_config()?;
    let spec = cli.job_spec(&config.profile);

    let coordinator = Coordinator::connect(config, Arc::new(S3Connector::new())).await?;
    let cancel = coordinator.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, stopping completion polling");
            cancel.cancel();
        }
    });

    let result = coordinator.run_job(&spec).await;
    coordinator.shutdown().await;
    let report = result?;

    let summary: Vec<_> = report
        .workers
        .iter()
        .map(|w| serde_json::json!({ "worker": w.address, "dispatch": w.dispatch, "rpc": w.rpc }))
        .collect();
    tracing::info!(
        job_id = %report.job_id,
        outcome = ?report.outcome,
        enumerated = report.enumerated,
        skipped = report.skipped,
        processed = report.processed(),
        failed = report.failed(),
        dispatch = %serde_json::Value::Array(summary),
        "job report"
    );
    if !report.is_done() {
        anyhow::bail!("job did not finish: {:?}", report.outcome);
    }
    Ok(())
}

#![warn(missing_docs)]

//! crazys3 worker server

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use crazys3_storage::S3Connector;
use crazys3_transport::{bind, RpcServer};
use crazys3_worker::{WorkerConfig, WorkerEndpoint};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Serve coordinator RPCs and run bulk object operations.
#[derive(Debug, Parser)]
#[command(name = "crazys3-worker", version, about)]
struct Cli {
    /// Config file (TOML or JSON).
    #[arg(short, long, env = "CRAZYS3_WORKER_CONFIG")]
    config: Option<PathBuf>,

    /// Listen address, overrides the config file.
    #[arg(long)]
    bind: Option<String>,

    /// Executors per job, overrides the config file.
    #[arg(long)]
    pool_size: Option<usize>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => WorkerConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => WorkerConfig::default(),
    };
    if let Some(bind) = cli.bind {
        config.bind_addr = bind;
    }
    if let Some(pool_size) = cli.pool_size {
        config.pool_size = pool_size;
    }
    config.validate()?;

    let endpoint = WorkerEndpoint::new(
        Arc::new(S3Connector::new()),
        config.pool_size,
        config.queue_capacity,
    );
    let listener = bind(&config.bind_addr).await?;
    tracing::info!(
        addr = %config.bind_addr,
        pool_size = config.pool_size,
        queue_capacity = config.queue_capacity,
        "crazys3 worker listening"
    );

    let server = RpcServer::new(Arc::new(endpoint));
    server.serve(listener).await?;
    Ok(())
}

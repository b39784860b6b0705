use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::queue::DEFAULT_QUEUE_CAPACITY;

/// Parses a `.toml` or `.json` config file into `T`.
pub fn load_file<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let contents = std::fs::read_to_string(path)?;
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("toml") => Ok(toml::from_str(&contents)?),
        Some(ext) if ext.eq_ignore_ascii_case("json") => Ok(serde_json::from_str(&contents)?),
        other => anyhow::bail!("Unsupported config file extension: {}", other.unwrap_or("")),
    }
}

/// Worker process configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Address the RPC server listens on.
    pub bind_addr: String,
    /// Executors per job.
    pub pool_size: usize,
    /// Work queue capacity.
    pub queue_capacity: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            bind_addr: String::from("0.0.0.0:7070"),
            pool_size: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl WorkerConfig {
    /// Loads a TOML or JSON file, chosen by extension.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        load_file(path)
    }

    /// Rejects values the worker cannot run with.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.pool_size == 0 {
            anyhow::bail!("pool_size must be at least 1");
        }
        if self.queue_capacity == 0 {
            anyhow::bail!("queue_capacity must be at least 1");
        }
        if self.bind_addr.is_empty() {
            anyhow::bail!("bind_addr must not be empty");
        }
        Ok(())
    }
}

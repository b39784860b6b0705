use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::batch::DEFAULT_BATCH_SIZE;
use crate::flush::FlushPolicy;

/// Coordinator configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Worker addresses, `host:port`.
    pub workers: Vec<String>,
    /// Region the first storage connection is made in.
    pub default_region: String,
    /// Credential profile.
    pub profile: String,
    /// Requests per submit call.
    pub batch_size: usize,
    /// Seconds between completion polls.
    pub poll_interval_secs: u64,
    /// Give up polling after this many seconds; unset waits forever.
    pub poll_timeout_secs: Option<u64>,
    /// What to do when a submit fails.
    pub flush_policy: FlushPolicy,
    /// TCP connect timeout per worker.
    pub connect_timeout_ms: u64,
    /// Per-call RPC timeout. Submits can wait on a full worker queue, so
    /// this is generous.
    pub rpc_timeout_secs: u64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            workers: Vec::new(),
            default_region: String::from("us-west-2"),
            profile: String::from("default"),
            batch_size: DEFAULT_BATCH_SIZE,
            poll_interval_secs: 10,
            poll_timeout_secs: None,
            flush_policy: FlushPolicy::default(),
            connect_timeout_ms: 5000,
            rpc_timeout_secs: 600,
        }
    }
}

impl CoordinatorConfig {
    /// Loads a TOML or JSON file, chosen by extension.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        crazys3_worker::config::load_file(path)
    }

    /// Rejects values the coordinator cannot run with.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.workers.is_empty() {
            anyhow::bail!("at least one worker address is required");
        }
        if self.batch_size == 0 {
            anyhow::bail!("batch_size must be at least 1");
        }
        if self.poll_interval_secs == 0 {
            anyhow::bail!("poll_interval_secs must be at least 1");
        }
        Ok(())
    }

    /// Poll interval as a duration.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Poll deadline as a duration.
    pub fn poll_timeout(&self) -> Option<Duration> {
        self.poll_timeout_secs.map(Duration::from_secs)
    }

    /// Connect timeout as a duration.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// RPC timeout as a duration.
    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_values() {
        let config = CoordinatorConfig::default();
        assert!(config.workers.is_empty());
        assert_eq!(config.default_region, "us-west-2");
        assert_eq!(config.profile, "default");
        assert_eq!(config.batch_size, 100);
        assert_eq!(config.poll_interval(), Duration::from_secs(10));
        assert!(config.poll_timeout().is_none());
        assert_eq!(config.flush_policy, FlushPolicy::AtMostOnce);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file_toml() {
        let mut file = NamedTempFile::with_suffix(".toml").unwrap();
        writeln!(
            file,
            r#"
workers = ["10.0.0.1:7070", "10.0.0.2:7070"]
default_region = "eu-central-1"
batch_size = 250
poll_timeout_secs = 3600

[flush_policy]
mode = "retry"
max_retries = 3
initial_backoff_ms = 100
max_backoff_ms = 5000
            "#
        )
        .unwrap();

        let config = CoordinatorConfig::from_file(file.path()).unwrap();
        assert_eq!(config.workers.len(), 2);
        assert_eq!(config.default_region, "eu-central-1");
        assert_eq!(config.batch_size, 250);
        assert_eq!(config.poll_timeout(), Some(Duration::from_secs(3600)));
        assert!(matches!(config.flush_policy, FlushPolicy::Retry { max_retries: 3, .. }));
        assert_eq!(config.rpc_timeout_secs, 600);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_file_json() {
        let mut file = NamedTempFile::with_suffix(".json").unwrap();
        writeln!(
            file,
            r#"{{"workers": ["127.0.0.1:7070"], "batch_size": 0}}"#
        )
        .unwrap();

        let config = CoordinatorConfig::from_file(file.path()).unwrap();
        assert_eq!(config.workers, vec!["127.0.0.1:7070"]);
        assert!(config.validate().is_err());
    }
}

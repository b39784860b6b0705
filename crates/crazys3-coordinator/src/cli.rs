use anyhow::Result;
use clap::{Parser, Subcommand};
use crazys3_storage::RestoreTier;
use std::path::PathBuf;

use crate::config::CoordinatorConfig;
use crate::job::{JobParams, JobSpec};

/// Command line of the `crazys3` coordinator.
#[derive(Debug, Parser)]
#[command(name = "crazys3")]
#[command(about = "Bulk object storage migration, restoration and recovery", long_about = None)]
pub struct Cli {
    /// Config file (TOML or JSON).
    #[arg(short, long, env = "CRAZYS3_CONFIG")]
    pub config: Option<PathBuf>,

    /// Worker address; repeat for several workers. Replaces the config list.
    #[arg(short, long = "worker")]
    pub workers: Vec<String>,

    /// Credential profile.
    #[arg(long)]
    pub profile: Option<String>,

    /// Region of the first storage connection.
    #[arg(long)]
    pub region: Option<String>,

    /// Stop waiting for workers after this many seconds.
    #[arg(long)]
    pub poll_timeout: Option<u64>,

    /// Job to run.
    #[command(subcommand)]
    pub command: Command,
}

/// The three job kinds.
#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Copy every object under a prefix into another bucket.
    Migrate {
        /// Source bucket.
        #[arg(long)]
        from: String,
        /// Destination bucket.
        #[arg(long)]
        to: String,
        /// Key prefix.
        #[arg(long, default_value = "")]
        prefix: String,
    },
    /// Request restores of archived objects.
    Restore {
        /// Bucket.
        #[arg(long)]
        bucket: String,
        /// Key prefix.
        #[arg(long, default_value = "")]
        prefix: String,
        /// Restore lifetime in days.
        #[arg(long, default_value = "1")]
        days: i32,
        /// Retrieval tier: expedited, standard or bulk.
        #[arg(long, default_value = "standard")]
        tier: RestoreTier,
    },
    /// Re-write restored objects in place as STANDARD.
    Recover {
        /// Bucket.
        #[arg(long)]
        bucket: String,
        /// Key prefix.
        #[arg(long, default_value = "")]
        prefix: String,
    },
}

impl Cli {
    /// Loads the config file (or defaults) and applies command-line overrides.
    pub fn load_config(&self) -> Result<CoordinatorConfig> {
        let mut config = match &self.config {
            Some(path) => CoordinatorConfig::from_file(path)?,
            None => CoordinatorConfig::default(),
        };
        if !self.workers.is_empty() {
            config.workers = self.workers.clone();
        }
        if let Some(profile) = &self.profile {
            config.profile = profile.clone();
        }
        if let Some(region) = &self.region {
            config.default_region = region.clone();
        }
        if self.poll_timeout.is_some() {
            config.poll_timeout_secs = self.poll_timeout;
        }
        config.validate()?;
        Ok(config)
    }

    /// The job described by the subcommand.
    pub fn job_spec(&self, profile: &str) -> JobSpec {
        let (params, source_bucket, prefix) = match &self.command {
            Command::Migrate { from, to, prefix } => (
                JobParams::Migration {
                    dest_bucket: to.clone(),
                },
                from.clone(),
                prefix.clone(),
            ),
            Command::Restore {
                bucket,
                prefix,
                days,
                tier,
            } => (
                JobParams::Restoration {
                    days: *days,
                    tier: *tier,
                },
                bucket.clone(),
                prefix.clone(),
            ),
            Command::Recover { bucket, prefix } => {
                (JobParams::Recovery, bucket.clone(), prefix.clone())
            }
        };
        JobSpec {
            params,
            source_bucket,
            prefix,
            profile: profile.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_migrate() {
        let cli = Cli::try_parse_from([
            "crazys3", "-w", "a:7070", "-w", "b:7070", "migrate", "--from", "src", "--to", "dst",
        ])
        .unwrap();
        let config = cli.load_config().unwrap();
        assert_eq!(config.workers, vec!["a:7070", "b:7070"]);

        let spec = cli.job_spec(&config.profile);
        assert_eq!(spec.source_bucket, "src");
        assert_eq!(spec.prefix, "");
        assert_eq!(
            spec.params,
            JobParams::Migration {
                dest_bucket: "dst".to_string()
            }
        );
    }

    #[test]
    fn test_parse_restore_with_tier() {
        let cli = Cli::try_parse_from([
            "crazys3", "-w", "a:7070", "--poll-timeout", "60", "restore", "--bucket", "cold",
            "--prefix", "2021/", "--days", "7", "--tier", "bulk",
        ])
        .unwrap();
        let config = cli.load_config().unwrap();
        assert_eq!(config.poll_timeout_secs, Some(60));
        assert_eq!(
            cli.job_spec("default").params,
            JobParams::Restoration {
                days: 7,
                tier: RestoreTier::Bulk
            }
        );
    }

    #[test]
    fn test_bad_tier_is_rejected() {
        let result = Cli::try_parse_from([
            "crazys3", "restore", "--bucket", "cold", "--tier", "instant",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_workers_fails_validation() {
        let cli = Cli::try_parse_from(["crazys3", "recover", "--bucket", "b"]).unwrap();
        assert!(cli.load_config().is_err());
    }
}

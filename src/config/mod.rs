mod file_config;

pub use file_config::{FileConfig, JobsConfig, ProviderConfig};

use crate::background_jobs::DispatcherConfig;
use crate::server::RequestsLoggingLevel;
use anyhow::{bail, Result};
use clap::ValueEnum;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_PROVIDER_BASE_URL: &str = "https://api.openai.com/v1";

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone)]
pub struct CliConfig {
    pub port: u16,
    pub metrics_port: u16,
    pub logging_level: RequestsLoggingLevel,
    pub job_db: Option<PathBuf>,
    pub audio_output_dir: PathBuf,
    pub provider_base_url: String,
    pub provider_timeout_sec: u64,
    pub max_concurrent_jobs: usize,
    pub job_timeout_sec: u64,
    pub job_retention_hours: u64,
    pub prune_interval_minutes: u64,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            port: 8000,
            metrics_port: 9091,
            logging_level: RequestsLoggingLevel::Path,
            job_db: None,
            audio_output_dir: PathBuf::from("."),
            provider_base_url: DEFAULT_PROVIDER_BASE_URL.to_string(),
            provider_timeout_sec: 120,
            max_concurrent_jobs: 8,
            job_timeout_sec: 600,
            job_retention_hours: 24,
            prune_interval_minutes: 10,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub metrics_port: u16,
    pub logging_level: RequestsLoggingLevel,
    /// SQLite file for job records. Jobs live only in memory when unset.
    pub job_db: Option<PathBuf>,
    pub audio_output_dir: PathBuf,
    pub provider: ProviderSettings,
    pub jobs: JobSettings,
}

#[derive(Debug, Clone)]
pub struct ProviderSettings {
    pub base_url: String,
    pub timeout_sec: u64,
}

impl ProviderSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_sec)
    }
}

#[derive(Debug, Clone)]
pub struct JobSettings {
    pub max_concurrent: usize,
    pub timeout_sec: u64,
    /// Finished jobs older than this are pruned. Zero keeps them forever.
    pub retention_hours: u64,
    pub prune_interval_minutes: u64,
}

/// Upper bound on `retention_hours`, one hundred years.
pub const MAX_RETENTION_HOURS: u64 = 100 * 365 * 24;
/// Upper bound on `prune_interval_minutes`, one year.
pub const MAX_PRUNE_INTERVAL_MINUTES: u64 = 365 * 24 * 60;

impl JobSettings {
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_hours.saturating_mul(60 * 60))
    }

    pub fn prune_interval(&self) -> Duration {
        Duration::from_secs(self.prune_interval_minutes.saturating_mul(60))
    }

    pub fn dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig {
            max_concurrent_jobs: self.max_concurrent,
            job_timeout: Duration::from_secs(self.timeout_sec),
        }
    }
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let port = file.port.unwrap_or(cli.port);
        let metrics_port = file.metrics_port.unwrap_or(cli.metrics_port);

        let logging_level = file
            .logging_level
            .and_then(|s| parse_logging_level(&s))
            .unwrap_or_else(|| cli.logging_level.clone());

        let job_db = file
            .job_db
            .map(PathBuf::from)
            .or_else(|| cli.job_db.clone());

        let audio_output_dir = file
            .audio_output_dir
            .map(PathBuf::from)
            .unwrap_or_else(|| cli.audio_output_dir.clone());
        if audio_output_dir.exists() && !audio_output_dir.is_dir() {
            bail!("audio_output_dir is not a directory: {:?}", audio_output_dir);
        }

        let provider_file = file.provider.unwrap_or_default();
        let base_url = provider_file
            .base_url
            .unwrap_or_else(|| cli.provider_base_url.clone());
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            bail!("Provider base URL must start with http:// or https://: {}", base_url);
        }
        let provider = ProviderSettings {
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout_sec: provider_file.timeout_sec.unwrap_or(cli.provider_timeout_sec),
        };

        let jobs_file = file.jobs.unwrap_or_default();
        let jobs = JobSettings {
            max_concurrent: jobs_file.max_concurrent.unwrap_or(cli.max_concurrent_jobs),
            timeout_sec: jobs_file.timeout_sec.unwrap_or(cli.job_timeout_sec),
            retention_hours: jobs_file.retention_hours.unwrap_or(cli.job_retention_hours),
            prune_interval_minutes: jobs_file
                .prune_interval_minutes
                .unwrap_or(cli.prune_interval_minutes),
        };
        if jobs.max_concurrent == 0 {
            bail!("max_concurrent_jobs must be at least 1");
        }
        if jobs.timeout_sec == 0 {
            bail!("job_timeout_sec must be greater than 0");
        }
        if jobs.retention_hours > 0 && jobs.prune_interval_minutes == 0 {
            bail!("prune_interval_minutes must be greater than 0 when retention is enabled");
        }
        if jobs.retention_hours > MAX_RETENTION_HOURS {
            bail!(
                "retention_hours must be at most {}, got {}",
                MAX_RETENTION_HOURS,
                jobs.retention_hours
            );
        }
        if jobs.prune_interval_minutes > MAX_PRUNE_INTERVAL_MINUTES {
            bail!(
                "prune_interval_minutes must be at most {}, got {}",
                MAX_PRUNE_INTERVAL_MINUTES,
                jobs.prune_interval_minutes
            );
        }

        Ok(Self {
            port,
            metrics_port,
            logging_level,
            job_db,
            audio_output_dir,
            provider,
            jobs,
        })
    }
}

/// Parses a logging level string into RequestsLoggingLevel.
/// Uses clap's ValueEnum trait for parsing.
fn parse_logging_level(s: &str) -> Option<RequestsLoggingLevel> {
    RequestsLoggingLevel::from_str(s, true).ok()
}

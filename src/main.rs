use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use jobrelay_server::background_jobs::{spawn_retention_task, Dispatcher, JobEvents};
use jobrelay_server::config;
use jobrelay_server::job_store::{InMemoryJobStore, JobStore, SqliteJobStore};
use jobrelay_server::provider::OpenAIClient;
use jobrelay_server::server::{
    metrics, run_server, CredentialStore, RequestsLoggingLevel, ServerConfig,
};

const CREDENTIAL_ENV_VAR: &str = "OPENAI_API_KEY";

fn parse_path(s: &str) -> Result<PathBuf, String> {
    let path_buf = PathBuf::from(s);
    if path_buf.is_absolute() {
        return Ok(path_buf);
    }
    let cwd = std::env::current_dir().map_err(|e| format!("Failed to get current dir: {}", e))?;
    Ok(cwd.join(path_buf))
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Path to TOML configuration file. Values in the file override CLI arguments.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// The port to listen on.
    #[clap(short, long, default_value_t = 8000)]
    pub port: u16,

    /// The port for the metrics server (Prometheus scraping).
    #[clap(long, default_value_t = 9091)]
    pub metrics_port: u16,

    /// The level of logging to perform on each request.
    #[clap(long, default_value = "path")]
    pub logging_level: RequestsLoggingLevel,

    /// SQLite file holding job records. Without it jobs are kept in memory only.
    #[clap(long, value_parser = parse_path)]
    pub job_db: Option<PathBuf>,

    /// Directory where speech jobs write their audio files.
    #[clap(long, value_parser = parse_path, default_value = ".")]
    pub audio_output_dir: PathBuf,

    /// Base URL of the OpenAI-compatible provider API.
    #[clap(long, default_value = config::DEFAULT_PROVIDER_BASE_URL)]
    pub provider_base_url: String,

    /// Timeout in seconds for non-streaming provider requests.
    #[clap(long, default_value_t = 120)]
    pub provider_timeout_sec: u64,

    /// Number of jobs allowed to run at the same time.
    #[clap(long, default_value_t = 8)]
    pub max_concurrent_jobs: usize,

    /// Upper bound in seconds on a single job's run time.
    #[clap(long, default_value_t = 600)]
    pub job_timeout_sec: u64,

    /// Hours to keep finished jobs before pruning. Set to 0 to disable pruning.
    #[clap(long, default_value_t = 24)]
    pub job_retention_hours: u64,

    /// Interval in minutes between pruning runs. Only used if job_retention_hours > 0.
    #[clap(long, default_value_t = 10)]
    pub prune_interval_minutes: u64,
}

/// Convert CLI args to CliConfig for config resolution
impl From<&CliArgs> for config::CliConfig {
    fn from(args: &CliArgs) -> Self {
        config::CliConfig {
            port: args.port,
            metrics_port: args.metrics_port,
            logging_level: args.logging_level.clone(),
            job_db: args.job_db.clone(),
            audio_output_dir: args.audio_output_dir.clone(),
            provider_base_url: args.provider_base_url.clone(),
            provider_timeout_sec: args.provider_timeout_sec,
            max_concurrent_jobs: args.max_concurrent_jobs,
            job_timeout_sec: args.job_timeout_sec,
            job_retention_hours: args.job_retention_hours,
            prune_interval_minutes: args.prune_interval_minutes,
        }
    }
}

fn open_job_store(app_config: &config::AppConfig) -> Result<Arc<dyn JobStore>> {
    let store: Arc<dyn JobStore> = match &app_config.job_db {
        Some(path) => Arc::new(SqliteJobStore::new(path)?),
        None => {
            info!("No --job-db given, job records are kept in memory");
            Arc::new(InMemoryJobStore::new())
        }
    };

    // Nothing from a previous process is still running.
    let orphaned = store.mark_unfinished_failed("Server restarted before the job finished")?;
    if orphaned > 0 {
        info!("Marked {} unfinished jobs from a previous run as failed", orphaned);
    }
    Ok(store)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()?;

    // Load TOML config if provided
    let file_config = match &cli_args.config {
        Some(path) => {
            info!("Loading configuration from {:?}", path);
            Some(config::FileConfig::load(path)?)
        }
        None => None,
    };

    // Resolve final configuration (TOML overrides CLI)
    let cli_config: config::CliConfig = (&cli_args).into();
    let app_config = config::AppConfig::resolve(&cli_config, file_config)?;

    info!("Configuration loaded:");
    info!("  port: {}", app_config.port);
    info!("  provider: {}", app_config.provider.base_url);
    info!("  job_db: {:?}", app_config.job_db);
    info!("  audio_output_dir: {:?}", app_config.audio_output_dir);
    info!(
        "  workers: {}, job timeout: {}s",
        app_config.jobs.max_concurrent, app_config.jobs.timeout_sec
    );

    info!("Initializing metrics...");
    metrics::init_metrics();

    let job_store = open_job_store(&app_config)?;
    let shutdown_token = CancellationToken::new();

    let provider = Arc::new(OpenAIClient::new(app_config.provider.timeout()));
    let dispatcher = Dispatcher::new(
        job_store.clone(),
        provider,
        JobEvents::default(),
        app_config.jobs.dispatcher_config(),
        shutdown_token.child_token(),
    );

    let credentials = Arc::new(CredentialStore::new(std::env::var(CREDENTIAL_ENV_VAR).ok()));
    if credentials.is_set() {
        info!("Provider API key loaded from {}", CREDENTIAL_ENV_VAR);
    }

    if app_config.jobs.retention_hours > 0 {
        let retention_hours = app_config.jobs.retention_hours;
        let interval_minutes = app_config.jobs.prune_interval_minutes;
        info!(
            "Job pruning enabled: retaining {} hours, pruning every {} minutes",
            retention_hours, interval_minutes
        );
        spawn_retention_task(
            job_store.clone(),
            app_config.jobs.retention(),
            app_config.jobs.prune_interval(),
            shutdown_token.child_token(),
        );
    }

    let server_config = ServerConfig {
        requests_logging_level: app_config.logging_level.clone(),
        port: app_config.port,
        provider_base_url: app_config.provider.base_url.clone(),
        audio_output_dir: app_config.audio_output_dir.clone(),
    };

    info!("Ready to serve at port {}!", app_config.port);
    info!("Metrics available at port {}!", app_config.metrics_port);

    let server = run_server(
        server_config,
        app_config.metrics_port,
        dispatcher.clone(),
        credentials,
        shutdown_token.clone(),
    );
    tokio::pin!(server);

    let result = tokio::select! {
        result = &mut server => {
            info!("HTTP server stopped: {:?}", result);
            result
        },
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, initiating graceful shutdown");
            shutdown_token.cancel();
            server.await
        }
    };

    shutdown_token.cancel();
    dispatcher.shutdown().await;
    if let Err(e) = &result {
        error!("Server exited with error: {:#}", e);
    }
    result
}

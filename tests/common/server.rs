//! Test server lifecycle management
//!
//! Spawns a fake provider plus the real application on random ports, each
//! test getting its own isolated job store and audio directory.

use super::constants::*;
use super::fake_provider::FakeProvider;
use jobrelay_server::provider::OpenAIClient;
use jobrelay_server::{
    make_app, CredentialStore, Dispatcher, DispatcherConfig, InMemoryJobStore, JobEvents,
    RequestsLoggingLevel, ServerConfig,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

/// A running test server instance
///
/// When dropped, the server shuts down and its temp directory is removed.
pub struct TestServer {
    /// Base URL for HTTP requests (e.g., "http://127.0.0.1:12345")
    pub base_url: String,

    /// Base URL of the fake provider the server talks to
    #[allow(dead_code)]
    pub provider_url: String,

    /// Port the server is listening on
    #[allow(dead_code)]
    pub port: u16,

    /// Directory speech jobs write into
    #[allow(dead_code)]
    pub audio_dir: PathBuf,

    // Keep resources alive for the lifetime of the server
    _temp_dir: TempDir,
    _provider: FakeProvider,
    _dispatcher_token: CancellationToken,
    _shutdown_tx: oneshot::Sender<()>,
}

impl TestServer {
    /// Spawns a server whose stored credential matches the fake provider.
    pub async fn spawn() -> Self {
        Self::spawn_with_key(Some(TEST_API_KEY)).await
    }

    /// Spawns a server with the given stored credential, or none.
    pub async fn spawn_with_key(api_key: Option<&str>) -> Self {
        let provider = FakeProvider::spawn().await;

        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let audio_dir = temp_dir.path().to_path_buf();

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");
        let port = listener
            .local_addr()
            .expect("Failed to get local address")
            .port();

        let config = ServerConfig {
            requests_logging_level: RequestsLoggingLevel::None,
            port,
            provider_base_url: provider.base_url.clone(),
            audio_output_dir: audio_dir.clone(),
        };

        let dispatcher_token = CancellationToken::new();
        let dispatcher = Dispatcher::new(
            Arc::new(InMemoryJobStore::new()),
            Arc::new(OpenAIClient::new(Duration::from_secs(10))),
            JobEvents::default(),
            DispatcherConfig {
                max_concurrent_jobs: 4,
                job_timeout: Duration::from_secs(30),
            },
            dispatcher_token.clone(),
        );
        let credentials = Arc::new(CredentialStore::new(api_key.map(str::to_string)));

        let app = make_app(config, dispatcher, credentials);

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .expect("Server failed");
        });

        let base_url = format!("http://127.0.0.1:{}", port);
        Self::wait_for_ready(&base_url).await;

        Self {
            base_url,
            provider_url: provider.base_url.clone(),
            port,
            audio_dir,
            _temp_dir: temp_dir,
            _provider: provider,
            _dispatcher_token: dispatcher_token,
            _shutdown_tx: shutdown_tx,
        }
    }

    async fn wait_for_ready(base_url: &str) {
        let client = reqwest::Client::new();
        let timeout = Duration::from_millis(SERVER_READY_TIMEOUT_MS);
        let start = std::time::Instant::now();

        while start.elapsed() < timeout {
            if client.get(base_url).send().await.is_ok() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(SERVER_READY_POLL_INTERVAL_MS)).await;
        }

        panic!("Server did not become ready within {:?}", timeout);
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        // Stop running jobs; the oneshot sender drop stops the HTTP server.
        self._dispatcher_token.cancel();
    }
}

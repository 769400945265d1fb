use anyhow::{Context, Result};
use axum::{extract::State, middleware, response::IntoResponse, routing::get, Json, Router};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::job_routes::make_job_routes;
use super::openai_routes::make_openai_routes;
use super::{log_requests, metrics, state::*, CredentialStore, ServerConfig};
use crate::background_jobs::Dispatcher;

#[derive(Serialize)]
struct ServerStats {
    pub uptime: String,
    pub version: String,
    pub active_jobs: usize,
}

fn format_uptime(duration: Duration) -> String {
    let total_seconds = duration.as_secs();

    let days = total_seconds / 86_400;
    let hours = (total_seconds % 86_400) / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    format!("{}d {:02}:{:02}:{:02}", days, hours, minutes, seconds)
}

async fn home(State(state): State<ServerState>) -> impl IntoResponse {
    let stats = ServerStats {
        uptime: format_uptime(state.start_time.elapsed()),
        version: env!("CARGO_PKG_VERSION").to_string(),
        active_jobs: state.dispatcher.active_count(),
    };
    Json(stats)
}

pub fn make_app(
    config: ServerConfig,
    dispatcher: Dispatcher,
    credentials: Arc<CredentialStore>,
) -> Router {
    let state = ServerState::new(config, dispatcher, credentials);

    let api_routes: Router =
        make_job_routes(state.clone()).merge(make_openai_routes(state.clone()));

    Router::new()
        .route("/", get(home))
        .with_state(state.clone())
        .nest("/api", api_routes)
        .layer(middleware::from_fn_with_state(state, log_requests))
}

fn make_metrics_app() -> Router {
    Router::new().route("/metrics", get(metrics::metrics_handler))
}

/// Serve the API and the metrics endpoint until `shutdown_token` is cancelled.
pub async fn run_server(
    config: ServerConfig,
    metrics_port: u16,
    dispatcher: Dispatcher,
    credentials: Arc<CredentialStore>,
    shutdown_token: CancellationToken,
) -> Result<()> {
    let port = config.port;
    let app = make_app(config, dispatcher, credentials);

    let listener = TcpListener::bind(format!("0.0.0.0:{}", port))
        .await
        .with_context(|| format!("Failed to bind port {}", port))?;
    let metrics_listener = TcpListener::bind(format!("0.0.0.0:{}", metrics_port))
        .await
        .with_context(|| format!("Failed to bind metrics port {}", metrics_port))?;

    let metrics_token = shutdown_token.clone();
    let metrics_server = axum::serve(metrics_listener, make_metrics_app())
        .with_graceful_shutdown(async move { metrics_token.cancelled().await });
    let api_server = axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown_token.cancelled().await });

    info!("Serving API on port {} and metrics on port {}", port, metrics_port);
    let (api_result, metrics_result) = tokio::join!(api_server, metrics_server);
    api_result.context("API server failed")?;
    metrics_result.context("Metrics server failed")?;
    Ok(())
}

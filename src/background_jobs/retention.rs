//! Periodic removal of finished jobs.

use crate::job_store::JobStore;
use crate::server::metrics;
use anyhow::Result;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Delete terminal jobs last updated more than `retention` ago.
/// A retention reaching past the representable time range removes nothing.
pub fn prune_finished_jobs(store: &dyn JobStore, retention: Duration) -> Result<usize> {
    let cutoff = chrono::Duration::from_std(retention)
        .ok()
        .and_then(|retention| Utc::now().checked_sub_signed(retention));
    let Some(cutoff) = cutoff else {
        return Ok(0);
    };
    let removed = store.prune_finished_before(cutoff)?;
    metrics::record_jobs_pruned(removed);
    Ok(removed)
}

/// Run [`prune_finished_jobs`] every `interval` until `shutdown_token` fires.
pub fn spawn_retention_task(
    store: Arc<dyn JobStore>,
    retention: Duration,
    interval: Duration,
    shutdown_token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);

        // Skip the first immediate tick, wait for the first interval
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown_token.cancelled() => break,
                _ = ticker.tick() => {}
            }

            match prune_finished_jobs(store.as_ref(), retention) {
                Ok(count) if count > 0 => info!("Pruned {} finished jobs", count),
                Ok(_) => {}
                Err(e) => error!("Failed to prune finished jobs: {:#}", e),
            }
        }
    })
}

//! Runs submitted jobs on a bounded pool of tokio tasks.
//!
//! Every job gets a child of the dispatcher's shutdown token so it can be
//! revoked on its own or together with everything else at shutdown. The
//! dispatcher is the only place that writes a job's terminal state after the
//! runner returns.

use super::context::JobContext;
use super::job::{JobError, JobRunner};
use super::progress::{JobEvents, ProgressChannel, ProgressEvent, StoreProgressChannel};
use crate::job_store::{ApplyOutcome, JobRecord, JobState, JobStore, JobUpdate};
use crate::provider::ProviderClient;
use crate::server::metrics;
use anyhow::{bail, Result};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Jobs allowed to talk to the provider at the same time. Further jobs
    /// stay PENDING until a slot frees up.
    pub max_concurrent_jobs: usize,

    /// Upper bound on a single job's run time.
    pub job_timeout: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 8,
            job_timeout: Duration::from_secs(600),
        }
    }
}

/// Result of a revoke request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevokeOutcome {
    Revoked,
    AlreadyFinished(JobState),
    NotFound,
}

#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    store: Arc<dyn JobStore>,
    provider: Arc<dyn ProviderClient>,
    events: JobEvents,
    permits: Arc<Semaphore>,
    job_timeout: Duration,
    shutdown_token: CancellationToken,
    tracker: TaskTracker,
    cancel_tokens: Mutex<HashMap<String, CancellationToken>>,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn JobStore>,
        provider: Arc<dyn ProviderClient>,
        events: JobEvents,
        config: DispatcherConfig,
        shutdown_token: CancellationToken,
    ) -> Self {
        Self {
            inner: Arc::new(DispatcherInner {
                store,
                provider,
                events,
                permits: Arc::new(Semaphore::new(config.max_concurrent_jobs.max(1))),
                job_timeout: config.job_timeout,
                shutdown_token,
                tracker: TaskTracker::new(),
                cancel_tokens: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.inner.store
    }

    pub fn events(&self) -> &JobEvents {
        &self.inner.events
    }

    /// Record a new PENDING job and start running it in the background.
    ///
    /// Returns the job id as soon as the record exists; the caller never
    /// waits on the provider.
    pub fn submit(&self, runner: Arc<dyn JobRunner>) -> Result<String> {
        let inner = &self.inner;
        if inner.shutdown_token.is_cancelled() {
            bail!("Dispatcher is shutting down");
        }

        let job_id = Uuid::new_v4().to_string();
        let kind = runner.kind();
        let record = JobRecord::pending(&job_id, kind);

        // Tracked before the record exists so a revoke can always find it.
        let cancel_token = inner.shutdown_token.child_token();
        inner.track(&job_id, cancel_token.clone());
        if let Err(e) = inner.store.create(&record) {
            inner.untrack(&job_id);
            return Err(e);
        }
        inner.events.publish(ProgressEvent::from_record(&record));

        metrics::record_job_submitted(kind.as_str());
        info!(job_id = %job_id, kind = %kind, "Job submitted");

        let task_inner = Arc::clone(inner);
        let task_job_id = job_id.clone();
        inner.tracker.spawn(async move {
            task_inner.execute(task_job_id, runner, cancel_token).await;
        });

        Ok(job_id)
    }

    /// Revoke a job. Revoking a PENDING job means it never runs; revoking a
    /// running one cancels it at its next await point.
    pub fn revoke(&self, job_id: &str) -> Result<RevokeOutcome> {
        let inner = &self.inner;
        match inner.store.apply(job_id, JobUpdate::Revoke)? {
            ApplyOutcome::Applied(record) => {
                if let Some(token) = inner.cancel_token(job_id) {
                    token.cancel();
                }
                let elapsed = (record.updated_at - record.created_at)
                    .to_std()
                    .unwrap_or_default();
                metrics::record_job_finished(
                    record.kind.as_str(),
                    record.state.as_str(),
                    elapsed,
                );
                inner.events.publish(ProgressEvent::from_record(&record));
                info!(job_id = %job_id, "Job revoked");
                Ok(RevokeOutcome::Revoked)
            }
            ApplyOutcome::Ignored(state) => Ok(RevokeOutcome::AlreadyFinished(state)),
            ApplyOutcome::Missing => Ok(RevokeOutcome::NotFound),
        }
    }

    /// Number of jobs that are queued or running in this process.
    pub fn active_count(&self) -> usize {
        self.inner
            .cancel_tokens
            .lock()
            .map(|tokens| tokens.len())
            .unwrap_or(0)
    }

    /// Cancel every job and wait for their tasks to finish.
    ///
    /// Jobs interrupted here end up REVOKED. No new jobs are accepted.
    pub async fn shutdown(&self) {
        let inner = &self.inner;
        info!("Shutting down dispatcher, {} active jobs", self.active_count());
        inner.shutdown_token.cancel();
        inner.tracker.close();
        inner.tracker.wait().await;
        info!("Dispatcher shutdown complete");
    }
}

impl DispatcherInner {
    fn track(&self, job_id: &str, token: CancellationToken) {
        match self.cancel_tokens.lock() {
            Ok(mut tokens) => {
                tokens.insert(job_id.to_string(), token);
            }
            Err(_) => error!("Cancel token map lock poisoned"),
        }
    }

    fn untrack(&self, job_id: &str) {
        if let Ok(mut tokens) = self.cancel_tokens.lock() {
            tokens.remove(job_id);
        }
    }

    fn cancel_token(&self, job_id: &str) -> Option<CancellationToken> {
        self.cancel_tokens
            .lock()
            .ok()
            .and_then(|tokens| tokens.get(job_id).cloned())
    }

    async fn execute(
        self: Arc<Self>,
        job_id: String,
        runner: Arc<dyn JobRunner>,
        cancel_token: CancellationToken,
    ) {
        let kind = runner.kind();
        let channel = Arc::new(StoreProgressChannel::new(
            &job_id,
            kind,
            Arc::clone(&self.store),
            self.events.clone(),
        ));

        let permit = tokio::select! {
            biased;
            _ = cancel_token.cancelled() => None,
            permit = Arc::clone(&self.permits).acquire_owned() => permit.ok(),
        };

        let outcome = match permit {
            None => Err(JobError::Cancelled),
            Some(_permit) => {
                debug!(job_id = %job_id, "Job started");
                metrics::set_jobs_running_delta(1);
                let ctx = JobContext::new(
                    &job_id,
                    cancel_token.clone(),
                    Arc::clone(&channel) as Arc<dyn ProgressChannel>,
                    Arc::clone(&self.provider),
                );
                let outcome = self.run_bounded(runner, ctx, &cancel_token).await;
                metrics::set_jobs_running_delta(-1);
                outcome
            }
        };

        self.finalize(&job_id, &channel, outcome);
        self.untrack(&job_id);
    }

    /// Run the job in its own task so a panic is contained, bounded by the
    /// job timeout and the cancel token.
    async fn run_bounded(
        &self,
        runner: Arc<dyn JobRunner>,
        ctx: JobContext,
        cancel_token: &CancellationToken,
    ) -> Result<JsonValue, JobError> {
        let mut handle = tokio::spawn(async move { runner.run(&ctx).await });

        tokio::select! {
            joined = &mut handle => match joined {
                Ok(outcome) => outcome,
                Err(e) if e.is_panic() => Err(JobError::Panicked(e.to_string())),
                Err(_) => Err(JobError::Cancelled),
            },
            _ = cancel_token.cancelled() => {
                handle.abort();
                Err(JobError::Cancelled)
            }
            _ = tokio::time::sleep(self.job_timeout) => {
                handle.abort();
                Err(JobError::TimedOut(self.job_timeout))
            }
        }
    }

    fn finalize(
        &self,
        job_id: &str,
        channel: &StoreProgressChannel,
        outcome: Result<JsonValue, JobError>,
    ) {
        match outcome {
            Ok(result) => {
                if channel.apply(JobUpdate::Succeed { result }).is_some() {
                    info!(job_id = %job_id, "Job completed successfully");
                }
            }
            Err(JobError::Cancelled) => {
                // A revoke request has already stored REVOKED. A shutdown has not.
                if self.shutdown_token.is_cancelled() {
                    channel.apply(JobUpdate::Revoke);
                }
                info!(job_id = %job_id, "Job cancelled");
            }
            Err(e) => {
                warn!(job_id = %job_id, "Job failed: {}", e);
                channel.report_error(&e.to_string());
            }
        }
    }
}

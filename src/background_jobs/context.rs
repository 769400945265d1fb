use super::job::JobError;
use super::progress::ProgressChannel;
use crate::provider::ProviderClient;
use serde_json::Value as JsonValue;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Context provided to a runner while it executes one job.
#[derive(Clone)]
pub struct JobContext {
    /// Id of the job being executed.
    pub job_id: String,

    /// Cancelled when the job is revoked or the server shuts down.
    pub cancellation_token: CancellationToken,

    /// Where progress and errors are reported.
    pub progress: Arc<dyn ProgressChannel>,

    /// Transport to the AI provider.
    pub provider: Arc<dyn ProviderClient>,
}

impl JobContext {
    pub fn new(
        job_id: impl Into<String>,
        cancellation_token: CancellationToken,
        progress: Arc<dyn ProgressChannel>,
        provider: Arc<dyn ProviderClient>,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            cancellation_token,
            progress,
            provider,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }

    pub fn report_progress(&self, progress: f64, payload: Option<JsonValue>) {
        self.progress.report_progress(progress, payload);
    }

    /// Await `fut` unless the job gets cancelled first.
    pub async fn cancellable<F, T, E>(&self, fut: F) -> Result<T, JobError>
    where
        F: Future<Output = Result<T, E>>,
        JobError: From<E>,
    {
        tokio::select! {
            biased;
            _ = self.cancellation_token.cancelled() => Err(JobError::Cancelled),
            result = fut => result.map_err(JobError::from),
        }
    }
}

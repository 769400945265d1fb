use super::context::JobContext;
use crate::job_store::JobKind;
use crate::provider::ProviderError;
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::time::Duration;
use thiserror::Error;

/// Errors that end a job without a result.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Failed to write output: {0}")]
    Output(String),

    #[error("Job was cancelled")]
    Cancelled,

    #[error("Job timed out after {0:?}")]
    TimedOut(Duration),

    #[error("Job panicked: {0}")]
    Panicked(String),
}

/// The execution logic of one job.
///
/// A runner owns all of its parameters, the credential included, so it never
/// reads shared mutable state while running. It reports intermediate progress
/// through `ctx` and returns the final result; the dispatcher records that
/// result (or the error) in the job store exactly once.
#[async_trait]
pub trait JobRunner: Send + Sync {
    fn kind(&self) -> JobKind;

    /// Run the job to completion.
    ///
    /// Implementations should stop early with `JobError::Cancelled` when
    /// `ctx.is_cancelled()` turns true, typically via `ctx.cancellable`.
    async fn run(&self, ctx: &JobContext) -> Result<JsonValue, JobError>;
}

//! Progress reporting from running jobs.
//!
//! Runners talk to a [`ProgressChannel`]. The production channel writes every
//! report into the job store and then broadcasts it on [`JobEvents`] so that
//! HTTP subscribers can follow a job live without polling.

use crate::job_store::{ApplyOutcome, JobKind, JobRecord, JobState, JobStore, JobUpdate};
use crate::server::metrics;
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Sink for the intermediate state of one job.
pub trait ProgressChannel: Send + Sync {
    /// Publish a PROGRESS update. `progress` is clamped into [0, 1].
    fn report_progress(&self, progress: f64, payload: Option<JsonValue>);

    /// Publish a FAILURE with a human readable message.
    fn report_error(&self, message: &str);
}

/// A state change of a job, as seen by event subscribers.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressEvent {
    pub job_id: String,
    pub state: JobState,
    pub progress: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProgressEvent {
    pub fn from_record(record: &JobRecord) -> Self {
        let payload = match record.state {
            JobState::Progress => record.message.clone(),
            JobState::Success => record.result.clone(),
            _ => None,
        };
        Self {
            job_id: record.id.clone(),
            state: record.state,
            progress: record.progress,
            payload,
            error: record.error.clone(),
        }
    }
}

/// Broadcast bus for [`ProgressEvent`]s of all jobs.
#[derive(Clone)]
pub struct JobEvents {
    sender: broadcast::Sender<ProgressEvent>,
}

impl JobEvents {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn publish(&self, event: ProgressEvent) {
        // No subscribers is the normal case.
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.sender.subscribe()
    }
}

impl Default for JobEvents {
    fn default() -> Self {
        Self::new(256)
    }
}

/// [`ProgressChannel`] that persists reports in a [`JobStore`].
pub struct StoreProgressChannel {
    job_id: String,
    kind: JobKind,
    store: Arc<dyn JobStore>,
    events: JobEvents,
    started: Instant,
}

impl StoreProgressChannel {
    pub fn new(
        job_id: impl Into<String>,
        kind: JobKind,
        store: Arc<dyn JobStore>,
        events: JobEvents,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            kind,
            store,
            events,
            started: Instant::now(),
        }
    }

    /// Apply `update` to the stored record and broadcast the new state.
    ///
    /// Returns the updated record, or None when the update was dropped
    /// because the job is already terminal, missing, or the store failed.
    pub fn apply(&self, update: JobUpdate) -> Option<JobRecord> {
        let update_name = update.name();
        match self.store.apply(&self.job_id, update) {
            Ok(ApplyOutcome::Applied(record)) => {
                if record.state.is_terminal() {
                    metrics::record_job_finished(
                        self.kind.as_str(),
                        record.state.as_str(),
                        self.started.elapsed(),
                    );
                } else {
                    metrics::record_progress_update(self.kind.as_str());
                }
                self.events.publish(ProgressEvent::from_record(&record));
                Some(record)
            }
            Ok(ApplyOutcome::Ignored(state)) => {
                debug!(
                    job_id = %self.job_id,
                    update = update_name,
                    state = %state,
                    "Dropping update for finished job"
                );
                None
            }
            Ok(ApplyOutcome::Missing) => {
                warn!(job_id = %self.job_id, update = update_name, "Job record disappeared");
                None
            }
            Err(e) => {
                warn!(
                    job_id = %self.job_id,
                    update = update_name,
                    "Failed to store job update: {:#}",
                    e
                );
                None
            }
        }
    }
}

impl ProgressChannel for StoreProgressChannel {
    fn report_progress(&self, progress: f64, payload: Option<JsonValue>) {
        self.apply(JobUpdate::Progress { progress, payload });
    }

    fn report_error(&self, message: &str) {
        self.apply(JobUpdate::Fail {
            error: message.to_string(),
        });
    }
}

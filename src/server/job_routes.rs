//! Read and control routes over submitted jobs.

use super::error::ApiError;
use super::state::{GuardedJobStore, ServerState};
use crate::background_jobs::{Dispatcher, ProgressEvent, RevokeOutcome};
use crate::job_store::{JobRecord, JobState, JobSummary};
use axum::{
    extract::{Path, Query, State},
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
    Json, Router,
};
use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use std::convert::Infallible;
use tokio::sync::broadcast::{error::RecvError, Receiver};
use tracing::debug;

const DEFAULT_LIST_LIMIT: usize = 50;
const MAX_LIST_LIMIT: usize = 500;

#[derive(Serialize)]
struct StatusResponse {
    id: String,
    status: JobState,
    result: Option<JsonValue>,
}

#[derive(Serialize)]
struct StopResponse {
    id: String,
    revoked: bool,
}

#[derive(Deserialize, Debug)]
struct ListJobsQuery {
    limit: Option<usize>,
}

fn load_job(store: &GuardedJobStore, id: &str) -> Result<JobRecord, ApiError> {
    store.get(id)?.ok_or(ApiError::NotFound)
}

/// The `result` field of a status snapshot, shaped by state.
fn status_result(record: &JobRecord) -> Option<JsonValue> {
    match record.state {
        JobState::Pending | JobState::Revoked => None,
        JobState::Progress => Some(json!({
            "progress": record.progress,
            "msg": record.message,
        })),
        JobState::Success => record.result.clone(),
        JobState::Failure => Some(json!({ "error": record.error })),
    }
}

async fn get_status(
    State(store): State<GuardedJobStore>,
    Path(id): Path<String>,
) -> Result<Json<StatusResponse>, ApiError> {
    let record = load_job(&store, &id)?;
    Ok(Json(StatusResponse {
        result: status_result(&record),
        id: record.id,
        status: record.state,
    }))
}

async fn get_task_result(
    State(store): State<GuardedJobStore>,
    Path(id): Path<String>,
) -> Result<Json<JsonValue>, ApiError> {
    let record = load_job(&store, &id)?;
    let body = match record.state {
        JobState::Pending | JobState::Progress => json!({ "status": "pending" }),
        JobState::Failure => json!({ "status": "failed", "error": record.error }),
        JobState::Success => json!({ "result": record.result }),
        JobState::Revoked => json!({ "status": "revoked" }),
    };
    Ok(Json(body))
}

async fn stop_job(
    State(dispatcher): State<Dispatcher>,
    Path(id): Path<String>,
) -> Result<Json<StopResponse>, ApiError> {
    let revoked = match dispatcher.revoke(&id)? {
        RevokeOutcome::Revoked => true,
        RevokeOutcome::AlreadyFinished(state) => {
            debug!(job_id = %id, state = %state, "Stop requested for finished job");
            false
        }
        RevokeOutcome::NotFound => return Err(ApiError::NotFound),
    };
    Ok(Json(StopResponse { id, revoked }))
}

async fn list_jobs(
    State(store): State<GuardedJobStore>,
    Query(query): Query<ListJobsQuery>,
) -> Result<Json<Vec<JobSummary>>, ApiError> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_LIST_LIMIT)
        .clamp(1, MAX_LIST_LIMIT);
    Ok(Json(store.list_recent(limit)?))
}

/// Follows one job's events, starting from its stored snapshot.
struct EventCursor {
    job_id: String,
    store: GuardedJobStore,
    receiver: Receiver<ProgressEvent>,
    pending: Option<ProgressEvent>,
    finished: bool,
}

impl EventCursor {
    async fn next_event(&mut self) -> Option<ProgressEvent> {
        if let Some(event) = self.pending.take() {
            return Some(event);
        }
        loop {
            match self.receiver.recv().await {
                Ok(event) if event.job_id == self.job_id => return Some(event),
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    debug!(job_id = %self.job_id, skipped, "Event subscriber lagged, resyncing");
                    let record = self.store.get(&self.job_id).ok().flatten()?;
                    return Some(ProgressEvent::from_record(&record));
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}

fn to_sse_event(event: &ProgressEvent) -> Event {
    let name = event.state.as_str().to_ascii_lowercase();
    Event::default()
        .event(name)
        .json_data(event)
        .unwrap_or_else(|e| Event::default().event("error").data(e.to_string()))
}

async fn job_events(
    State(state): State<ServerState>,
    Path(id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    // Subscribe before reading the snapshot so no transition falls in between.
    let receiver = state.dispatcher.events().subscribe();
    let store = state.dispatcher.store().clone();
    let record = load_job(&store, &id)?;

    let cursor = EventCursor {
        job_id: id,
        store,
        receiver,
        pending: Some(ProgressEvent::from_record(&record)),
        finished: false,
    };

    let stream = futures::stream::unfold(cursor, |mut cursor| async move {
        if cursor.finished {
            return None;
        }
        let event = cursor.next_event().await?;
        cursor.finished = event.state.is_terminal();
        Some((Ok::<_, Infallible>(to_sse_event(&event)), cursor))
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

pub fn make_job_routes(state: ServerState) -> Router {
    Router::new()
        .route("/status/{id}", get(get_status))
        .route("/task_result/{id}", get(get_task_result))
        .route("/stop/{id}", get(stop_job))
        .route("/jobs", get(list_jobs))
        .route("/events/{id}", get(job_events))
        .with_state(state)
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Lifecycle state of a job.
///
/// PENDING and PROGRESS are the only non-terminal states; once a job reaches
/// SUCCESS, FAILURE or REVOKED it never moves again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JobState {
    Pending,
    Progress,
    Success,
    Failure,
    Revoked,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Pending => "PENDING",
            JobState::Progress => "PROGRESS",
            JobState::Success => "SUCCESS",
            JobState::Failure => "FAILURE",
            JobState::Revoked => "REVOKED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(JobState::Pending),
            "PROGRESS" => Some(JobState::Progress),
            "SUCCESS" => Some(JobState::Success),
            "FAILURE" => Some(JobState::Failure),
            "REVOKED" => Some(JobState::Revoked),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Success | JobState::Failure | JobState::Revoked
        )
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The AI operation a job performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    ChatCompletion,
    Embeddings,
    Speech,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::ChatCompletion => "chat_completion",
            JobKind::Embeddings => "embeddings",
            JobKind::Speech => "speech",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "chat_completion" => Some(JobKind::ChatCompletion),
            "embeddings" => Some(JobKind::Embeddings),
            "speech" => Some(JobKind::Speech),
            _ => None,
        }
    }
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A state change requested against a job record.
#[derive(Debug, Clone, PartialEq)]
pub enum JobUpdate {
    Progress {
        progress: f64,
        payload: Option<JsonValue>,
    },
    Succeed {
        result: JsonValue,
    },
    Fail {
        error: String,
    },
    Revoke,
}

impl JobUpdate {
    pub fn name(&self) -> &'static str {
        match self {
            JobUpdate::Progress { .. } => "progress",
            JobUpdate::Succeed { .. } => "succeed",
            JobUpdate::Fail { .. } => "fail",
            JobUpdate::Revoke => "revoke",
        }
    }
}

/// What happened when an update was applied to the store.
#[derive(Debug, Clone, PartialEq)]
pub enum ApplyOutcome {
    /// The update was accepted; carries the record after the change.
    Applied(JobRecord),
    /// The record exists but its state does not admit the update.
    Ignored(JobState),
    /// No record with that id.
    Missing,
}

impl ApplyOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, ApplyOutcome::Applied(_))
    }
}

/// Stored state of one job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobRecord {
    pub id: String,
    pub kind: JobKind,
    pub state: JobState,
    pub progress: f64,
    /// Payload attached to the latest progress update (may be a partial result).
    pub message: Option<JsonValue>,
    pub result: Option<JsonValue>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobRecord {
    pub fn pending(id: impl Into<String>, kind: JobKind) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            kind,
            state: JobState::Pending,
            progress: 0.0,
            message: None,
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply `update` in place if the current state admits it.
    ///
    /// Returns false, leaving the record untouched, when it does not. FAILURE
    /// accepts further `Fail` updates so repeated error reports overwrite the
    /// message; no other terminal state accepts anything.
    pub fn apply(&mut self, update: JobUpdate) -> bool {
        let open = !self.state.is_terminal();
        match update {
            JobUpdate::Progress { progress, payload } if open => {
                self.state = JobState::Progress;
                self.progress = clamp_progress(progress);
                self.message = payload;
            }
            JobUpdate::Succeed { result } if open => {
                self.state = JobState::Success;
                self.progress = 1.0;
                self.result = Some(result);
            }
            JobUpdate::Fail { error } if open || self.state == JobState::Failure => {
                self.state = JobState::Failure;
                self.error = Some(error);
            }
            JobUpdate::Revoke if open => {
                self.state = JobState::Revoked;
            }
            _ => return false,
        }
        self.updated_at = Utc::now();
        true
    }

    pub fn summary(&self) -> JobSummary {
        JobSummary {
            id: self.id.clone(),
            kind: self.kind,
            state: self.state,
            progress: self.progress,
            created_at: self.created_at.to_rfc3339(),
            updated_at: self.updated_at.to_rfc3339(),
        }
    }
}

fn clamp_progress(progress: f64) -> f64 {
    if progress.is_nan() {
        0.0
    } else {
        progress.clamp(0.0, 1.0)
    }
}

/// Compact listing entry for a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSummary {
    pub id: String,
    pub kind: JobKind,
    pub state: JobState,
    pub progress: f64,
    pub created_at: String,
    pub updated_at: String,
}

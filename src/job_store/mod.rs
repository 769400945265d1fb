//! Keyed storage for job records.
//!
//! The store is the only coordination point between the HTTP layer and the
//! workers running jobs: runners write through it, status handlers read from it.

mod memory_store;
mod models;
mod schema;
mod sqlite_job_store;

pub use memory_store::InMemoryJobStore;
pub use models::*;
pub use schema::JOB_VERSIONED_SCHEMAS;
pub use sqlite_job_store::SqliteJobStore;

use anyhow::Result;
use chrono::{DateTime, Utc};

pub trait JobStore: Send + Sync {
    /// Insert a new record. Fails if the id is already taken.
    fn create(&self, record: &JobRecord) -> Result<()>;

    fn get(&self, id: &str) -> Result<Option<JobRecord>>;

    /// Atomically apply a state change to one record.
    fn apply(&self, id: &str, update: JobUpdate) -> Result<ApplyOutcome>;

    /// Most recently created jobs first.
    fn list_recent(&self, limit: usize) -> Result<Vec<JobSummary>>;

    /// Delete terminal records last touched before `cutoff`. Returns how many were removed.
    fn prune_finished_before(&self, cutoff: DateTime<Utc>) -> Result<usize>;

    /// Fail every non-terminal record, used on startup for jobs orphaned by a
    /// previous process.
    fn mark_unfinished_failed(&self, reason: &str) -> Result<usize>;
}

//! Background execution of AI jobs.
//!
//! A submitted job is recorded PENDING in the job store, waits for a slot in
//! the dispatcher's worker pool, and reports progress through a
//! [`ProgressChannel`] until the dispatcher records its terminal state.

mod context;
mod dispatcher;
mod job;
pub mod jobs;
mod progress;
mod retention;

#[cfg(test)]
pub(crate) mod test_support;

pub use context::JobContext;
pub use dispatcher::{Dispatcher, DispatcherConfig, RevokeOutcome};
pub use job::{JobError, JobRunner};
pub use progress::{JobEvents, ProgressChannel, ProgressEvent, StoreProgressChannel};
pub use retention::{prune_finished_jobs, spawn_retention_task};

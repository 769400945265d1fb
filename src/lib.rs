//! Jobrelay Server Library
//!
//! This library exposes the internal modules for testing and potential reuse.

pub mod background_jobs;
pub mod config;
pub mod job_store;
pub mod provider;
pub mod server;
pub mod sqlite_persistence;

// Re-export commonly used types for convenience
pub use background_jobs::{Dispatcher, DispatcherConfig, JobEvents};
pub use job_store::{InMemoryJobStore, JobStore, SqliteJobStore};
pub use server::{make_app, run_server, CredentialStore, RequestsLoggingLevel, ServerConfig};

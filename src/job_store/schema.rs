//! SQLite schema definitions for the job database.

use crate::sqlite_column;
use crate::sqlite_persistence::{SqlType, Table, VersionedSchema};

// =============================================================================
// Version 1 - Jobs
// =============================================================================

/// One row per submitted job. JSON payloads are stored as text.
const JOBS_TABLE_V1: Table = Table {
    name: "jobs",
    columns: &[
        sqlite_column!("id", SqlType::Text, is_primary_key = true),
        sqlite_column!("kind", SqlType::Text, non_null = true),
        sqlite_column!("state", SqlType::Text, non_null = true),
        sqlite_column!("progress", SqlType::Real, non_null = true, default_value = Some("0")),
        sqlite_column!("message", SqlType::Text),
        sqlite_column!("result", SqlType::Text),
        sqlite_column!("error", SqlType::Text),
        sqlite_column!("created_at", SqlType::Text, non_null = true),
        sqlite_column!("updated_at", SqlType::Text, non_null = true),
    ],
    indices: &[
        ("idx_jobs_state", "state"),
        ("idx_jobs_created_at", "created_at DESC"),
    ],
};

pub static JOB_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 1,
    tables: &[JOBS_TABLE_V1],
    migration: None,
}];

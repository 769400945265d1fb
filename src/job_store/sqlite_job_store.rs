use super::models::{ApplyOutcome, JobKind, JobRecord, JobState, JobSummary, JobUpdate};
use super::schema::JOB_VERSIONED_SCHEMAS;
use super::JobStore;
use crate::sqlite_persistence::open_versioned;
use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value as JsonValue;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::info;

const SELECT_COLUMNS: &str =
    "id, kind, state, progress, message, result, error, created_at, updated_at";

/// Durable job store backed by a single SQLite file.
pub struct SqliteJobStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteJobStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let path = db_path.as_ref();
        let is_new_db = !path.exists();

        let mut conn = Connection::open(path).context("Failed to open job database")?;
        if is_new_db {
            info!("Creating new job database at {:?}", path);
        }
        open_versioned(&mut conn, is_new_db, JOB_VERSIONED_SCHEMAS)
            .with_context(|| format!("Failed to initialize job database at {:?}", path))?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Fresh database that lives only as long as this store. Handy in tests.
    pub fn in_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        open_versioned(&mut conn, true, JOB_VERSIONED_SCHEMAS)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow::anyhow!("Job database lock poisoned"))
    }

    fn format_datetime(dt: &DateTime<Utc>) -> String {
        dt.to_rfc3339_opts(SecondsFormat::Micros, true)
    }

    fn parse_datetime(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now())
    }

    fn encode_json(value: &Option<JsonValue>) -> Result<Option<String>> {
        value
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .context("Failed to encode job payload")
    }

    fn decode_json(text: Option<String>) -> Option<JsonValue> {
        text.and_then(|s| serde_json::from_str(&s).ok())
    }

    fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<JobRecord> {
        let kind_str: String = row.get("kind")?;
        let state_str: String = row.get("state")?;
        let created_at: String = row.get("created_at")?;
        let updated_at: String = row.get("updated_at")?;

        let kind = JobKind::parse(&kind_str).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                1,
                rusqlite::types::Type::Text,
                format!("unknown job kind '{}'", kind_str).into(),
            )
        })?;
        let state = JobState::parse(&state_str).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                2,
                rusqlite::types::Type::Text,
                format!("unknown job state '{}'", state_str).into(),
            )
        })?;

        Ok(JobRecord {
            id: row.get("id")?,
            kind,
            state,
            progress: row.get("progress")?,
            message: Self::decode_json(row.get("message")?),
            result: Self::decode_json(row.get("result")?),
            error: row.get("error")?,
            created_at: Self::parse_datetime(&created_at),
            updated_at: Self::parse_datetime(&updated_at),
        })
    }

    fn write_record(conn: &Connection, record: &JobRecord) -> Result<()> {
        conn.execute(
            "UPDATE jobs SET state = ?2, progress = ?3, message = ?4, result = ?5, error = ?6, \
             updated_at = ?7 WHERE id = ?1",
            params![
                record.id,
                record.state.as_str(),
                record.progress,
                Self::encode_json(&record.message)?,
                Self::encode_json(&record.result)?,
                record.error,
                Self::format_datetime(&record.updated_at),
            ],
        )?;
        Ok(())
    }
}

impl JobStore for SqliteJobStore {
    fn create(&self, record: &JobRecord) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO jobs (id, kind, state, progress, message, result, error, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                record.id,
                record.kind.as_str(),
                record.state.as_str(),
                record.progress,
                Self::encode_json(&record.message)?,
                Self::encode_json(&record.result)?,
                record.error,
                Self::format_datetime(&record.created_at),
                Self::format_datetime(&record.updated_at),
            ],
        )
        .with_context(|| format!("Failed to insert job {}", record.id))?;
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Option<JobRecord>> {
        let conn = self.lock()?;
        let record = conn
            .query_row(
                &format!("SELECT {} FROM jobs WHERE id = ?1", SELECT_COLUMNS),
                params![id],
                Self::row_to_record,
            )
            .optional()?;
        Ok(record)
    }

    fn apply(&self, id: &str, update: JobUpdate) -> Result<ApplyOutcome> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let current = tx
            .query_row(
                &format!("SELECT {} FROM jobs WHERE id = ?1", SELECT_COLUMNS),
                params![id],
                Self::row_to_record,
            )
            .optional()?;
        let Some(mut record) = current else {
            return Ok(ApplyOutcome::Missing);
        };

        if !record.apply(update) {
            return Ok(ApplyOutcome::Ignored(record.state));
        }
        Self::write_record(&tx, &record)?;
        tx.commit()?;
        Ok(ApplyOutcome::Applied(record))
    }

    fn list_recent(&self, limit: usize) -> Result<Vec<JobSummary>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM jobs ORDER BY created_at DESC LIMIT ?1",
            SELECT_COLUMNS
        ))?;
        let records = stmt
            .query_map(params![limit as i64], Self::row_to_record)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records.iter().map(JobRecord::summary).collect())
    }

    fn prune_finished_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let conn = self.lock()?;
        let removed = conn.execute(
            "DELETE FROM jobs WHERE state IN ('SUCCESS', 'FAILURE', 'REVOKED') AND updated_at < ?1",
            params![Self::format_datetime(&cutoff)],
        )?;
        Ok(removed)
    }

    fn mark_unfinished_failed(&self, reason: &str) -> Result<usize> {
        let conn = self.lock()?;
        let updated = conn.execute(
            "UPDATE jobs SET state = 'FAILURE', error = ?1, updated_at = ?2 \
             WHERE state IN ('PENDING', 'PROGRESS')",
            params![reason, Self::format_datetime(&Utc::now())],
        )?;
        Ok(updated)
    }
}

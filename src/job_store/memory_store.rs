use super::models::{ApplyOutcome, JobRecord, JobSummary, JobUpdate};
use super::JobStore;
use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::RwLock;

/// Process-local job store. Records do not survive a restart.
#[derive(Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<String, JobRecord>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl JobStore for InMemoryJobStore {
    fn create(&self, record: &JobRecord) -> Result<()> {
        let mut jobs = self
            .jobs
            .write()
            .map_err(|_| anyhow::anyhow!("Job store lock poisoned"))?;
        if jobs.contains_key(&record.id) {
            bail!("Job {} already exists", record.id);
        }
        jobs.insert(record.id.clone(), record.clone());
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Option<JobRecord>> {
        let jobs = self
            .jobs
            .read()
            .map_err(|_| anyhow::anyhow!("Job store lock poisoned"))?;
        Ok(jobs.get(id).cloned())
    }

    fn apply(&self, id: &str, update: JobUpdate) -> Result<ApplyOutcome> {
        let mut jobs = self
            .jobs
            .write()
            .map_err(|_| anyhow::anyhow!("Job store lock poisoned"))?;
        let Some(record) = jobs.get_mut(id) else {
            return Ok(ApplyOutcome::Missing);
        };
        if record.apply(update) {
            Ok(ApplyOutcome::Applied(record.clone()))
        } else {
            Ok(ApplyOutcome::Ignored(record.state))
        }
    }

    fn list_recent(&self, limit: usize) -> Result<Vec<JobSummary>> {
        let jobs = self
            .jobs
            .read()
            .map_err(|_| anyhow::anyhow!("Job store lock poisoned"))?;
        let mut records: Vec<&JobRecord> = jobs.values().collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records
            .into_iter()
            .take(limit)
            .map(JobRecord::summary)
            .collect())
    }

    fn prune_finished_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let mut jobs = self
            .jobs
            .write()
            .map_err(|_| anyhow::anyhow!("Job store lock poisoned"))?;
        let before = jobs.len();
        jobs.retain(|_, record| !(record.state.is_terminal() && record.updated_at < cutoff));
        Ok(before - jobs.len())
    }

    fn mark_unfinished_failed(&self, reason: &str) -> Result<usize> {
        let mut jobs = self
            .jobs
            .write()
            .map_err(|_| anyhow::anyhow!("Job store lock poisoned"))?;
        let mut count = 0;
        for record in jobs.values_mut() {
            if !record.state.is_terminal()
                && record.apply(JobUpdate::Fail {
                    error: reason.to_string(),
                })
            {
                count += 1;
            }
        }
        Ok(count)
    }
}

//! Job storage.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use dlpkit_core::JobId;
use dlpkit_inspect::JobState;

use super::types::ScanJob;

/// Job store abstraction.
pub trait JobStore: Send + Sync {
    fn enqueue(&self, job: ScanJob) -> Result<JobId, JobStoreError>;

    fn get(&self, job_id: &JobId) -> Result<Option<ScanJob>, JobStoreError>;

    /// Replace a stored job. The job must already exist.
    fn update(&self, job: &ScanJob) -> Result<(), JobStoreError>;

    /// Claim the oldest pending job, marking it running.
    /// Returns None if no jobs are pending.
    fn claim_next(&self) -> Result<Option<ScanJob>, JobStoreError>;

    /// Jobs in `state` (all jobs when `None`), oldest first.
    fn list_by_state(
        &self,
        state: Option<JobState>,
        limit: usize,
    ) -> Result<Vec<ScanJob>, JobStoreError>;

    fn stats(&self) -> Result<JobStats, JobStoreError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JobStoreError {
    #[error("job not found: {0}")]
    NotFound(JobId),
    #[error("job already exists: {0}")]
    AlreadyExists(JobId),
    #[error("storage error: {0}")]
    Storage(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct JobStats {
    pub pending: usize,
    pub running: usize,
    pub done: usize,
    pub failed: usize,
}

/// In-memory job store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<JobId, ScanJob>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

fn poisoned<T>(_: T) -> JobStoreError {
    JobStoreError::Storage("job store lock poisoned".to_string())
}

impl JobStore for InMemoryJobStore {
    fn enqueue(&self, job: ScanJob) -> Result<JobId, JobStoreError> {
        let mut jobs = self.jobs.write().map_err(poisoned)?;
        if jobs.contains_key(&job.id) {
            return Err(JobStoreError::AlreadyExists(job.id));
        }
        let id = job.id.clone();
        jobs.insert(id.clone(), job);
        Ok(id)
    }

    fn get(&self, job_id: &JobId) -> Result<Option<ScanJob>, JobStoreError> {
        let jobs = self.jobs.read().map_err(poisoned)?;
        Ok(jobs.get(job_id).cloned())
    }

    fn update(&self, job: &ScanJob) -> Result<(), JobStoreError> {
        let mut jobs = self.jobs.write().map_err(poisoned)?;
        match jobs.get_mut(&job.id) {
            Some(stored) => {
                *stored = job.clone();
                Ok(())
            }
            None => Err(JobStoreError::NotFound(job.id.clone())),
        }
    }

    fn claim_next(&self) -> Result<Option<ScanJob>, JobStoreError> {
        let mut jobs = self.jobs.write().map_err(poisoned)?;

        // FIFO by creation time; ids break ties between jobs created in the same instant.
        let next = jobs
            .values()
            .filter(|j| j.state == JobState::Pending)
            .min_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)))
            .map(|j| j.id.clone());

        Ok(next.and_then(|id| {
            jobs.get_mut(&id).map(|job| {
                job.mark_running();
                job.clone()
            })
        }))
    }

    fn list_by_state(
        &self,
        state: Option<JobState>,
        limit: usize,
    ) -> Result<Vec<ScanJob>, JobStoreError> {
        let jobs = self.jobs.read().map_err(poisoned)?;
        let mut result: Vec<_> = jobs
            .values()
            .filter(|j| state.is_none_or(|s| j.state == s))
            .cloned()
            .collect();

        result.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        result.truncate(limit);
        Ok(result)
    }

    fn stats(&self) -> Result<JobStats, JobStoreError> {
        let jobs = self.jobs.read().map_err(poisoned)?;
        let mut stats = JobStats::default();
        for job in jobs.values() {
            match job.state {
                JobState::Pending => stats.pending += 1,
                JobState::Running => stats.running += 1,
                JobState::Done => stats.done += 1,
                JobState::Failed => stats.failed += 1,
            }
        }
        Ok(stats)
    }
}

impl<S: JobStore + ?Sized> JobStore for Arc<S> {
    fn enqueue(&self, job: ScanJob) -> Result<JobId, JobStoreError> {
        (**self).enqueue(job)
    }

    fn get(&self, job_id: &JobId) -> Result<Option<ScanJob>, JobStoreError> {
        (**self).get(job_id)
    }

    fn update(&self, job: &ScanJob) -> Result<(), JobStoreError> {
        (**self).update(job)
    }

    fn claim_next(&self) -> Result<Option<ScanJob>, JobStoreError> {
        (**self).claim_next()
    }

    fn list_by_state(
        &self,
        state: Option<JobState>,
        limit: usize,
    ) -> Result<Vec<ScanJob>, JobStoreError> {
        (**self).list_by_state(state, limit)
    }

    fn stats(&self) -> Result<JobStats, JobStoreError> {
        (**self).stats()
    }
}

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use chrono::{DateTime, Utc};

use super::domain::{Job, JobEvent, JobId, TransitionError};

/// Process-scoped store of every job the orchestrator created.
///
/// The outer map is only write-locked to add a record; transitions lock the single record they
/// touch, so poll loops for different jobs never contend with each other.
#[derive(Default)]
pub struct JobRegistry {
    jobs: RwLock<HashMap<JobId, Arc<Mutex<Job>>>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, job: Job) -> Result<(), RegistryError> {
        let mut jobs = self.jobs.write().unwrap_or_else(PoisonError::into_inner);
        if jobs.contains_key(job.id()) {
            return Err(RegistryError::Conflict(job.id().clone()));
        }
        jobs.insert(job.id().clone(), Arc::new(Mutex::new(job)));
        Ok(())
    }

    /// Returns a snapshot of the job as of its last completed transition.
    pub fn get(&self, id: &JobId) -> Option<Job> {
        let record = self.record(id)?;
        let job = record.lock().unwrap_or_else(PoisonError::into_inner);
        Some(job.clone())
    }

    /// Applies `event` to the job and returns the resulting snapshot.
    pub fn apply(
        &self,
        id: &JobId,
        event: JobEvent,
        at: DateTime<Utc>,
    ) -> Result<Job, RegistryError> {
        let record = self
            .record(id)
            .ok_or_else(|| RegistryError::NotFound(id.clone()))?;
        let mut job = record.lock().unwrap_or_else(PoisonError::into_inner);
        job.apply(event, at)?;
        Ok(job.clone())
    }

    pub fn len(&self) -> usize {
        self.jobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn record(&self, id: &JobId) -> Option<Arc<Mutex<Job>>> {
        self.jobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("job {0} already exists")]
    Conflict(JobId),
    #[error("job {0} not found")]
    NotFound(JobId),
    #[error(transparent)]
    Transition(#[from] TransitionError),
}

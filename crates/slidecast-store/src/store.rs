//! Job record store interface and its in-memory implementation.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use slidecast_models::{Job, JobId};

use crate::error::StoreResult;

/// Persistence for job records. Only the orchestrator writes.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Fetch a job, `None` if it was never stored.
    async fn get(&self, id: &JobId) -> StoreResult<Option<Job>>;

    /// Insert or replace a job record.
    async fn set(&self, job: &Job) -> StoreResult<()>;
}

/// Process-local store, used in tests and single-process runs.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<JobId, Job>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn get(&self, id: &JobId) -> StoreResult<Option<Job>> {
        Ok(self.jobs.read().await.get(id).cloned())
    }

    async fn set(&self, job: &Job) -> StoreResult<()> {
        self.jobs.write().await.insert(job.id.clone(), job.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slidecast_models::{JobState, UploadMetadata};
    use tokio_test::assert_ok;

    #[tokio::test]
    async fn test_set_then_get_replaces_record() {
        let store = InMemoryJobStore::new();
        let mut job = Job::new("/videos/talk.mp4", UploadMetadata::with_duration(66.0));
        assert_ok!(store.set(&job).await);

        job.state = JobState::Processing;
        assert_ok!(store.set(&job).await);

        let loaded = store.get(&job.id).await.unwrap().unwrap();
        assert_eq!(loaded.state, JobState::Processing);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_missing_job_is_none() {
        let store = InMemoryJobStore::new();
        assert!(store.get(&JobId::from_string("nope")).await.unwrap().is_none());
        assert!(store.is_empty().await);
    }
}

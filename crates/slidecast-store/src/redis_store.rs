//! Redis-backed job store. Each job is one JSON string key.

use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use tracing::debug;

use slidecast_models::{Job, JobId};

use crate::error::StoreResult;
use crate::store::JobStore;

/// Job store keeping records as JSON under `<prefix>:job:<id>`.
pub struct RedisJobStore {
    client: redis::Client,
    key_prefix: String,
    ttl: Option<Duration>,
}

impl RedisJobStore {
    pub fn new(redis_url: &str, key_prefix: impl Into<String>, ttl: Option<Duration>) -> StoreResult<Self> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self {
            client,
            key_prefix: key_prefix.into(),
            ttl,
        })
    }

    pub fn key(&self, id: &JobId) -> String {
        format!("{}:job:{}", self.key_prefix, id)
    }

    /// Verify the server is reachable.
    pub async fn ping(&self) -> StoreResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        redis::cmd("PING").query_async::<()>(&mut conn).await?;
        Ok(())
    }
}

#[async_trait]
impl JobStore for RedisJobStore {
    async fn get(&self, id: &JobId) -> StoreResult<Option<Job>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let payload: Option<String> = conn.get(self.key(id)).await?;
        match payload {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn set(&self, job: &Job) -> StoreResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let key = self.key(&job.id);
        let payload = serde_json::to_string(job)?;

        debug!(job_id = %job.id, state = job.state.as_str(), "Storing job record");
        match self.ttl {
            Some(ttl) => conn.set_ex::<_, _, ()>(key, payload, ttl.as_secs()).await?,
            None => conn.set::<_, _, ()>(key, payload).await?,
        }
        Ok(())
    }
}

//! Job store errors.

use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("could not reach job store: {0}")]
    ConnectionFailed(String),

    #[error("redis: {0}")]
    Redis(#[from] redis::RedisError),

    /// A stored record that no longer deserializes as a job.
    #[error("corrupt job record: {0}")]
    Json(#[from] serde_json::Error),
}

impl StoreError {
    pub fn connection_failed(msg: impl Into<String>) -> Self {
        Self::ConnectionFailed(msg.into())
    }
}

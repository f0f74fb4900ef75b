use crate::domain::jobs::CompletionMessage;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue backend error: {0}")]
    Backend(String),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A received message that stays on the queue until acknowledged.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub receipt: String,
    pub body: String,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CompletionPublisher: Send + Sync {
    /// Hand a transcoded segment over to the ingest consumer
    async fn publish(&self, message: &CompletionMessage) -> Result<(), QueueError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RequestQueue: Send + Sync {
    /// Long-poll for transform requests
    /// wait_secs: how long to wait for a message before returning empty
    async fn receive(&self, wait_secs: i32) -> Result<Vec<Delivery>, QueueError>;

    /// Remove a processed message so it is not redelivered
    async fn acknowledge(&self, receipt: &str) -> Result<(), QueueError>;
}

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TamsError {
    #[error("{path} returned status {status}")]
    Status { path: String, status: u16 },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("unexpected response from {path}: {reason}")]
    Decode { path: String, reason: String },
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("refusing to follow {0} outside the configured endpoint")]
    ForeignOrigin(String),
}

impl TamsError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, TamsError::Status { status: 404, .. })
    }
}

/// One response body plus the continuation link, if the server sent one.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub body: Value,
    pub next: Option<String>,
}

#[async_trait]
pub trait TamsApi: Send + Sync {
    /// GET a path relative to the API root, or a continuation link
    async fn get(&self, path: &str) -> Result<Page, TamsError>;

    async fn put(&self, path: &str, body: &Value) -> Result<(), TamsError>;

    async fn delete(&self, path: &str) -> Result<(), TamsError>;
}

#[async_trait]
impl<T: TamsApi + ?Sized> TamsApi for std::sync::Arc<T> {
    async fn get(&self, path: &str) -> Result<Page, TamsError> {
        (**self).get(path).await
    }

    async fn put(&self, path: &str, body: &Value) -> Result<(), TamsError> {
        (**self).put(path, body).await
    }

    async fn delete(&self, path: &str) -> Result<(), TamsError> {
        (**self).delete(path).await
    }
}

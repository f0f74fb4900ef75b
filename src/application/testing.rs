//! In-memory TAMS and object stores for service tests.

use crate::domain::jobs::StorageLocation;
use crate::ports::storage::{ByteReader, ObjectStore, StorageError};
use crate::ports::tams::{Page, TamsApi, TamsError};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Mutex;
use tokio::io::AsyncReadExt;

#[derive(Default)]
pub struct FakeTams {
    pages: Mutex<HashMap<String, Page>>,
    requests: Mutex<Vec<String>>,
}

impl FakeTams {
    pub fn page(&self, path: &str, items: Vec<Value>, next: Option<&str>) {
        self.respond(path, Value::Array(items), next);
    }

    pub fn record(&self, path: &str, record: Value) {
        self.respond(path, record, None);
    }

    fn respond(&self, path: &str, body: Value, next: Option<&str>) {
        self.pages.lock().unwrap().insert(
            path.to_string(),
            Page {
                body,
                next: next.map(String::from),
            },
        );
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl TamsApi for FakeTams {
    async fn get(&self, path: &str) -> Result<Page, TamsError> {
        self.requests.lock().unwrap().push(format!("GET {}", path));
        self.pages
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| TamsError::Status {
                path: path.to_string(),
                status: 404,
            })
    }

    async fn put(&self, path: &str, body: &Value) -> Result<(), TamsError> {
        self.requests
            .lock()
            .unwrap()
            .push(format!("PUT {} {}", path, body));
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<(), TamsError> {
        self.requests.lock().unwrap().push(format!("DELETE {}", path));
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryStore {
    objects: Mutex<HashMap<StorageLocation, Vec<u8>>>,
}

impl MemoryStore {
    pub fn with(self, bucket: &str, key: &str, bytes: &[u8]) -> Self {
        self.objects
            .lock()
            .unwrap()
            .insert(StorageLocation::new(bucket, key), bytes.to_vec());
        self
    }

    pub fn object(&self, location: &StorageLocation) -> Option<Vec<u8>> {
        self.objects.lock().unwrap().get(location).cloned()
    }

    /// Sorted keys held in `bucket`.
    pub fn keys(&self, bucket: &str) -> Vec<String> {
        let mut keys: Vec<String> = self
            .objects
            .lock()
            .unwrap()
            .keys()
            .filter(|location| location.bucket == bucket)
            .map(|location| location.key.clone())
            .collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn open(&self, location: &StorageLocation) -> Result<ByteReader, StorageError> {
        let bytes = self
            .object(location)
            .ok_or_else(|| StorageError::NotFound(location.uri()))?;
        Ok(Box::pin(Cursor::new(bytes)))
    }

    async fn put_stream(
        &self,
        location: &StorageLocation,
        mut body: ByteReader,
    ) -> Result<u64, StorageError> {
        let mut bytes = Vec::new();
        body.read_to_end(&mut bytes).await?;
        let written = bytes.len() as u64;
        self.objects.lock().unwrap().insert(location.clone(), bytes);
        Ok(written)
    }

    async fn copy(&self, from: &StorageLocation, to: &StorageLocation) -> Result<(), StorageError> {
        let bytes = self
            .object(from)
            .ok_or_else(|| StorageError::NotFound(from.uri()))?;
        self.objects.lock().unwrap().insert(to.clone(), bytes);
        Ok(())
    }

    async fn delete(&self, location: &StorageLocation) -> Result<(), StorageError> {
        self.objects.lock().unwrap().remove(location);
        Ok(())
    }
}

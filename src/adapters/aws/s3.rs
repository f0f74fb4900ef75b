use crate::domain::jobs::StorageLocation;
use crate::ports::storage::{ByteReader, ObjectStore, StorageError};
use async_trait::async_trait;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use aws_sdk_s3::Client;
use tokio::io::AsyncReadExt;
use tracing::{debug, warn};

/// Upload part size. S3 requires at least 5 MiB for every part but the last.
const PART_SIZE: usize = 16 * 1024 * 1024;

/// Largest object a single CopyObject call accepts.
const MAX_SINGLE_COPY: i64 = 5_000_000_000;

/// Range size for multipart copies.
const COPY_PART_SIZE: i64 = 512 * 1024 * 1024;

/// S3Adapter implements ObjectStore for AWS S3.
/// Bodies are streamed in both directions; nothing is staged on disk.
#[derive(Clone)]
pub struct S3Adapter {
    client: Client,
}

impl S3Adapter {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn upload_parts(
        &self,
        location: &StorageLocation,
        upload_id: &str,
        mut part: Vec<u8>,
        body: &mut ByteReader,
    ) -> Result<(Vec<CompletedPart>, u64), StorageError> {
        let mut completed = Vec::new();
        let mut written = 0u64;
        let mut part_number = 1;

        while !part.is_empty() {
            written += part.len() as u64;
            let resp = self
                .client
                .upload_part()
                .bucket(&location.bucket)
                .key(&location.key)
                .upload_id(upload_id)
                .part_number(part_number)
                .body(ByteStream::from(part))
                .send()
                .await
                .map_err(backend)?;
            debug!(key = %location.key, part_number, "uploaded part");

            completed.push(
                CompletedPart::builder()
                    .part_number(part_number)
                    .set_e_tag(resp.e_tag().map(String::from))
                    .build(),
            );
            part_number += 1;
            part = read_part(body).await?;
        }
        Ok((completed, written))
    }

    async fn copy_parts(
        &self,
        from: &StorageLocation,
        to: &StorageLocation,
        upload_id: &str,
        size: i64,
    ) -> Result<Vec<CompletedPart>, StorageError> {
        let mut completed = Vec::new();
        let mut copied = 0i64;
        let mut part_number = 1;

        while copied < size {
            let last = (copied + COPY_PART_SIZE).min(size) - 1;
            let resp = self
                .client
                .upload_part_copy()
                .bucket(&to.bucket)
                .key(&to.key)
                .upload_id(upload_id)
                .part_number(part_number)
                .copy_source(copy_source(from))
                .copy_source_range(format!("bytes={}-{}", copied, last))
                .send()
                .await
                .map_err(backend)?;
            debug!(key = %to.key, part_number, "copied part");

            completed.push(
                CompletedPart::builder()
                    .part_number(part_number)
                    .set_e_tag(
                        resp.copy_part_result()
                            .and_then(|result| result.e_tag())
                            .map(String::from),
                    )
                    .build(),
            );
            copied = last + 1;
            part_number += 1;
        }
        Ok(completed)
    }

    async fn abort(&self, location: &StorageLocation, upload_id: &str) {
        if let Err(abort_err) = self
            .client
            .abort_multipart_upload()
            .bucket(&location.bucket)
            .key(&location.key)
            .upload_id(upload_id)
            .send()
            .await
        {
            warn!(
                key = %location.key,
                error = %DisplayErrorContext(&abort_err),
                "failed to abort multipart upload"
            );
        }
    }

    async fn start_multipart(&self, location: &StorageLocation) -> Result<String, StorageError> {
        let upload = self
            .client
            .create_multipart_upload()
            .bucket(&location.bucket)
            .key(&location.key)
            .send()
            .await
            .map_err(backend)?;
        Ok(upload
            .upload_id()
            .ok_or_else(|| StorageError::Backend("multipart upload has no id".to_string()))?
            .to_string())
    }

    async fn complete_multipart(
        &self,
        location: &StorageLocation,
        upload_id: &str,
        parts: Vec<CompletedPart>,
    ) -> Result<(), StorageError> {
        self.client
            .complete_multipart_upload()
            .bucket(&location.bucket)
            .key(&location.key)
            .upload_id(upload_id)
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(parts))
                    .build(),
            )
            .send()
            .await
            .map_err(backend)?;
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for S3Adapter {
    async fn open(&self, location: &StorageLocation) -> Result<ByteReader, StorageError> {
        let resp = self
            .client
            .get_object()
            .bucket(&location.bucket)
            .key(&location.key)
            .send()
            .await
            .map_err(|err| {
                if err
                    .as_service_error()
                    .is_some_and(|service| service.is_no_such_key())
                {
                    StorageError::NotFound(location.uri())
                } else {
                    backend(err)
                }
            })?;

        Ok(Box::pin(resp.body.into_async_read()))
    }

    async fn put_stream(
        &self,
        location: &StorageLocation,
        mut body: ByteReader,
    ) -> Result<u64, StorageError> {
        let first = read_part(&mut body).await?;
        if first.len() < PART_SIZE {
            let size = first.len() as u64;
            self.client
                .put_object()
                .bucket(&location.bucket)
                .key(&location.key)
                .body(ByteStream::from(first))
                .send()
                .await
                .map_err(backend)?;
            return Ok(size);
        }

        let upload_id = self.start_multipart(location).await?;
        let (parts, written) = match self
            .upload_parts(location, &upload_id, first, &mut body)
            .await
        {
            Ok(uploaded) => uploaded,
            Err(err) => {
                self.abort(location, &upload_id).await;
                return Err(err);
            }
        };

        self.complete_multipart(location, &upload_id, parts).await?;
        Ok(written)
    }

    async fn copy(&self, from: &StorageLocation, to: &StorageLocation) -> Result<(), StorageError> {
        let head = self
            .client
            .head_object()
            .bucket(&from.bucket)
            .key(&from.key)
            .send()
            .await
            .map_err(|err| {
                if err
                    .as_service_error()
                    .is_some_and(|service| service.is_not_found())
                {
                    StorageError::NotFound(from.uri())
                } else {
                    backend(err)
                }
            })?;
        let size = head.content_length().unwrap_or_default();

        if size < MAX_SINGLE_COPY {
            self.client
                .copy_object()
                .copy_source(copy_source(from))
                .bucket(&to.bucket)
                .key(&to.key)
                .send()
                .await
                .map_err(backend)?;
            return Ok(());
        }

        let upload_id = self.start_multipart(to).await?;
        let parts = match self.copy_parts(from, to, &upload_id, size).await {
            Ok(parts) => parts,
            Err(err) => {
                self.abort(to, &upload_id).await;
                return Err(err);
            }
        };
        self.complete_multipart(to, &upload_id, parts).await
    }

    async fn delete(&self, location: &StorageLocation) -> Result<(), StorageError> {
        self.client
            .delete_object()
            .bucket(&location.bucket)
            .key(&location.key)
            .send()
            .await
            .map_err(backend)?;
        Ok(())
    }
}

/// Reads up to one part from `body`. An empty buffer means end of stream.
async fn read_part(body: &mut ByteReader) -> Result<Vec<u8>, StorageError> {
    let mut part = Vec::with_capacity(PART_SIZE);
    body.take(PART_SIZE as u64).read_to_end(&mut part).await?;
    Ok(part)
}

/// `bucket/key` form expected by the copy APIs; keys are URL-encoded.
fn copy_source(location: &StorageLocation) -> String {
    let key = url::form_urlencoded::byte_serialize(location.key.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
        .replace("%2F", "/");
    format!("{}/{}", location.bucket, key)
}

fn backend<E: std::error::Error>(err: E) -> StorageError {
    StorageError::Backend(DisplayErrorContext(err).to_string())
}

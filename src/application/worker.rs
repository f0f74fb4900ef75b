use crate::domain::jobs::{
    CompletionMessage, ExportAction, ExportFfmpeg, ExportOutput, ExportRequest, LocationError,
    SegmentRef, StorageLocation, TransformRequest,
};
use crate::domain::timerange::TimerangeError;
use crate::ports::queue::{CompletionPublisher, QueueError, RequestQueue};
use crate::ports::storage::{ObjectStore, StorageError};
use crate::ports::transcoder::{TranscodeError, Transcoder};
use futures::future::try_join_all;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tempfile::TempDir;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Long-poll wait for the request queue.
const POLL_WAIT_SECS: i32 = 10;

const CONCAT_PREFIX: &str = "concat/";
const EXPORT_PREFIX: &str = "export/";

/// In-memory buffer between the object being read and the upload.
const APPEND_BUFFER: usize = 1024 * 1024;

/// What to do with an uploaded output when the transcoder exits non-zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TranscodeFailurePolicy {
    /// Delete the output and fail the segment.
    #[default]
    Fail,
    /// Keep the output and publish the completion anyway.
    BestEffort,
}

impl FromStr for TranscodeFailurePolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "fail" => Ok(Self::Fail),
            "best-effort" => Ok(Self::BestEffort),
            other => Err(format!("unknown transcode failure policy {:?}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentPhase {
    Received,
    Downloading,
    Transcoding,
    Uploading,
    Notified,
}

impl fmt::Display for SegmentPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SegmentPhase::Received => "received",
            SegmentPhase::Downloading => "downloading",
            SegmentPhase::Transcoding => "transcoding",
            SegmentPhase::Uploading => "uploading",
            SegmentPhase::Notified => "notified",
        })
    }
}

#[derive(Debug, Error)]
pub enum SegmentFailure {
    #[error(transparent)]
    Timerange(#[from] TimerangeError),
    #[error(transparent)]
    Location(#[from] LocationError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Transcode(#[from] TranscodeError),
    #[error(transparent)]
    Queue(#[from] QueueError),
}

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("invalid transform request: {0}")]
    InvalidRequest(#[from] serde_json::Error),
    #[error("message {0} has no body")]
    EmptyMessage(String),
    #[error("segment {object_id} failed in phase {phase}: {source}")]
    Segment {
        object_id: String,
        phase: SegmentPhase,
        source: SegmentFailure,
    },
}

impl WorkerError {
    pub fn phase(&self) -> Option<SegmentPhase> {
        match self {
            WorkerError::InvalidRequest(_) | WorkerError::EmptyMessage(_) => None,
            WorkerError::Segment { phase, .. } => Some(*phase),
        }
    }
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("{0} needs at least one input object")]
    NoInputs(&'static str),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Transcode(#[from] TranscodeError),
    #[error("staging io error: {0}")]
    Io(#[from] std::io::Error),
}

fn segment_error(
    segment: &SegmentRef,
    phase: SegmentPhase,
    err: impl Into<SegmentFailure>,
) -> WorkerError {
    WorkerError::Segment {
        object_id: segment.object_id.clone(),
        phase,
        source: err.into(),
    }
}

/// Streams segments through the transcoder and hands the results over
/// to the ingest queue.
pub struct TransformWorker<S, T, P> {
    storage: S,
    transcoder: T,
    publisher: P,
    policy: TranscodeFailurePolicy,
}

impl<S, T, P> TransformWorker<S, T, P>
where
    S: ObjectStore,
    T: Transcoder,
    P: CompletionPublisher,
{
    pub fn new(storage: S, transcoder: T, publisher: P) -> Self {
        Self {
            storage,
            transcoder,
            publisher,
            policy: TranscodeFailurePolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: TranscodeFailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Decodes a queue message body and processes the request in it.
    pub async fn handle_message(&self, body: &str) -> Result<Vec<CompletionMessage>, WorkerError> {
        let request: TransformRequest = serde_json::from_str(body)?;
        self.process_request(&request).await
    }

    /// Segments are processed one after another; the first failure stops
    /// the request.
    pub async fn process_request(
        &self,
        request: &TransformRequest,
    ) -> Result<Vec<CompletionMessage>, WorkerError> {
        info!(
            flow_id = %request.destination_flow,
            segments = request.segments.len(),
            "processing transform request"
        );
        let mut completed = Vec::with_capacity(request.segments.len());
        for segment in &request.segments {
            completed.push(self.process_segment(request, segment).await?);
        }
        Ok(completed)
    }

    pub async fn process_segment(
        &self,
        request: &TransformRequest,
        segment: &SegmentRef,
    ) -> Result<CompletionMessage, WorkerError> {
        let object_id = segment.object_id.as_str();

        segment
            .parsed_timerange()
            .map_err(|err| segment_error(segment, SegmentPhase::Received, err))?;
        let source = segment
            .location()
            .map_err(|err| segment_error(segment, SegmentPhase::Received, err))?;

        info!(object_id, source = %source, "downloading segment");
        let input = self
            .storage
            .open(&source)
            .await
            .map_err(|err| segment_error(segment, SegmentPhase::Downloading, err))?;

        let session = self
            .transcoder
            .start(input, &request.ffmpeg)
            .map_err(|err| segment_error(segment, SegmentPhase::Transcoding, err))?;

        let output = StorageLocation::new(
            &request.output_bucket,
            format!("{}{}", request.output_prefix, Uuid::new_v4()),
        );
        info!(object_id, key = %output.key, "transcoding into output");
        let (uploaded, finished) = tokio::join!(
            self.storage.put_stream(&output, session.output),
            session.completion
        );
        let written = uploaded.map_err(|err| segment_error(segment, SegmentPhase::Uploading, err))?;

        // Only a transcoder exit is subject to the failure policy. A broken
        // input stream means the output is truncated.
        match finished {
            Ok(report) => {
                debug!(object_id, bytes_in = ?report.bytes_in, bytes_out = written, "transcode finished");
            }
            Err(err @ TranscodeError::Exit { .. })
                if self.policy == TranscodeFailurePolicy::BestEffort =>
            {
                warn!(object_id, key = %output.key, error = %err, "transcode failed, publishing output anyway");
            }
            Err(err) => {
                self.discard(&output).await;
                let phase = match err {
                    TranscodeError::Input(_) => SegmentPhase::Downloading,
                    _ => SegmentPhase::Transcoding,
                };
                return Err(segment_error(segment, phase, err));
            }
        }

        let message = CompletionMessage {
            flow_id: request.destination_flow.clone(),
            timerange: segment.timerange.clone(),
            uri: output.uri(),
            delete_source: true,
        };
        self.publisher
            .publish(&message)
            .await
            .map_err(|err| segment_error(segment, SegmentPhase::Notified, err))?;
        info!(object_id, flow_id = %message.flow_id, uri = %message.uri, "segment ingested");
        Ok(message)
    }

    async fn discard(&self, output: &StorageLocation) {
        if let Err(err) = self.storage.delete(output).await {
            warn!(key = %output.key, error = %err, "failed to delete partial output");
        }
    }

    /// Runs a CONCAT or MERGE export step and returns the object it wrote.
    pub async fn export(&self, action: &ExportAction) -> Result<ExportOutput, ExportError> {
        let name = action.name();
        let request = match action {
            ExportAction::Concat(request) | ExportAction::Merge(request) => request,
        };
        if request.s3_objects.is_empty() {
            return Err(ExportError::NoInputs(name));
        }
        info!(action = name, objects = request.s3_objects.len(), "running export step");

        let result = match action {
            ExportAction::Concat(request) => self.concat(request).await,
            ExportAction::Merge(request) => self.merge(request).await,
        };
        match &result {
            Ok(output) => info!(action = name, uri = %output.s3_object, "export step finished"),
            Err(err) => error!(action = name, error = %err, "export step failed"),
        }
        result
    }

    async fn concat(&self, request: &ExportRequest) -> Result<ExportOutput, ExportError> {
        let output = StorageLocation::new(
            &request.output_bucket,
            format!("{}{}", CONCAT_PREFIX, Uuid::new_v4()),
        );

        if request.is_mpegts_container() {
            info!(key = %output.key, "appending transport stream objects");
            let written = self.append_objects(&request.s3_objects, &output).await?;
            debug!(key = %output.key, bytes = written, "append finished");
        } else {
            info!(key = %output.key, "concatenating with the transcoder");
            let staged = self.stage(&request.s3_objects).await?;
            let joined = format!("concat:{}", staged.inputs.join("|"));
            self.transcode_staged(&request.ffmpeg, vec!["-i".into(), joined], &staged, &output)
                .await?;
        }
        Ok(ExportOutput { s3_object: output })
    }

    async fn merge(&self, request: &ExportRequest) -> Result<ExportOutput, ExportError> {
        if let [object] = request.s3_objects.as_slice() {
            if request.ffmpeg.command.option("-f").as_deref() == Some("mpegts") {
                let target = StorageLocation::new(
                    &object.bucket,
                    object.key.replace(CONCAT_PREFIX, EXPORT_PREFIX),
                );
                if target.key != object.key {
                    info!(from = %object, to = %target, "single transport stream input, moving it");
                    self.storage.copy(object, &target).await?;
                    self.storage.delete(object).await?;
                }
                return Ok(ExportOutput { s3_object: target });
            }
        }

        let output = StorageLocation::new(
            &request.output_bucket,
            format!("{}{}", EXPORT_PREFIX, Uuid::new_v4()),
        );
        let staged = self.stage(&request.s3_objects).await?;
        let inputs = staged
            .inputs
            .iter()
            .flat_map(|path| ["-i".to_string(), path.clone()])
            .collect();
        self.transcode_staged(&request.ffmpeg, inputs, &staged, &output)
            .await?;

        // Inputs are intermediate concat results, dropped once merged.
        try_join_all(
            request
                .s3_objects
                .iter()
                .map(|object| self.storage.delete(object)),
        )
        .await?;
        Ok(ExportOutput { s3_object: output })
    }

    /// Streams `objects` one after another into a single upload.
    async fn append_objects(
        &self,
        objects: &[StorageLocation],
        output: &StorageLocation,
    ) -> Result<u64, ExportError> {
        let (mut writer, reader) = tokio::io::duplex(APPEND_BUFFER);
        let feed = async move {
            for object in objects {
                debug!(source = %object, "appending object");
                let mut body = self.storage.open(object).await?;
                tokio::io::copy(&mut body, &mut writer).await?;
            }
            writer.shutdown().await?;
            Ok::<_, StorageError>(())
        };

        let (uploaded, fed) = tokio::join!(self.storage.put_stream(output, Box::pin(reader)), feed);
        let written = uploaded?;
        if let Err(err) = fed {
            self.discard(output).await;
            return Err(err.into());
        }
        Ok(written)
    }

    /// Downloads `objects` side by side into a scratch directory.
    async fn stage(&self, objects: &[StorageLocation]) -> Result<Staged, ExportError> {
        let dir = TempDir::new()?;
        let downloads = objects.iter().enumerate().map(|(n, object)| {
            let name = object.key.rsplit('/').next().unwrap_or_default();
            let path = dir.path().join(format!("{}-{}", n, name));
            async move {
                debug!(source = %object, path = %path.display(), "staging object");
                let mut body = self.storage.open(object).await?;
                let mut file = tokio::fs::File::create(&path).await?;
                tokio::io::copy(&mut body, &mut file).await?;
                file.flush().await?;
                Ok::<_, StorageError>(path.to_string_lossy().into_owned())
            }
        });
        let inputs = try_join_all(downloads).await?;
        Ok(Staged { dir, inputs })
    }

    async fn transcode_staged(
        &self,
        ffmpeg: &ExportFfmpeg,
        inputs: Vec<String>,
        staged: &Staged,
        output: &StorageLocation,
    ) -> Result<u64, ExportError> {
        let path = staged.dir.path().join("output");
        let report = self
            .transcoder
            .run(ffmpeg.file_args(inputs, &path.to_string_lossy()))
            .await?;
        debug!(stderr = %report.stderr, "transcoder finished");

        let file = tokio::fs::File::open(&path).await?;
        let written = self.storage.put_stream(output, Box::pin(file)).await?;
        debug!(key = %output.key, bytes = written, "uploaded export output");
        Ok(written)
    }

    /// Processes queue messages in order and returns the ids of those
    /// that failed, so only they are redelivered.
    pub async fn process_batch<I>(&self, messages: I) -> Vec<String>
    where
        I: IntoIterator<Item = (String, Option<String>)>,
    {
        let mut failed = Vec::new();
        for (message_id, body) in messages {
            let result = match body {
                Some(body) => self.handle_message(&body).await.map(|_| ()),
                None => Err(WorkerError::EmptyMessage(message_id.clone())),
            };
            if let Err(err) = result {
                error!(message_id = %message_id, error = %err, "transform request failed");
                failed.push(message_id);
            }
        }
        failed
    }

    /// Long-polls `queue` until `shutdown` is cancelled. Messages are only
    /// deleted after they were processed successfully.
    pub async fn run_polling_loop<Q: RequestQueue>(&self, queue: &Q, shutdown: CancellationToken) {
        info!("worker started, polling for transform requests");
        loop {
            let received = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                received = queue.receive(POLL_WAIT_SECS) => received,
            };
            match received {
                Ok(deliveries) => {
                    for delivery in deliveries {
                        match self.handle_message(&delivery.body).await {
                            Ok(_) => {
                                if let Err(err) = queue.acknowledge(&delivery.receipt).await {
                                    error!(error = %err, "failed to delete processed message");
                                }
                            }
                            Err(err) => {
                                error!(error = %err, "transform request failed, leaving it for redelivery")
                            }
                        }
                    }
                }
                Err(err) => {
                    error!(error = %err, "queue error");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
        info!("worker stopped");
    }
}

/// Downloaded inputs; removed from disk when dropped.
struct Staged {
    dir: TempDir,
    inputs: Vec<String>,
}

use crate::domain::jobs::FfmpegSpec;
use crate::ports::storage::ByteReader;
use futures::future::BoxFuture;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TranscodeError {
    #[error("failed to start transcoder: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("transcoder exited with status {code:?}: {stderr}")]
    Exit { code: Option<i32>, stderr: String },
    /// Reading the input stream failed before it was fully handed over.
    #[error("transcoder input failed: {0}")]
    Input(#[source] std::io::Error),
    #[error("transcoder io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TranscodeReport {
    /// `None` when the transcoder closed its input before the end.
    pub bytes_in: Option<u64>,
    pub stderr: String,
}

/// A running transcode. `output` must be drained concurrently with
/// `completion`, which resolves once the process has exited.
pub struct TranscodeSession {
    pub output: ByteReader,
    pub completion: BoxFuture<'static, Result<TranscodeReport, TranscodeError>>,
}

#[cfg_attr(test, mockall::automock)]
pub trait Transcoder: Send + Sync {
    /// Start transcoding `input` according to `spec`
    fn start(&self, input: ByteReader, spec: &FfmpegSpec)
        -> Result<TranscodeSession, TranscodeError>;

    /// Run the transcoder over files on disk with a complete argument list.
    /// Stdin is closed and stdout discarded; the output path is part of `args`.
    fn run(&self, args: Vec<String>) -> BoxFuture<'static, Result<TranscodeReport, TranscodeError>>;
}

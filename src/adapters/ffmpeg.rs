use crate::domain::jobs::FfmpegSpec;
use crate::ports::storage::ByteReader;
use crate::ports::transcoder::{TranscodeError, TranscodeReport, TranscodeSession, Transcoder};
use futures::future::BoxFuture;
use std::io;
use std::process::Stdio;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::debug;

/// Runs the `ffmpeg` CLI with stdin and stdout as pipes.
#[derive(Clone, Debug)]
pub struct FfmpegTranscoder {
    binary: String,
}

impl FfmpegTranscoder {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl Default for FfmpegTranscoder {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

impl Transcoder for FfmpegTranscoder {
    fn start(
        &self,
        mut input: ByteReader,
        spec: &FfmpegSpec,
    ) -> Result<TranscodeSession, TranscodeError> {
        let args = spec.pipe_args();
        debug!(binary = %self.binary, ?args, "starting transcoder");

        let mut child = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(TranscodeError::Spawn)?;

        let (Some(mut stdin), Some(stdout), Some(mut stderr)) =
            (child.stdin.take(), child.stdout.take(), child.stderr.take())
        else {
            return Err(TranscodeError::Io(io::Error::other("transcoder pipes unavailable")));
        };

        // Closing stdin once the input is exhausted is what lets ffmpeg finish.
        let feeder = tokio::spawn(async move {
            let copied = tokio::io::copy(&mut input, &mut stdin).await;
            drop(stdin);
            copied
        });
        let collector = tokio::spawn(async move {
            let mut captured = Vec::new();
            stderr.read_to_end(&mut captured).await.map(|_| captured)
        });

        let completion = async move {
            let status = child.wait().await?;

            let bytes_in = match feeder.await.map_err(io::Error::other)? {
                Ok(copied) => Some(copied),
                // ffmpeg may stop reading once it has what it needs.
                Err(err) if err.kind() == io::ErrorKind::BrokenPipe => None,
                Err(err) => return Err(TranscodeError::Input(err)),
            };
            let captured = collector.await.map_err(io::Error::other)??;
            let stderr = String::from_utf8_lossy(&captured).into_owned();

            if !status.success() {
                return Err(TranscodeError::Exit {
                    code: status.code(),
                    stderr,
                });
            }
            Ok(TranscodeReport { bytes_in, stderr })
        };

        Ok(TranscodeSession {
            output: Box::pin(stdout),
            completion: Box::pin(completion),
        })
    }

    fn run(&self, args: Vec<String>) -> BoxFuture<'static, Result<TranscodeReport, TranscodeError>> {
        debug!(binary = %self.binary, ?args, "running transcoder");
        let mut command = Command::new(&self.binary);
        command.args(&args).kill_on_drop(true);

        Box::pin(async move {
            let output = command.output().await.map_err(TranscodeError::Spawn)?;
            let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
            if !output.status.success() {
                return Err(TranscodeError::Exit {
                    code: output.status.code(),
                    stderr,
                });
            }
            Ok(TranscodeReport {
                bytes_in: None,
                stderr,
            })
        })
    }
}

//! Transform Worker Binary
//!
//! Streams TAMS segments through ffmpeg and publishes the results for ingest.
//! Runs as a Lambda function when `AWS_LAMBDA_RUNTIME_API` is set, taking
//! SQS batches as well as direct CONCAT/MERGE export invocations, and
//! otherwise long-polls `FFMPEG_QUEUE_URL` until interrupted.
//!
//! Environment Variables:
//! - INGEST_QUEUE_URL: SQS queue URL for completion messages
//! - FFMPEG_QUEUE_URL: SQS queue URL for transform requests (polling mode)
//! - FFMPEG_BIN: ffmpeg executable (default `ffmpeg`)
//! - TRANSCODE_FAILURE_POLICY: `fail` (default) or `best-effort`

use aws_config::BehaviorVersion;
use lambda_runtime::{run, service_fn, Error, LambdaEvent};
use serde_json::Value;
use std::sync::Arc;
use tams_tools::adapters::aws::{lambda::handle_invocation, s3::S3Adapter, sqs::SqsAdapter};
use tams_tools::adapters::ffmpeg::FfmpegTranscoder;
use tams_tools::application::worker::TransformWorker;
use tams_tools::WorkerConfig;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = WorkerConfig::from_env()?;

    // Load AWS config
    let aws = aws_config::load_defaults(BehaviorVersion::latest()).await;
    let sqs_client = aws_sdk_sqs::Client::new(&aws);

    let worker = Arc::new(
        TransformWorker::new(
            S3Adapter::new(aws_sdk_s3::Client::new(&aws)),
            FfmpegTranscoder::new(&config.ffmpeg_bin),
            SqsAdapter::new(sqs_client.clone(), config.ingest_queue_url.clone()),
        )
        .with_policy(config.failure_policy),
    );

    if std::env::var("AWS_LAMBDA_RUNTIME_API").is_ok() {
        return run(service_fn(move |event: LambdaEvent<Value>| {
            let worker = worker.clone();
            async move { Ok::<_, Error>(handle_invocation(&*worker, event.payload).await?) }
        }))
        .await;
    }

    let queue_url = config
        .ffmpeg_queue_url
        .ok_or("FFMPEG_QUEUE_URL env var required outside Lambda")?;
    let queue = SqsAdapter::new(sqs_client, queue_url);

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, finishing current message");
            signal.cancel();
        }
    });

    worker.run_polling_loop(&queue, shutdown).await;
    Ok(())
}

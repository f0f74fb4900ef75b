use crate::application::worker::{ExportError, TransformWorker};
use crate::domain::jobs::ExportAction;
use crate::ports::queue::CompletionPublisher;
use crate::ports::storage::ObjectStore;
use crate::ports::transcoder::Transcoder;
use aws_lambda_events::sqs::{BatchItemFailure, SqsBatchResponse, SqsEvent};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InvocationError {
    #[error("invalid invocation payload: {0}")]
    Payload(#[from] serde_json::Error),
    #[error("payload is neither an SQS event nor an export action")]
    Unrecognised,
    #[error(transparent)]
    Export(#[from] ExportError),
}

/// Entry point for every invocation: SQS batches carry `Records`, direct
/// export steps carry an `action`.
pub async fn handle_invocation<S, T, P>(
    worker: &TransformWorker<S, T, P>,
    payload: Value,
) -> Result<Value, InvocationError>
where
    S: ObjectStore,
    T: Transcoder,
    P: CompletionPublisher,
{
    if payload.get("Records").is_some() {
        let event: SqsEvent = serde_json::from_value(payload)?;
        let response = handle_sqs_event(worker, event).await;
        return Ok(serde_json::to_value(response)?);
    }
    if payload.get("action").is_some() {
        let action: ExportAction = serde_json::from_value(payload)?;
        let output = worker.export(&action).await?;
        return Ok(serde_json::to_value(output)?);
    }
    Err(InvocationError::Unrecognised)
}

/// Runs every record of an SQS-triggered invocation and reports the
/// failed ones, so the queue redelivers only those.
pub async fn handle_sqs_event<S, T, P>(
    worker: &TransformWorker<S, T, P>,
    event: SqsEvent,
) -> SqsBatchResponse
where
    S: ObjectStore,
    T: Transcoder,
    P: CompletionPublisher,
{
    let messages = event
        .records
        .into_iter()
        .map(|record| (record.message_id.unwrap_or_default(), record.body));
    let failed = worker.process_batch(messages).await;

    let mut response = SqsBatchResponse::default();
    response.batch_item_failures = failed
        .into_iter()
        .map(|message_id| {
            let mut failure = BatchItemFailure::default();
            failure.item_identifier = message_id;
            failure
        })
        .collect();
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::testing::MemoryStore;
    use crate::ports::queue::MockCompletionPublisher;
    use crate::ports::storage::MockObjectStore;
    use crate::ports::transcoder::MockTranscoder;
    use aws_lambda_events::sqs::SqsMessage;
    use serde_json::json;

    fn message(id: &str, body: &str) -> SqsMessage {
        let mut message = SqsMessage::default();
        message.message_id = Some(id.to_string());
        message.body = Some(body.to_string());
        message
    }

    #[tokio::test]
    async fn test_undecodable_records_are_reported() {
        let worker = TransformWorker::new(
            MockObjectStore::new(),
            MockTranscoder::new(),
            MockCompletionPublisher::new(),
        );
        let empty_request = r#"{"segments": [], "outputPrefix": "p/", "outputBucket": "b",
            "destinationFlow": "f", "ffmpeg": {"command": [], "outputFormat": "mp4"}}"#;

        let mut event = SqsEvent::default();
        event.records = vec![message("ok", empty_request), message("bad", "{")];

        let response = handle_sqs_event(&worker, event).await;
        let failed: Vec<_> = response
            .batch_item_failures
            .iter()
            .map(|failure| failure.item_identifier.as_str())
            .collect();
        assert_eq!(failed, vec!["bad"]);
    }

    #[tokio::test]
    async fn test_invocation_dispatches_records_and_actions() {
        let store = MemoryStore::default()
            .with("media", "a.ts", b"a")
            .with("media", "b.ts", b"b");
        let worker = TransformWorker::new(store, MockTranscoder::new(), MockCompletionPublisher::new());

        let mut event = SqsEvent::default();
        event.records = vec![message("bad", "{")];
        let response = handle_invocation(&worker, serde_json::to_value(event).unwrap())
            .await
            .unwrap();
        assert_eq!(response["batchItemFailures"][0]["itemIdentifier"], "bad");

        let concat = json!({
            "action": "CONCAT",
            "s3Objects": [{"bucket": "media", "key": "a.ts"}, {"bucket": "media", "key": "b.ts"}],
            "outputBucket": "media",
            "flowContainer": "video/mp2t",
            "ffmpeg": {"command": {}}
        });
        let output = handle_invocation(&worker, concat).await.unwrap();
        let key = output["s3Object"]["key"].as_str().unwrap();
        assert!(key.starts_with("concat/"));
        assert_eq!(output["s3Object"]["bucket"], "media");
    }

    #[tokio::test]
    async fn test_unknown_invocations_are_errors() {
        let worker = TransformWorker::new(
            MockObjectStore::new(),
            MockTranscoder::new(),
            MockCompletionPublisher::new(),
        );

        let unknown_action = handle_invocation(&worker, json!({"action": "SPLIT"})).await;
        assert!(matches!(unknown_action, Err(InvocationError::Payload(_))));

        let neither = handle_invocation(&worker, json!({"detail": {}})).await;
        assert!(matches!(neither, Err(InvocationError::Unrecognised)));
    }
}

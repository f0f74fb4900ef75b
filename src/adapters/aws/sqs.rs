use crate::domain::jobs::CompletionMessage;
use crate::ports::queue::{CompletionPublisher, Delivery, QueueError, RequestQueue};
use async_trait::async_trait;
use aws_sdk_sqs::error::DisplayErrorContext;
use aws_sdk_sqs::types::Message;
use aws_sdk_sqs::Client;
use tracing::warn;

/// SqsAdapter implements both queue ports for one SQS queue.
#[derive(Clone)]
pub struct SqsAdapter {
    client: Client,
    queue_url: String,
}

impl SqsAdapter {
    pub fn new(client: Client, queue_url: String) -> Self {
        Self { client, queue_url }
    }
}

#[async_trait]
impl CompletionPublisher for SqsAdapter {
    async fn publish(&self, message: &CompletionMessage) -> Result<(), QueueError> {
        let message_body = serde_json::to_string(message)?;
        self.client
            .send_message()
            .queue_url(&self.queue_url)
            .message_body(message_body)
            .send()
            .await
            .map_err(backend)?;
        Ok(())
    }
}

#[async_trait]
impl RequestQueue for SqsAdapter {
    async fn receive(&self, wait_secs: i32) -> Result<Vec<Delivery>, QueueError> {
        let resp = self
            .client
            .receive_message()
            .queue_url(&self.queue_url)
            .max_number_of_messages(1)
            .wait_time_seconds(wait_secs)
            .send()
            .await
            .map_err(backend)?;

        Ok(resp
            .messages
            .unwrap_or_default()
            .into_iter()
            .filter_map(delivery)
            .collect())
    }

    async fn acknowledge(&self, receipt: &str) -> Result<(), QueueError> {
        self.client
            .delete_message()
            .queue_url(&self.queue_url)
            .receipt_handle(receipt)
            .send()
            .await
            .map_err(backend)?;
        Ok(())
    }
}

/// Messages without a receipt handle or a body cannot be processed or
/// deleted; they are skipped and left to the queue's redrive policy.
fn delivery(message: Message) -> Option<Delivery> {
    match (message.receipt_handle, message.body) {
        (Some(receipt), Some(body)) => Some(Delivery { receipt, body }),
        (receipt, body) => {
            warn!(
                message_id = message.message_id.as_deref().unwrap_or("unknown"),
                has_receipt = receipt.is_some(),
                has_body = body.is_some(),
                "skipping incomplete SQS message"
            );
            None
        }
    }
}

fn backend<E: std::error::Error>(err: E) -> QueueError {
    QueueError::Backend(DisplayErrorContext(err).to_string())
}

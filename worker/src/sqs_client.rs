use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_sqs::error::DisplayErrorContext;
use aws_sdk_sqs::operation::receive_message::ReceiveMessageOutput;
use aws_sdk_sqs::types::MessageSystemAttributeName;
use serverless_bridge::common::queue::{Publisher, QueueMessage, SqsPublisher};
use tracing::{debug, warn};

use crate::errors::{ReceiveError, SettleError};
use crate::subscriber::Settlement;

const MAX_MESSAGES_PER_RECEIVE: usize = 10;
const LONG_POLL_SECONDS: i32 = 20;
/// SQS caps the visibility timeout at 12 hours.
const MAX_VISIBILITY_TIMEOUT_SECONDS: u64 = 43_200;

/// SQS access for a single source queue and its dead-letter queue.
#[derive(Clone)]
pub struct SqsClient {
    client: aws_sdk_sqs::Client,
    queue_url: String,
    dead_letter_queue_url: String,
    dead_letter: SqsPublisher,
}

impl SqsClient {
    pub fn new(
        client: aws_sdk_sqs::Client,
        queue_url: impl Into<String>,
        dead_letter_queue_url: impl Into<String>,
    ) -> Self {
        Self {
            dead_letter: SqsPublisher::new(client.clone()),
            client,
            queue_url: queue_url.into(),
            dead_letter_queue_url: dead_letter_queue_url.into(),
        }
    }

    pub fn queue_url(&self) -> &str {
        &self.queue_url
    }

    /// Long-polls for up to `max_messages` deliveries; SQS returns at most ten per call.
    pub async fn receive_message(
        &self,
        max_messages: usize,
    ) -> Result<ReceiveMessageOutput, ReceiveError> {
        let batch = max_messages.clamp(1, MAX_MESSAGES_PER_RECEIVE) as i32;
        self.client
            .receive_message()
            .queue_url(&self.queue_url)
            .max_number_of_messages(batch)
            .wait_time_seconds(LONG_POLL_SECONDS)
            .message_system_attribute_names(MessageSystemAttributeName::ApproximateReceiveCount)
            .send()
            .await
    }

    pub async fn delete_message(
        &self,
        receipt_handle: impl Into<String>,
    ) -> Result<(), SettleError> {
        self.client
            .delete_message()
            .queue_url(&self.queue_url)
            .receipt_handle(receipt_handle)
            .send()
            .await
            .map_err(|err| SettleError::Delete(DisplayErrorContext(err).to_string()))?;

        Ok(())
    }
}

#[async_trait]
impl Settlement for SqsClient {
    async fn acknowledge(&self, message: &QueueMessage) -> Result<(), SettleError> {
        self.delete_message(message.receipt_handle.clone()).await?;
        debug!(message_id = %message.message_id, "message deleted");
        Ok(())
    }

    async fn redeliver_after(
        &self,
        message: &QueueMessage,
        delay: Duration,
    ) -> Result<(), SettleError> {
        let seconds = delay.as_secs().min(MAX_VISIBILITY_TIMEOUT_SECONDS) as i32;

        self.client
            .change_message_visibility()
            .queue_url(&self.queue_url)
            .receipt_handle(&message.receipt_handle)
            .visibility_timeout(seconds)
            .send()
            .await
            .map_err(|err| SettleError::ChangeVisibility(DisplayErrorContext(err).to_string()))?;

        debug!(message_id = %message.message_id, seconds, "message hidden until retry");
        Ok(())
    }

    async fn dead_letter(&self, message: &QueueMessage, reason: &str) -> Result<(), SettleError> {
        let dead_letter_id = self
            .dead_letter
            .publish(&self.dead_letter_queue_url, message.body.clone())
            .await?;

        warn!(
            message_id = %message.message_id,
            dead_letter_id = %dead_letter_id,
            reason,
            "message moved to dead-letter queue"
        );

        self.delete_message(message.receipt_handle.clone()).await
    }
}

use std::fmt;

use async_trait::async_trait;
use aws_sdk_sqs::error::DisplayErrorContext;
use tracing::{info, instrument};

use crate::common::errors::PublishError;

/// Broker-assigned id of a published message.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MessageId(pub String);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A delivered message together with what is needed to settle it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueMessage {
    pub message_id: MessageId,
    pub body: String,
    /// Opaque token used to acknowledge or delay this particular delivery.
    pub receipt_handle: String,
    /// 1-based delivery count.
    pub attempt: u32,
}

#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Enqueue `payload` on `destination`. Returns once the broker has stored the message.
    async fn publish(&self, destination: &str, payload: String) -> Result<MessageId, PublishError>;
}

#[derive(Clone)]
pub struct SqsPublisher {
    client: aws_sdk_sqs::Client,
}

impl SqsPublisher {
    pub fn new(client: aws_sdk_sqs::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Publisher for SqsPublisher {
    #[instrument(skip(self, payload), fields(payload_size = payload.len()))]
    async fn publish(&self, destination: &str, payload: String) -> Result<MessageId, PublishError> {
        let output = self
            .client
            .send_message()
            .queue_url(destination)
            .message_body(payload)
            .send()
            .await
            .map_err(|err| PublishError::new(destination, DisplayErrorContext(err)))?;

        let message_id = output
            .message_id
            .map(MessageId)
            .ok_or_else(|| PublishError::new(destination, "broker returned no message id"))?;

        info!(message_id = %message_id, "message sent to sqs");
        Ok(message_id)
    }
}

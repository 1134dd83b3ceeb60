use aws_sdk_sqs::config::http::HttpResponse;
use aws_sdk_sqs::error::SdkError;
use aws_sdk_sqs::operation::receive_message::ReceiveMessageError;
use serverless_bridge::common::errors::PublishError;
use thiserror::Error;

pub type ReceiveError = SdkError<ReceiveMessageError, HttpResponse>;

/// Failure to acknowledge, delay or dead-letter a delivery.
#[derive(Debug, Error)]
pub enum SettleError {
    #[error("failed to delete message: {0}")]
    Delete(String),

    #[error("failed to change message visibility: {0}")]
    ChangeVisibility(String),

    #[error("failed to dead-letter message: {0}")]
    DeadLetter(#[from] PublishError),
}

/// How a handler failed. Drives what happens to the delivery.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// Worth another delivery after a backoff.
    #[error("transient failure: {0}")]
    Transient(String),

    /// Retrying cannot help; the message goes to the dead-letter queue.
    #[error("permanent failure: {0}")]
    Permanent(String),
}

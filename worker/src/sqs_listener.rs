use async_channel::{Receiver, Sender};
use aws_sdk_sqs::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_sqs::types::{Message, MessageSystemAttributeName};
use serverless_bridge::common::queue::{MessageId, QueueMessage};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::errors::ReceiveError;
use crate::sqs_client::SqsClient;

/// Error codes that mean the queue or the credentials are wrong.
const FATAL_RECEIVE_CODES: [&str; 10] = [
    "QueueDoesNotExist",
    "AWS.SimpleQueueService.NonExistentQueue",
    "AccessDenied",
    "AccessDeniedException",
    "InvalidClientTokenId",
    "UnrecognizedClientException",
    "SignatureDoesNotMatch",
    "MissingAuthenticationToken",
    "InvalidSecurity",
    "InvalidAddress",
];
const MIN_RECEIVE_BACKOFF: Duration = Duration::from_millis(100);
const MAX_RECEIVE_BACKOFF: Duration = Duration::from_secs(30);

/// Long-polls one queue and hands the deliveries out over a bounded channel.
///
/// Clones share the channel, so any number of tasks can pull deliveries from it. The
/// channel holds at most `capacity` deliveries and each receive asks for no more than that.
#[derive(Clone)]
pub struct SqsListener {
    receiver: Receiver<QueueMessage>,
}

impl SqsListener {
    pub fn new(
        client: SqsClient,
        poll_interval: Duration,
        capacity: usize,
    ) -> (Self, JoinHandle<Result<(), ReceiveError>>) {
        let (sender, receiver) = async_channel::bounded(capacity.max(1));
        let handle = tokio::spawn(Self::listen(client, sender, poll_interval));

        (Self { receiver }, handle)
    }

    async fn listen(
        client: SqsClient,
        sender: Sender<QueueMessage>,
        poll_interval: Duration,
    ) -> Result<(), ReceiveError> {
        info!(queue_url = client.queue_url(), "listening for messages");
        let batch = sender.capacity().unwrap_or(1);
        let mut failures = 0u32;

        loop {
            if sender.is_closed() {
                return Ok(());
            }

            let response = match client.receive_message(batch).await {
                Ok(response) => {
                    failures = 0;
                    response
                }
                Err(err) if is_fatal(&err) => {
                    error!(error = %DisplayErrorContext(&err), "receive rejected, stopping");
                    return Err(err);
                }
                Err(err) => {
                    let delay = receive_backoff(poll_interval, failures);
                    failures = failures.saturating_add(1);
                    warn!(
                        error = %DisplayErrorContext(&err),
                        retry_in_ms = delay.as_millis() as u64,
                        "receive failed, retrying"
                    );
                    sleep(delay).await;
                    continue;
                }
            };

            let messages = response.messages.unwrap_or_default();
            debug!(count = messages.len(), "received messages");

            for message in messages {
                let Some(message) = into_queue_message(message) else {
                    continue;
                };
                if sender.send(message).await.is_err() {
                    return Ok(());
                }
            }

            sleep(poll_interval).await;
        }
    }

    pub fn deliveries(&self) -> Receiver<QueueMessage> {
        self.receiver.clone()
    }

    /// Stops the listener. Deliveries already in the channel can still be received.
    pub fn close(&self) {
        self.receiver.close();
    }
}

fn is_fatal(err: &ReceiveError) -> bool {
    match err {
        SdkError::ConstructionFailure(_) => true,
        SdkError::ServiceError(service) => is_fatal_code(service.err().code()),
        _ => false,
    }
}

fn is_fatal_code(code: Option<&str>) -> bool {
    code.is_some_and(|code| FATAL_RECEIVE_CODES.contains(&code))
}

/// Pause after `failures` consecutive failed receives: the poll interval doubled per failure.
fn receive_backoff(poll_interval: Duration, failures: u32) -> Duration {
    poll_interval
        .max(MIN_RECEIVE_BACKOFF)
        .checked_mul(1u32 << failures.min(16))
        .map_or(MAX_RECEIVE_BACKOFF, |delay| delay.min(MAX_RECEIVE_BACKOFF))
}

/// Deliveries that cannot be settled or decoded are skipped and left to redelivery.
fn into_queue_message(message: Message) -> Option<QueueMessage> {
    let message_id = MessageId(message.message_id.unwrap_or_default());

    let Some(receipt_handle) = message.receipt_handle else {
        warn!(message_id = %message_id, "message has no receipt handle, skipping");
        return None;
    };
    let Some(body) = message.body else {
        warn!(message_id = %message_id, "message has no body, skipping");
        return None;
    };

    let attempt = message
        .attributes
        .as_ref()
        .and_then(|attributes| {
            attributes.get(&MessageSystemAttributeName::ApproximateReceiveCount)
        })
        .and_then(|count| count.parse().ok())
        .unwrap_or(1);

    Some(QueueMessage {
        message_id,
        body,
        receipt_handle,
        attempt,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serverless_bridge::common::testing::FakeAwsEndpoint;

    const INTERNAL_ERROR: &str = r#"{"__type":"com.amazonaws.sqs#InternalError"}"#;
    const QUEUE_MISSING: &str =
        r#"{"__type":"com.amazonaws.sqs#QueueDoesNotExist","message":"no such queue"}"#;

    fn sqs_client(endpoint: &FakeAwsEndpoint) -> SqsClient {
        SqsClient::new(
            endpoint.sqs_client(),
            format!("{}/000000000000/queue3", endpoint.url()),
            format!("{}/000000000000/queue3-dlq", endpoint.url()),
        )
    }

    async fn wait_for_requests(endpoint: &FakeAwsEndpoint, count: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while endpoint.requests().len() < count {
                sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .unwrap();
    }

    #[test]
    fn only_rejections_of_queue_or_identity_are_fatal() {
        assert!(is_fatal_code(Some("QueueDoesNotExist")));
        assert!(is_fatal_code(Some("AWS.SimpleQueueService.NonExistentQueue")));
        assert!(is_fatal_code(Some("AccessDenied")));
        assert!(is_fatal_code(Some("InvalidClientTokenId")));

        assert!(!is_fatal_code(Some("InternalError")));
        assert!(!is_fatal_code(Some("ServiceUnavailable")));
        assert!(!is_fatal_code(Some("ThrottlingException")));
        assert!(!is_fatal_code(Some("RequestThrottled")));
        assert!(!is_fatal_code(None));
    }

    #[test]
    fn receive_backoff_doubles_until_capped() {
        let interval = Duration::from_secs(1);

        assert_eq!(receive_backoff(interval, 0), Duration::from_secs(1));
        assert_eq!(receive_backoff(interval, 1), Duration::from_secs(2));
        assert_eq!(receive_backoff(interval, 3), Duration::from_secs(8));
        assert_eq!(receive_backoff(interval, 10), MAX_RECEIVE_BACKOFF);
        assert_eq!(receive_backoff(interval, u32::MAX), MAX_RECEIVE_BACKOFF);
        assert_eq!(receive_backoff(Duration::ZERO, 0), MIN_RECEIVE_BACKOFF);
    }

    #[tokio::test]
    async fn keeps_polling_through_server_errors() {
        let endpoint = FakeAwsEndpoint::start(500, INTERNAL_ERROR).await.unwrap();
        let (listener, handle) = SqsListener::new(sqs_client(&endpoint), Duration::ZERO, 4);

        wait_for_requests(&endpoint, 3).await;

        assert!(!handle.is_finished());
        listener.close();
        handle.abort();
    }

    #[tokio::test]
    async fn stops_when_queue_does_not_exist() {
        let endpoint = FakeAwsEndpoint::start(400, QUEUE_MISSING).await.unwrap();
        let (_listener, handle) = SqsListener::new(sqs_client(&endpoint), Duration::ZERO, 4);

        let result = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();

        assert!(result.is_err());
        assert_eq!(endpoint.requests().len(), 1);
    }

    #[tokio::test]
    async fn channel_is_bounded_by_capacity() {
        let endpoint = FakeAwsEndpoint::start(500, INTERNAL_ERROR).await.unwrap();
        let (listener, handle) = SqsListener::new(sqs_client(&endpoint), Duration::ZERO, 4);

        assert_eq!(listener.deliveries().capacity(), Some(4));

        listener.close();
        handle.abort();
    }

    #[tokio::test]
    async fn receive_asks_for_no_more_than_capacity() {
        let endpoint = FakeAwsEndpoint::start(500, INTERNAL_ERROR).await.unwrap();
        let (listener, handle) = SqsListener::new(sqs_client(&endpoint), Duration::ZERO, 4);

        wait_for_requests(&endpoint, 1).await;
        listener.close();
        handle.abort();

        assert!(endpoint.requests()[0].contains(r#""MaxNumberOfMessages":4"#));
    }

    #[test]
    fn converts_sqs_message() {
        let message = Message::builder()
            .message_id("m-1")
            .receipt_handle("r-1")
            .body(r#"{"Id":"11111111-1111-1111-1111-111111111111","PartValue":"foo"}"#)
            .attributes(MessageSystemAttributeName::ApproximateReceiveCount, "3")
            .build();

        let message = into_queue_message(message).unwrap();

        assert_eq!(message.message_id, MessageId("m-1".into()));
        assert_eq!(message.receipt_handle, "r-1");
        assert_eq!(message.attempt, 3);
    }

    #[test]
    fn first_delivery_when_count_missing() {
        let message = Message::builder()
            .message_id("m-1")
            .receipt_handle("r-1")
            .body("Alice")
            .build();

        assert_eq!(into_queue_message(message).unwrap().attempt, 1);
    }

    #[test]
    fn skips_message_without_receipt_handle() {
        let message = Message::builder().message_id("m-1").body("Alice").build();

        assert!(into_queue_message(message).is_none());
    }

    #[test]
    fn skips_message_without_body() {
        let message = Message::builder().message_id("m-1").receipt_handle("r-1").build();

        assert!(into_queue_message(message).is_none());
    }
}

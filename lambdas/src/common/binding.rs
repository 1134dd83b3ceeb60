use std::sync::Arc;

use lambda_http::http::StatusCode;
use lambda_http::{Request, Response};
use tracing::{error, info, warn};

use crate::common::errors::Error;
use crate::common::queue::Publisher;
use crate::common::utils::{ensure_method, publish_failed, text_response};

/// Wraps a plain request handler and publishes whatever it returns.
///
/// A handler returning `Ok(Some(value))` gets `value` enqueued on `destination` and echoed back
/// with a 200. `Ok(None)` is a null result: nothing is enqueued and the response is an empty 200.
/// Handler errors are returned untouched and nothing is published.
pub struct QueueOutput<H> {
    handler: H,
    publisher: Arc<dyn Publisher>,
    destination: String,
}

impl<H> QueueOutput<H>
where
    H: Fn(&Request) -> Result<Option<String>, Error> + Send + Sync,
{
    pub fn new(handler: H, publisher: Arc<dyn Publisher>, destination: impl Into<String>) -> Self {
        Self {
            handler,
            publisher,
            destination: destination.into(),
        }
    }

    pub async fn invoke(&self, request: Request) -> Result<Response<String>, Error> {
        ensure_method(&request)?;

        let Some(value) = (self.handler)(&request)? else {
            warn!("handler returned no value, nothing enqueued");
            return text_response(StatusCode::OK, String::new());
        };

        match self.publisher.publish(&self.destination, value.clone()).await {
            Ok(message_id) => {
                info!(message_id = %message_id, "handler result enqueued");
                text_response(StatusCode::OK, value)
            }
            Err(err) => {
                error!(error = %err, "failed to enqueue handler result");
                Err(publish_failed())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::errors::PublishError;
    use crate::common::ingress::pass_through_name;
    use crate::common::queue::{MessageId, MockPublisher};
    use crate::common::utils::test_request;

    const DESTINATION: &str = "https://sqs.local/queue1";

    #[tokio::test]
    async fn publishes_and_echoes_handler_result() {
        let mut publisher = MockPublisher::new();
        publisher
            .expect_publish()
            .withf(|destination, payload| destination == DESTINATION && payload == "Alice")
            .times(1)
            .returning(|_, _| Ok(MessageId("m-1".into())));

        let binding = QueueOutput::new(pass_through_name, Arc::new(publisher), DESTINATION);
        let response = binding.invoke(test_request("GET", Some("Alice"))).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.body(), "Alice");
    }

    #[tokio::test]
    async fn null_result_is_not_published() {
        let mut publisher = MockPublisher::new();
        publisher.expect_publish().never();

        let binding = QueueOutput::new(pass_through_name, Arc::new(publisher), DESTINATION);
        let response = binding.invoke(test_request("POST", None)).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.body().is_empty());
    }

    #[tokio::test]
    async fn handler_error_skips_publish() {
        let mut publisher = MockPublisher::new();
        publisher.expect_publish().never();

        let binding = QueueOutput::new(
            |_: &Request| Err(Error::from("handler failed")),
            Arc::new(publisher),
            DESTINATION,
        );

        assert!(matches!(
            binding.invoke(test_request("GET", Some("Alice"))).await,
            Err(Error::LambdaError(_))
        ));
    }

    #[tokio::test]
    async fn publish_failure_is_reported() {
        let mut publisher = MockPublisher::new();
        publisher
            .expect_publish()
            .times(1)
            .returning(|destination, _| Err(PublishError::new(destination, "broker down")));

        let binding = QueueOutput::new(pass_through_name, Arc::new(publisher), DESTINATION);

        match binding.invoke(test_request("GET", Some("Alice"))).await {
            Err(Error::HttpError(response)) => {
                assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR)
            }
            _ => panic!("expected a server error response"),
        }
    }

    #[tokio::test]
    async fn rejects_other_methods() {
        let mut publisher = MockPublisher::new();
        publisher.expect_publish().never();

        let binding = QueueOutput::new(pass_through_name, Arc::new(publisher), DESTINATION);

        match binding.invoke(test_request("PUT", Some("Alice"))).await {
            Err(Error::HttpError(response)) => {
                assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED)
            }
            _ => panic!("expected 405"),
        }
    }
}

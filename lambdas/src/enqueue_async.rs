use std::sync::Arc;

use lambda_http::{run, service_fn, Error as LambdaError, Request as LambdaRequest};
use serverless_bridge::common::config::{load_aws_config, IngressConfig};
use serverless_bridge::common::errors::Error;
use serverless_bridge::common::ingress::enqueue_then_respond;
use serverless_bridge::common::queue::{Publisher, SqsPublisher};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), LambdaError> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_ansi(false)
        .without_time() // CloudWatch will add the ingestion time
        .with_target(false)
        .init();

    let config = IngressConfig::explicit_from_env()?;
    let aws_config = load_aws_config(config.queue.endpoint_url.as_deref()).await;
    let publisher: Arc<dyn Publisher> =
        Arc::new(SqsPublisher::new(aws_sdk_sqs::Client::new(&aws_config)));

    info!(queue_url = %config.queue.queue_url, "publishing requests to queue");
    let queue_url = config.queue.queue_url.as_str();
    let publisher = &publisher;

    run(service_fn(move |request: LambdaRequest| async move {
        let result = enqueue_then_respond(request, Arc::clone(publisher), queue_url).await;
        Error::into_lambda_result(result)
    }))
    .await
}

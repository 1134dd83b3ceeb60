use std::sync::Arc;

use lambda_http::{run, service_fn, Error as LambdaError, Request as LambdaRequest};
use serverless_bridge::common::binding::QueueOutput;
use serverless_bridge::common::config::{load_aws_config, IngressConfig};
use serverless_bridge::common::errors::Error;
use serverless_bridge::common::ingress::pass_through_name;
use serverless_bridge::common::queue::SqsPublisher;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), LambdaError> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_ansi(false)
        .without_time() // CloudWatch will add the ingestion time
        .with_target(false)
        .init();

    let config = IngressConfig::pass_through_from_env()?;
    let aws_config = load_aws_config(config.queue.endpoint_url.as_deref()).await;
    let sqs_client = aws_sdk_sqs::Client::new(&aws_config);

    info!(queue_url = %config.queue.queue_url, "binding handler result to queue");
    let binding = QueueOutput::new(
        pass_through_name,
        Arc::new(SqsPublisher::new(sqs_client)),
        config.queue.queue_url,
    );
    let binding = &binding;

    run(service_fn(move |request: LambdaRequest| async move {
        Error::into_lambda_result(binding.invoke(request).await)
    }))
    .await
}

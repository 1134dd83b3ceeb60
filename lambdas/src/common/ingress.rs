use std::sync::Arc;

use lambda_http::http::StatusCode;
use lambda_http::{Request, Response};
use tracing::{error, info, instrument, warn};

use crate::common::errors::Error;
use crate::common::queue::Publisher;
use crate::common::utils::{empty_response, ensure_method, name_parameter, publish_failed};

/// Plain handler for the return-value binding: the `name` parameter is the result.
pub fn pass_through_name(request: &Request) -> Result<Option<String>, Error> {
    info!("HTTP trigger function processed a request");
    Ok(name_parameter(request))
}

/// Publishes the `name` parameter and answers 200 with an empty body once the
/// broker has stored it. A failed publish answers 500.
#[instrument(skip(publisher, request), fields(method = %request.method()))]
pub async fn enqueue_then_respond(
    request: Request,
    publisher: Arc<dyn Publisher>,
    destination: &str,
) -> Result<Response<String>, Error> {
    ensure_method(&request)?;
    info!("HTTP trigger function processed a request");

    let Some(name) = name_parameter(&request) else {
        warn!("no name in request, nothing enqueued");
        return empty_response(StatusCode::OK);
    };

    // Spawned so the write still completes if this invocation is dropped.
    let destination = destination.to_owned();
    let publish = tokio::spawn(async move { publisher.publish(&destination, name).await });

    match publish.await {
        Ok(Ok(message_id)) => {
            info!(message_id = %message_id, "name enqueued");
            empty_response(StatusCode::OK)
        }
        Ok(Err(err)) => {
            error!(error = %err, "failed to enqueue name");
            Err(publish_failed())
        }
        Err(err) => {
            error!(error = %err, "publish task did not complete");
            Err(publish_failed())
        }
    }
}

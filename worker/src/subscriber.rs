use std::sync::Arc;
use std::time::Duration;

use async_channel::Receiver;
use async_trait::async_trait;
use serverless_bridge::common::config::RetryPolicy;
use serverless_bridge::common::queue::QueueMessage;
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, warn};

use crate::errors::{HandlerError, SettleError};

/// Consumer bound to a queue. Called once per delivery; deliveries may repeat.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, message: &QueueMessage) -> Result<(), HandlerError>;
}

/// Broker operations that end or postpone a delivery.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Settlement: Send + Sync {
    async fn acknowledge(&self, message: &QueueMessage) -> Result<(), SettleError>;

    async fn redeliver_after(
        &self,
        message: &QueueMessage,
        delay: Duration,
    ) -> Result<(), SettleError>;

    async fn dead_letter(&self, message: &QueueMessage, reason: &str) -> Result<(), SettleError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Acknowledged,
    Redelivery(Duration),
    DeadLettered,
}

pub fn disposition(
    result: &Result<(), HandlerError>,
    attempt: u32,
    policy: &RetryPolicy,
) -> Disposition {
    match result {
        Ok(()) => Disposition::Acknowledged,
        Err(HandlerError::Permanent(_)) => Disposition::DeadLettered,
        Err(HandlerError::Transient(_)) if policy.is_exhausted(attempt) => {
            Disposition::DeadLettered
        }
        Err(HandlerError::Transient(_)) => Disposition::Redelivery(policy.backoff(attempt)),
    }
}

/// Runs the handler on one delivery and settles it. Settlement failures are logged;
/// an unsettled delivery comes back once its visibility timeout expires.
#[instrument(skip_all, fields(message_id = %message.message_id, attempt = message.attempt))]
pub async fn deliver(
    message: QueueMessage,
    handler: &dyn MessageHandler,
    settlement: &dyn Settlement,
    policy: &RetryPolicy,
) -> Disposition {
    let result = handler.handle(&message).await;
    let disposition = disposition(&result, message.attempt, policy);

    let settled = match (&result, disposition) {
        (Ok(()), _) => settlement.acknowledge(&message).await,
        (Err(err), Disposition::Redelivery(delay)) => {
            warn!(error = %err, retry_in_secs = delay.as_secs(), "handler failed, will retry");
            settlement.redeliver_after(&message, delay).await
        }
        (Err(err), _) => {
            error!(error = %err, "handler failed, giving up");
            settlement.dead_letter(&message, &err.to_string()).await
        }
    };

    if let Err(err) = settled {
        error!(error = %err, ?disposition, "failed to settle message");
    }

    disposition
}

/// Starts `concurrency` tasks that pull from `deliveries` until the channel is closed and drained.
pub fn subscribe(
    deliveries: Receiver<QueueMessage>,
    handler: Arc<dyn MessageHandler>,
    settlement: Arc<dyn Settlement>,
    policy: RetryPolicy,
    concurrency: usize,
) -> JoinSet<()> {
    let mut workers = JoinSet::new();

    for worker in 0..concurrency {
        let deliveries = deliveries.clone();
        let handler = Arc::clone(&handler);
        let settlement = Arc::clone(&settlement);
        let policy = policy.clone();

        workers.spawn(async move {
            debug!(worker, "dispatch task started");
            while let Ok(message) = deliveries.recv().await {
                deliver(message, handler.as_ref(), settlement.as_ref(), &policy).await;
            }
            debug!(worker, "dispatch task stopped");
        });
    }

    info!(concurrency, "subscribed handler to deliveries");
    workers
}

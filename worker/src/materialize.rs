use std::sync::Arc;

use async_trait::async_trait;
use serverless_bridge::common::errors::{MalformedMessageError, StoreError};
use serverless_bridge::common::queue::QueueMessage;
use serverless_bridge::common::store::ItemStore;
use serverless_bridge::common::ToDoItem;
use thiserror::Error;
use tracing::{error, info, instrument};

use crate::errors::HandlerError;
use crate::subscriber::MessageHandler;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    Found(ToDoItem),
    NotFound,
}

#[derive(Debug, Error)]
pub enum MaterializeError {
    #[error(transparent)]
    Malformed(#[from] MalformedMessageError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<MaterializeError> for HandlerError {
    fn from(value: MaterializeError) -> Self {
        match value {
            MaterializeError::Store(err) if err.is_retryable() => {
                HandlerError::Transient(err.to_string())
            }
            MaterializeError::Store(err) => {
                error!(error = %err, "store is misconfigured");
                HandlerError::Permanent(err.to_string())
            }
            MaterializeError::Malformed(err) => HandlerError::Permanent(err.to_string()),
        }
    }
}

/// Looks up the item named by a queued `ToDoItem` and reports what the store holds.
///
/// Read only. A missing record is a normal outcome, not a failure.
pub struct Materializer {
    store: Arc<dyn ItemStore>,
}

impl Materializer {
    pub fn new(store: Arc<dyn ItemStore>) -> Self {
        Self { store }
    }

    pub async fn materialize(&self, body: &str) -> Result<Lookup, MaterializeError> {
        let queued = ToDoItem::from_message(body)?;
        info!(
            id = %queued.id,
            key = %queued.part_value,
            "queue trigger function processed item"
        );

        match self.store.get(queued.id, &queued.part_value).await? {
            Some(stored) => {
                info!(part_value = %stored.part_value, "Found ToDo item");
                Ok(Lookup::Found(stored))
            }
            None => {
                info!("ToDo item not found");
                Ok(Lookup::NotFound)
            }
        }
    }
}

#[async_trait]
impl MessageHandler for Materializer {
    #[instrument(skip_all, fields(message_id = %message.message_id))]
    async fn handle(&self, message: &QueueMessage) -> Result<(), HandlerError> {
        self.materialize(&message.body).await?;
        Ok(())
    }
}

use async_trait::async_trait;
use aws_sdk_dynamodb::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_dynamodb::types::AttributeValue;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::common::errors::StoreError;
use crate::common::{ToDoItem, ID_ATTRIBUTE, PART_VALUE_ATTRIBUTE};

/// Error codes that retrying will not fix.
const MISCONFIGURATION_CODES: [&str; 5] = [
    "ResourceNotFoundException",
    "AccessDeniedException",
    "UnrecognizedClientException",
    "ValidationException",
    "MissingAuthenticationTokenException",
];

/// Partition key of the lookup `verify` issues. No real item is expected under it.
const VERIFY_PARTITION_KEY: &str = "__verify__";

/// Read-only view of the document store.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait ItemStore: Send + Sync {
    /// Point lookup. `Ok(None)` means no record has this id and partition key.
    async fn get(&self, id: Uuid, partition_key: &str) -> Result<Option<ToDoItem>, StoreError>;
}

#[derive(Clone)]
pub struct DynamoStore {
    client: aws_sdk_dynamodb::Client,
    table_name: String,
}

impl DynamoStore {
    pub fn new(client: aws_sdk_dynamodb::Client, table_name: impl Into<String>) -> Self {
        Self {
            client,
            table_name: table_name.into(),
        }
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// Checks that the table is readable with the configured identity.
    ///
    /// Issues the same `GetItem` call as a lookup, so it needs no permission beyond that.
    /// Only `StoreError::Misconfigured` should stop a caller from starting up.
    pub async fn verify(&self) -> Result<(), StoreError> {
        self.get(Uuid::nil(), VERIFY_PARTITION_KEY).await?;

        debug!(table = %self.table_name, "store table verified");
        Ok(())
    }
}

#[async_trait]
impl ItemStore for DynamoStore {
    #[instrument(skip(self), fields(table = %self.table_name))]
    async fn get(
        &self,
        id: Uuid,
        partition_key: &str,
    ) -> Result<Option<ToDoItem>, StoreError> {
        let output = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .key(PART_VALUE_ATTRIBUTE, AttributeValue::S(partition_key.into()))
            .key(ID_ATTRIBUTE, AttributeValue::S(id.to_string()))
            .send()
            .await
            .map_err(classify)?;

        output.item.map(ToDoItem::try_from).transpose()
    }
}

fn classify<E, R>(err: SdkError<E, R>) -> StoreError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    let misconfigured = match &err {
        SdkError::ConstructionFailure(_) => true,
        SdkError::ServiceError(service) => is_misconfiguration(service.err().code()),
        _ => false,
    };

    let message = DisplayErrorContext(err).to_string();
    if misconfigured {
        StoreError::Misconfigured(message)
    } else {
        warn!(error = %message, "store request failed");
        StoreError::Unavailable(message)
    }
}

fn is_misconfiguration(code: Option<&str>) -> bool {
    code.is_some_and(|code| MISCONFIGURATION_CODES.contains(&code))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::testing::FakeAwsEndpoint;

    const ACCESS_DENIED: &str =
        r#"{"__type":"com.amazon.coral.service#AccessDeniedException","message":"denied"}"#;
    const THROTTLED: &str = r#"{"__type":"com.amazonaws.dynamodb.v20120810#ThrottlingException"}"#;

    fn targets(endpoint: &FakeAwsEndpoint) -> Vec<String> {
        endpoint
            .requests()
            .iter()
            .filter_map(|request| {
                request
                    .lines()
                    .filter_map(|line| line.split_once(':'))
                    .find(|(name, _)| name.eq_ignore_ascii_case("x-amz-target"))
                    .map(|(_, value)| value.trim().to_string())
            })
            .collect()
    }

    #[tokio::test]
    async fn verify_reads_through_get_item() {
        let endpoint = FakeAwsEndpoint::start(200, "{}").await.unwrap();
        let store = DynamoStore::new(endpoint.dynamodb_client(), "ToDoItems-Items");

        store.verify().await.unwrap();

        assert_eq!(targets(&endpoint), vec!["DynamoDB_20120810.GetItem".to_string()]);
    }

    #[tokio::test]
    async fn verify_reports_denied_access_as_misconfiguration() {
        let endpoint = FakeAwsEndpoint::start(400, ACCESS_DENIED).await.unwrap();
        let store = DynamoStore::new(endpoint.dynamodb_client(), "ToDoItems-Items");

        let result = store.verify().await;

        assert!(matches!(result, Err(StoreError::Misconfigured(_))), "{result:?}");
    }

    #[tokio::test]
    async fn verify_reports_throttling_as_unavailable() {
        let endpoint = FakeAwsEndpoint::start(400, THROTTLED).await.unwrap();
        let store = DynamoStore::new(endpoint.dynamodb_client(), "ToDoItems-Items");

        let result = store.verify().await;

        assert!(matches!(result, Err(StoreError::Unavailable(_))), "{result:?}");
    }

    #[test]
    fn access_problems_are_misconfiguration() {
        assert!(is_misconfiguration(Some("ResourceNotFoundException")));
        assert!(is_misconfiguration(Some("AccessDeniedException")));
        assert!(is_misconfiguration(Some("UnrecognizedClientException")));
    }

    #[test]
    fn throttling_is_transient() {
        assert!(!is_misconfiguration(Some("ProvisionedThroughputExceededException")));
        assert!(!is_misconfiguration(Some("InternalServerError")));
        assert!(!is_misconfiguration(None));
    }

    #[test]
    fn only_unavailable_is_retryable() {
        assert!(StoreError::Unavailable("timeout".into()).is_retryable());
        assert!(!StoreError::Misconfigured("no table".into()).is_retryable());
    }
}

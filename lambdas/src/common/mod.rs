use std::collections::HashMap;

use aws_sdk_dynamodb::types::AttributeValue;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod binding;
pub mod config;
pub mod errors;
pub mod ingress;
pub mod queue;
pub mod store;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod utils;

use crate::common::errors::{MalformedMessageError, StoreError};

pub const ID_ATTRIBUTE: &str = "Id";
pub const PART_VALUE_ATTRIBUTE: &str = "PartValue";

/// Record carried on the materialization queue and stored in the document store.
///
/// The JSON shape is fixed: `{"Id": "<uuid>", "PartValue": "<string>"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToDoItem {
    #[serde(rename = "Id")]
    pub id: Uuid,
    #[serde(rename = "PartValue")]
    pub part_value: String,
}

impl ToDoItem {
    pub fn from_message(body: &str) -> Result<Self, MalformedMessageError> {
        serde_json::from_str(body).map_err(MalformedMessageError::from)
    }
}

impl From<ToDoItem> for HashMap<String, AttributeValue> {
    fn from(value: ToDoItem) -> Self {
        HashMap::from([
            (ID_ATTRIBUTE.into(), AttributeValue::S(value.id.to_string())),
            (PART_VALUE_ATTRIBUTE.into(), AttributeValue::S(value.part_value)),
        ])
    }
}

impl TryFrom<HashMap<String, AttributeValue>> for ToDoItem {
    type Error = StoreError;

    fn try_from(mut value: HashMap<String, AttributeValue>) -> Result<Self, Self::Error> {
        let id = match value.remove(ID_ATTRIBUTE) {
            Some(AttributeValue::S(id)) => Uuid::parse_str(&id).map_err(|err| {
                StoreError::Misconfigured(format!("invalid {ID_ATTRIBUTE}: {err}"))
            })?,
            _ => {
                return Err(StoreError::Misconfigured(format!(
                    "record has no string attribute {ID_ATTRIBUTE}"
                )))
            }
        };

        let part_value = match value.remove(PART_VALUE_ATTRIBUTE) {
            Some(AttributeValue::S(part_value)) => part_value,
            _ => {
                return Err(StoreError::Misconfigured(format!(
                    "record has no string attribute {PART_VALUE_ATTRIBUTE}"
                )))
            }
        };

        Ok(Self { id, part_value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_queue_message() {
        let item = ToDoItem::from_message(
            r#"{"Id":"11111111-1111-1111-1111-111111111111","PartValue":"foo"}"#,
        )
        .unwrap();

        assert_eq!(item.id.to_string(), "11111111-1111-1111-1111-111111111111");
        assert_eq!(item.part_value, "foo");
    }

    #[test]
    fn rejects_message_without_id() {
        assert!(ToDoItem::from_message(r#"{"PartValue":"foo"}"#).is_err());
    }

    #[test]
    fn rejects_message_with_invalid_id() {
        assert!(ToDoItem::from_message(r#"{"Id":"not-a-uuid","PartValue":"foo"}"#).is_err());
    }

    #[test]
    fn rejects_invalid_json() {
        assert!(ToDoItem::from_message("Alice").is_err());
    }

    #[test]
    fn converts_store_record() {
        let item = ToDoItem {
            id: Uuid::new_v4(),
            part_value: "foo".into(),
        };

        let mut record: HashMap<String, AttributeValue> = item.clone().into();
        record.insert("Extra".into(), AttributeValue::N("1".into()));

        assert_eq!(ToDoItem::try_from(record).unwrap(), item);
    }

    #[test]
    fn record_without_part_value_is_misconfigured() {
        let record = HashMap::from([(
            ID_ATTRIBUTE.to_string(),
            AttributeValue::S(Uuid::new_v4().to_string()),
        )]);

        assert!(matches!(
            ToDoItem::try_from(record),
            Err(StoreError::Misconfigured(_))
        ));
    }
}

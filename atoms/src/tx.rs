//! Builders for `TransactWriteItems` calls.
//!
//! Multi-item writes (claim + outbox, review + task list, delivery copy + deletes)
//! always go through one transaction so a failure never leaves half the change applied.

use aws_sdk_dynamodb::operation::transact_write_items::TransactWriteItemsError;
use aws_sdk_dynamodb::types::{
    AttributeValue, CancellationReason, ConditionCheck, Delete, Put, TransactWriteItem, Update,
};
use aws_sdk_dynamodb::Client as DynamoClient;
use std::collections::HashMap;

use crate::error::{ServiceError, ServiceResult};
use crate::item::{item_size, Item};

/// DynamoDB caps a transaction at 100 actions.
pub const MAX_TRANSACTION_ITEMS: usize = 100;

/// DynamoDB caps a transaction's aggregate payload at 4 MB.
pub const MAX_TRANSACTION_BYTES: usize = 4 * 1024 * 1024;

fn build_error(what: &str, e: impl std::fmt::Display) -> ServiceError {
    ServiceError::Upstream(format!("Failed to build {}: {}", what, e))
}

pub fn put(table_name: &str, item: Item, condition: Option<&str>) -> ServiceResult<TransactWriteItem> {
    let put = Put::builder()
        .table_name(table_name)
        .set_item(Some(item))
        .set_condition_expression(condition.map(str::to_string))
        .build()
        .map_err(|e| build_error("put", e))?;
    Ok(TransactWriteItem::builder().put(put).build())
}

/// Put guarded by a condition that needs placeholder values.
pub fn put_if(
    table_name: &str,
    item: Item,
    condition: &str,
    values: Item,
) -> ServiceResult<TransactWriteItem> {
    let put = Put::builder()
        .table_name(table_name)
        .set_item(Some(item))
        .condition_expression(condition)
        .set_expression_attribute_values((!values.is_empty()).then_some(values))
        .build()
        .map_err(|e| build_error("put", e))?;
    Ok(TransactWriteItem::builder().put(put).build())
}

pub fn delete(table_name: &str, key: Item, condition: Option<&str>) -> ServiceResult<TransactWriteItem> {
    let delete = Delete::builder()
        .table_name(table_name)
        .set_key(Some(key))
        .set_condition_expression(condition.map(str::to_string))
        .build()
        .map_err(|e| build_error("delete", e))?;
    Ok(TransactWriteItem::builder().delete(delete).build())
}

pub fn delete_if(
    table_name: &str,
    key: Item,
    condition: &str,
    values: Item,
) -> ServiceResult<TransactWriteItem> {
    let delete = Delete::builder()
        .table_name(table_name)
        .set_key(Some(key))
        .condition_expression(condition)
        .set_expression_attribute_values((!values.is_empty()).then_some(values))
        .build()
        .map_err(|e| build_error("delete", e))?;
    Ok(TransactWriteItem::builder().delete(delete).build())
}

pub fn condition_check(table_name: &str, key: Item, condition: &str) -> ServiceResult<TransactWriteItem> {
    let check = ConditionCheck::builder()
        .table_name(table_name)
        .set_key(Some(key))
        .condition_expression(condition)
        .build()
        .map_err(|e| build_error("condition check", e))?;
    Ok(TransactWriteItem::builder().condition_check(check).build())
}

/// An update expression with its placeholders.
#[derive(Debug, Default)]
pub struct UpdateSpec {
    pub expression: String,
    pub condition: Option<String>,
    pub names: HashMap<String, String>,
    pub values: Item,
}

pub fn update(table_name: &str, key: Item, spec: UpdateSpec) -> ServiceResult<TransactWriteItem> {
    let update = Update::builder()
        .table_name(table_name)
        .set_key(Some(key))
        .update_expression(spec.expression)
        .set_condition_expression(spec.condition)
        .set_expression_attribute_names((!spec.names.is_empty()).then_some(spec.names))
        .set_expression_attribute_values((!spec.values.is_empty()).then_some(spec.values))
        .build()
        .map_err(|e| build_error("update", e))?;
    Ok(TransactWriteItem::builder().update(update).build())
}

/// Approximate payload of a transaction, counting items, keys and placeholder values.
pub fn estimated_size(items: &[TransactWriteItem]) -> usize {
    items
        .iter()
        .map(|write| {
            if let Some(put) = write.put() {
                item_size(put.item()) + values_size(put.expression_attribute_values())
            } else if let Some(delete) = write.delete() {
                item_size(delete.key()) + values_size(delete.expression_attribute_values())
            } else if let Some(update) = write.update() {
                item_size(update.key())
                    + update.update_expression().len()
                    + values_size(update.expression_attribute_values())
            } else if let Some(check) = write.condition_check() {
                item_size(check.key()) + values_size(check.expression_attribute_values())
            } else {
                0
            }
        })
        .sum()
}

fn values_size(values: Option<&HashMap<String, AttributeValue>>) -> usize {
    values.map(item_size).unwrap_or(0)
}

/// Indexes of transaction items whose condition failed.
pub fn conditional_failures(reasons: &[CancellationReason]) -> Vec<usize> {
    reasons
        .iter()
        .enumerate()
        .filter(|(_, reason)| reason.code() == Some("ConditionalCheckFailed"))
        .map(|(index, _)| index)
        .collect()
}

/// Commit a transaction; when a condition fails, `on_conflict` receives the
/// failing item indexes and decides which error the caller sees.
pub async fn commit_or<F>(
    client: &DynamoClient,
    items: Vec<TransactWriteItem>,
    on_conflict: F,
) -> ServiceResult<()>
where
    F: FnOnce(&[usize]) -> ServiceError,
{
    if items.len() > MAX_TRANSACTION_ITEMS {
        return Err(ServiceError::Validation(format!(
            "Change touches {} items; the limit is {}",
            items.len(),
            MAX_TRANSACTION_ITEMS
        )));
    }
    let size = estimated_size(&items);
    if size > MAX_TRANSACTION_BYTES {
        return Err(ServiceError::Validation(format!(
            "Change is about {} bytes; the limit is {}",
            size, MAX_TRANSACTION_BYTES
        )));
    }

    match client
        .transact_write_items()
        .set_transact_items(Some(items))
        .send()
        .await
    {
        Ok(_) => Ok(()),
        Err(err) => {
            if let Some(TransactWriteItemsError::TransactionCanceledException(cancel)) =
                err.as_service_error()
            {
                let failed = conditional_failures(cancel.cancellation_reasons());
                if !failed.is_empty() {
                    return Err(on_conflict(&failed));
                }
            }
            Err(ServiceError::upstream("DynamoDB transact_write_items", err))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::{key, s};

    #[test]
    fn conditional_failures_are_indexed() {
        let reasons = vec![
            CancellationReason::builder().code("None").build(),
            CancellationReason::builder().code("ConditionalCheckFailed").build(),
            CancellationReason::builder().build(),
        ];
        assert_eq!(conditional_failures(&reasons), vec![1]);
    }

    #[test]
    fn put_keeps_condition() {
        let mut item = key("USER", "USER#alice");
        item.insert("email".into(), s("alice@example.com"));
        let write = put("bughunt", item, Some("attribute_not_exists(PK)")).unwrap();
        let put = write.put().expect("put action");
        assert_eq!(put.condition_expression(), Some("attribute_not_exists(PK)"));
        assert_eq!(put.table_name(), "bughunt");
    }

    #[test]
    fn guarded_writes_carry_values() {
        let values = HashMap::from([(":v".to_string(), s("3"))]);
        let write = delete_if("bughunt", key("TASK", "TASK#1"), "version = :v", values.clone()).unwrap();
        let delete = write.delete().expect("delete action");
        assert_eq!(delete.condition_expression(), Some("version = :v"));
        assert!(delete.expression_attribute_values().is_some());

        let write = put_if("bughunt", key("TASK", "TASK#1"), "updated_at = :v", values).unwrap();
        assert_eq!(write.put().expect("put action").condition_expression(), Some("updated_at = :v"));
    }

    #[test]
    fn size_sums_every_action() {
        let mut big = key("TASK", "TASK#1");
        big.insert("body".into(), s("x".repeat(5000)));
        let items = vec![
            put("bughunt", big, None).unwrap(),
            delete("bughunt", key("TASK", "TASK#2"), None).unwrap(),
        ];
        let size = estimated_size(&items);
        assert!(size > 5000 && size < 5100, "size {}", size);
    }

    #[test]
    fn update_omits_empty_placeholder_maps() {
        let spec = UpdateSpec {
            expression: "SET final_report = :t".into(),
            values: HashMap::from([(":t".to_string(), s("x"))]),
            ..Default::default()
        };
        let write = update("bughunt", key("TASK", "TASK#1"), spec).unwrap();
        let update = write.update().expect("update action");
        assert!(update.expression_attribute_names().is_none());
        assert!(update.expression_attribute_values().is_some());
    }
}

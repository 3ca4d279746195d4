use aws_sdk_dynamodb::types::TransactWriteItem;
use aws_sdk_dynamodb::Client as DynamoClient;
use futures::stream::{self, StreamExt, TryStreamExt};

use super::model::DeliveredTask;
use crate::error::{ServiceError, ServiceResult};
use crate::item::{
    delivered_children_pk, delivered_sk, get_s, item_size, key, rekey, review_sk, s, sk_id,
    task_children_pk, task_sk, Item, DELIVERED_PK, FINAL_REPORT_SK, MAX_ITEM_BYTES, TASK_PK,
};
use crate::reports::service::{report_from_item, report_to_item};
use crate::reviews::service::{order_reviews, review_from_item, review_to_item};
use crate::tasks::model::TaskStatus;
use crate::tasks::service::{delete_external_guard_write, delete_task_write, task_from_item, task_to_item};
use crate::tx::{self, MAX_TRANSACTION_BYTES, MAX_TRANSACTION_ITEMS};

/// Head put, task delete, guard delete, report copy and delete, outbox put.
const FIXED_DELIVERY_WRITES: usize = 6;

/// Most reviews a task can carry and still be delivered in one transaction.
/// Each review costs a copy and a delete.
pub const MAX_DELIVERY_REVIEWS: usize = (MAX_TRANSACTION_ITEMS - FIXED_DELIVERY_WRITES) / 2;

const LOAD_CONCURRENCY: usize = 8;

/// Head item of a delivery: the task's attributes under the delivered key.
pub fn delivered_head_item(delivered: &DeliveredTask) -> Item {
    let mut item = rekey(&task_to_item(&delivered.task), DELIVERED_PK, delivered_sk(delivered.task_id()));
    item.insert("task_id".into(), s(delivered.task_id()));
    item.insert("delivered_at".into(), s(&delivered.delivered_at));
    item.insert("delivered_by".into(), s(&delivered.delivered_by));
    item
}

/// Review and report copies, stored under the delivery's own partition.
pub fn delivered_child_items(delivered: &DeliveredTask) -> Vec<Item> {
    let pk = delivered_children_pk(delivered.task_id());
    let mut items: Vec<Item> = delivered
        .reviews
        .iter()
        .map(|review| rekey(&review_to_item(review), pk.as_str(), review_sk(&review.review_id)))
        .collect();
    if let Some(report) = &delivered.final_report {
        items.push(rekey(&report_to_item(report), pk.as_str(), FINAL_REPORT_SK));
    }
    items
}

/// Rebuild a delivery from its head item and its children.
pub fn delivered_from_items(head: &Item, children: &[Item]) -> ServiceResult<DeliveredTask> {
    let task_id = sk_id(head, "DELIVERED#")
        .ok_or_else(|| ServiceError::Upstream("Delivered item without DELIVERED# sort key".into()))?;
    let task = task_from_item(&rekey(head, TASK_PK, task_sk(&task_id)))?;

    let reviews = children.iter().filter_map(review_from_item).collect();
    let final_report = children
        .iter()
        .find(|item| get_s(item, "SK") == FINAL_REPORT_SK)
        .map(report_from_item)
        .transpose()?;

    Ok(DeliveredTask {
        reviews: order_reviews(&task, reviews),
        final_report,
        delivered_at: get_s(head, "delivered_at"),
        delivered_by: get_s(head, "delivered_by"),
        task,
    })
}

fn check_item_size(external_id: &str, item: &Item) -> ServiceResult<()> {
    let size = item_size(item);
    if size > MAX_ITEM_BYTES {
        return Err(ServiceError::Validation(format!(
            "Task '{}' has an item of about {} bytes; the limit is {}",
            external_id, size, MAX_ITEM_BYTES
        )));
    }
    Ok(())
}

/// Every write that moves a task into the delivered set.
///
/// The task delete is conditioned on the version the snapshot was taken from,
/// so a review added or a status changed in between cancels the whole delivery.
pub fn delivery_writes(
    table_name: &str,
    delivered: &DeliveredTask,
    outbox: TransactWriteItem,
) -> ServiceResult<Vec<TransactWriteItem>> {
    let task = &delivered.task;
    if !matches!(task.status, TaskStatus::Reviewed | TaskStatus::Deliver) {
        return Err(ServiceError::Conflict(format!(
            "Task '{}' is {}; only reviewed tasks can be delivered",
            task.external_id, task.status
        )));
    }
    if delivered.reviews.len() > MAX_DELIVERY_REVIEWS {
        return Err(ServiceError::Validation(format!(
            "Task '{}' has {} reviews; at most {} can be delivered at once",
            task.external_id,
            delivered.reviews.len(),
            MAX_DELIVERY_REVIEWS
        )));
    }

    let head = delivered_head_item(delivered);
    check_item_size(&task.external_id, &head)?;
    let children = delivered_child_items(delivered);
    for child in &children {
        check_item_size(&task.external_id, child)?;
    }

    let live_pk = task_children_pk(&task.task_id);
    let mut writes = vec![
        tx::put(table_name, head, Some("attribute_not_exists(PK)"))?,
        delete_task_write(table_name, task)?,
        delete_external_guard_write(table_name, task)?,
    ];
    for child in children {
        let live_key = key(live_pk.as_str(), get_s(&child, "SK"));
        writes.push(tx::put(table_name, child, None)?);
        writes.push(tx::delete(table_name, live_key, None)?);
    }
    writes.push(outbox);

    let size = tx::estimated_size(&writes);
    if size > MAX_TRANSACTION_BYTES {
        return Err(ServiceError::Validation(format!(
            "Task '{}' is about {} bytes with its reviews; a delivery is limited to {}",
            task.external_id, size, MAX_TRANSACTION_BYTES
        )));
    }
    Ok(writes)
}

/// Commit a delivery built by [`delivery_writes`]
pub async fn deliver_task(
    client: &DynamoClient,
    table_name: &str,
    delivered: &DeliveredTask,
    outbox: TransactWriteItem,
) -> ServiceResult<()> {
    let writes = delivery_writes(table_name, delivered, outbox)?;
    let count = writes.len();
    tx::commit_or(client, writes, |failed| {
        if failed.contains(&0) {
            ServiceError::Conflict(format!("Task '{}' was already delivered", delivered.task.external_id))
        } else {
            ServiceError::Conflict(format!(
                "Task '{}' changed while it was being delivered; retry",
                delivered.task.external_id
            ))
        }
    })
    .await?;

    tracing::info!(
        task_id = %delivered.task_id(),
        owner = %delivered.owner(),
        reviews = delivered.reviews.len(),
        writes = count,
        "task delivered"
    );
    Ok(())
}

async fn query_partition(client: &DynamoClient, table_name: &str, pk: String) -> ServiceResult<Vec<Item>> {
    let mut items = Vec::new();
    let mut start_key = None;
    loop {
        let result = client
            .query()
            .table_name(table_name)
            .key_condition_expression("PK = :pk")
            .expression_attribute_values(":pk", s(pk.as_str()))
            .set_exclusive_start_key(start_key)
            .send()
            .await
            .map_err(|e| ServiceError::upstream("DynamoDB query", e))?;

        items.extend(result.items().iter().cloned());

        start_key = result.last_evaluated_key().cloned();
        if start_key.is_none() {
            break;
        }
    }
    Ok(items)
}

async fn load_children(client: &DynamoClient, table_name: &str, head: &Item) -> ServiceResult<DeliveredTask> {
    let task_id = get_s(head, "task_id");
    let children = query_partition(client, table_name, delivered_children_pk(&task_id)).await?;
    delivered_from_items(head, &children)
}

/// Load every delivered task, most recent delivery first
pub async fn load_delivered(client: &DynamoClient, table_name: &str) -> ServiceResult<Vec<DeliveredTask>> {
    let heads = query_partition(client, table_name, DELIVERED_PK.to_string()).await?;
    let mut delivered: Vec<DeliveredTask> = stream::iter(heads.iter().map(|head| load_children(client, table_name, head)).collect::<Vec<_>>())
        .buffer_unordered(LOAD_CONCURRENCY)
        .try_collect()
        .await?;

    delivered.sort_by(|a, b| b.delivered_at.cmp(&a.delivered_at));
    Ok(delivered)
}

pub async fn get_delivered(client: &DynamoClient, table_name: &str, task_id: &str) -> ServiceResult<DeliveredTask> {
    let result = client
        .get_item()
        .table_name(table_name)
        .set_key(Some(key(DELIVERED_PK, delivered_sk(task_id))))
        .send()
        .await
        .map_err(|e| ServiceError::upstream("DynamoDB get_item", e))?;

    match result.item() {
        Some(head) => load_children(client, table_name, head).await,
        None => Err(ServiceError::NotFound(format!("Delivered task '{}'", task_id))),
    }
}

use aws_sdk_dynamodb::types::{AttributeValue, DeleteRequest, TransactWriteItem, WriteRequest};
use aws_sdk_dynamodb::Client as DynamoClient;
use std::collections::HashMap;
use tokio::time::{sleep, Duration};

use super::model::{CreateTaskPayload, Task, TaskStatus, UpdateTaskPayload};
use crate::error::{ServiceError, ServiceResult};
use crate::item::{
    external_sk, get_bool, get_n, get_s, get_string_list, key, n, s, sk_id, string_list,
    task_children_pk, task_sk, Item, TASK_EXTERNAL_PK, TASK_PK,
};
use crate::delivered::service::MAX_DELIVERY_REVIEWS;
use crate::tx::{self, UpdateSpec};
use crate::users::model::Role;

pub fn task_to_item(task: &Task) -> Item {
    let mut item = key(TASK_PK, task_sk(&task.task_id));
    item.insert("external_id".into(), s(&task.external_id));
    item.insert("project_name".into(), s(&task.project_name));
    item.insert("industry".into(), s(&task.industry));
    item.insert("domain_link".into(), s(&task.domain_link));
    item.insert("tool_link".into(), s(&task.tool_link));
    item.insert("status".into(), s(task.status.as_str()));
    item.insert("owner".into(), s(&task.owner));
    item.insert("review_ids".into(), string_list(&task.review_ids));
    item.insert("final_report".into(), AttributeValue::Bool(task.final_report));
    item.insert("version".into(), n(task.version));
    item.insert("created_at".into(), s(&task.created_at));
    item.insert("updated_at".into(), s(&task.updated_at));
    item
}

pub fn task_from_item(item: &Item) -> ServiceResult<Task> {
    let task_id = sk_id(item, "TASK#")
        .ok_or_else(|| ServiceError::Upstream("Task item without TASK# sort key".into()))?;
    Ok(Task {
        task_id,
        external_id: get_s(item, "external_id"),
        project_name: get_s(item, "project_name"),
        industry: get_s(item, "industry"),
        domain_link: get_s(item, "domain_link"),
        tool_link: get_s(item, "tool_link"),
        status: get_s(item, "status").parse()?,
        owner: get_s(item, "owner"),
        review_ids: get_string_list(item, "review_ids"),
        final_report: get_bool(item, "final_report"),
        version: get_n(item, "version"),
        created_at: get_s(item, "created_at"),
        updated_at: get_s(item, "updated_at"),
    })
}

fn external_guard_item(task: &Task) -> Item {
    let mut item = key(TASK_EXTERNAL_PK, external_sk(&task.external_id));
    item.insert("task_id".into(), s(&task.task_id));
    item
}

/// Writes creating a task: the external-id guard and the task itself.
pub fn create_writes(table_name: &str, task: &Task) -> ServiceResult<Vec<TransactWriteItem>> {
    Ok(vec![
        tx::put(table_name, external_guard_item(task), Some("attribute_not_exists(PK)"))?,
        tx::put(table_name, task_to_item(task), Some("attribute_not_exists(PK)"))?,
    ])
}

/// Create a new unclaimed task
pub async fn create_task(
    client: &DynamoClient,
    table_name: &str,
    payload: CreateTaskPayload,
) -> ServiceResult<Task> {
    payload.validate()?;
    let now = chrono::Utc::now().to_rfc3339();
    let task = Task {
        task_id: uuid::Uuid::new_v4().to_string(),
        external_id: payload.external_id.trim().to_string(),
        project_name: payload.project_name.trim().to_string(),
        industry: payload.industry,
        domain_link: payload.domain_link,
        tool_link: payload.tool_link,
        status: TaskStatus::Unclaimed,
        owner: String::new(),
        review_ids: vec![],
        final_report: false,
        version: 1,
        created_at: now.clone(),
        updated_at: now,
    };

    let writes = create_writes(table_name, &task)?;
    tx::commit_or(client, writes, |_| {
        ServiceError::Conflict(format!("A task with external id '{}' already exists", task.external_id))
    })
    .await?;

    tracing::info!(task_id = %task.task_id, external_id = %task.external_id, "task created");
    Ok(task)
}

/// Load every task, newest first
pub async fn load_tasks(client: &DynamoClient, table_name: &str) -> ServiceResult<Vec<Task>> {
    let mut tasks = Vec::new();
    let mut start_key = None;
    loop {
        let result = client
            .query()
            .table_name(table_name)
            .key_condition_expression("PK = :pk AND begins_with(SK, :sk_prefix)")
            .expression_attribute_values(":pk", s(TASK_PK))
            .expression_attribute_values(":sk_prefix", s("TASK#"))
            .set_exclusive_start_key(start_key)
            .send()
            .await
            .map_err(|e| ServiceError::upstream("DynamoDB query", e))?;

        for item in result.items() {
            tasks.push(task_from_item(item)?);
        }

        start_key = result.last_evaluated_key().cloned();
        if start_key.is_none() {
            break;
        }
    }

    tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(tasks)
}

/// Get a specific task
pub async fn get_task(client: &DynamoClient, table_name: &str, task_id: &str) -> ServiceResult<Task> {
    let result = client
        .get_item()
        .table_name(table_name)
        .set_key(Some(key(TASK_PK, task_sk(task_id))))
        .consistent_read(true)
        .send()
        .await
        .map_err(|e| ServiceError::upstream("DynamoDB get_item", e))?;

    match result.item() {
        Some(item) => task_from_item(item),
        None => Err(ServiceError::NotFound(format!("Task '{}'", task_id))),
    }
}

/// Edit descriptive fields; status and ownership only move through transitions.
pub async fn update_task_fields(
    client: &DynamoClient,
    table_name: &str,
    task_id: &str,
    payload: UpdateTaskPayload,
) -> ServiceResult<Task> {
    let mut update_expr = vec![
        "updated_at = :updated_at".to_string(),
        "version = version + :one".to_string(),
    ];
    let mut expr_values = HashMap::new();
    expr_values.insert(":updated_at".to_string(), s(chrono::Utc::now().to_rfc3339()));
    expr_values.insert(":one".to_string(), n(1));

    let fields = [
        ("project_name", payload.project_name),
        ("industry", payload.industry),
        ("domain_link", payload.domain_link),
        ("tool_link", payload.tool_link),
    ];
    for (name, value) in fields {
        if let Some(value) = value {
            update_expr.push(format!("{0} = :{0}", name));
            expr_values.insert(format!(":{}", name), s(value));
        }
    }

    let result = client
        .update_item()
        .table_name(table_name)
        .set_key(Some(key(TASK_PK, task_sk(task_id))))
        .update_expression(format!("SET {}", update_expr.join(", ")))
        .condition_expression("attribute_exists(PK)")
        .set_expression_attribute_values(Some(expr_values))
        .send()
        .await;

    match result {
        Ok(_) => get_task(client, table_name, task_id).await,
        Err(e)
            if e
                .as_service_error()
                .map(|se| se.is_conditional_check_failed_exception())
                .unwrap_or(false) =>
        {
            Err(ServiceError::NotFound(format!("Task '{}'", task_id)))
        }
        Err(e) => Err(ServiceError::upstream("DynamoDB update_item", e)),
    }
}

/// Conditional status write for one workflow step.
///
/// The write only applies while the stored status is still `task.status`, so two
/// racing requests cannot both win. A hunter completing a task must also still
/// own it; a claim records the claimant as owner.
pub fn transition_write(
    table_name: &str,
    task: &Task,
    target: TaskStatus,
    actor: &str,
    actor_role: Role,
    now: &str,
) -> ServiceResult<TransactWriteItem> {
    task.status.check_transition(target)?;

    let mut set = vec![
        "#status = :target",
        "updated_at = :now",
        "version = version + :one",
    ];
    let mut condition = vec!["#status = :current"];
    let mut names = HashMap::new();
    names.insert("#status".to_string(), "status".to_string());
    let mut values = HashMap::new();
    values.insert(":target".to_string(), s(target.as_str()));
    values.insert(":current".to_string(), s(task.status.as_str()));
    values.insert(":now".to_string(), s(now));
    values.insert(":one".to_string(), n(1));

    match target {
        TaskStatus::InProgress => {
            set.push("#owner = :actor");
            names.insert("#owner".to_string(), "owner".to_string());
            values.insert(":actor".to_string(), s(actor));
        }
        TaskStatus::Completed if actor_role != Role::Admin => {
            condition.push("#owner = :actor");
            names.insert("#owner".to_string(), "owner".to_string());
            values.insert(":actor".to_string(), s(actor));
        }
        _ => {}
    }

    tx::update(
        table_name,
        key(TASK_PK, task_sk(&task.task_id)),
        UpdateSpec {
            expression: format!("SET {}", set.join(", ")),
            condition: Some(condition.join(" AND ")),
            names,
            values,
        },
    )
}

/// Apply one workflow step plus any writes that must land with it (outbox items).
pub async fn transition_task(
    client: &DynamoClient,
    table_name: &str,
    task: &Task,
    target: TaskStatus,
    actor: &str,
    actor_role: Role,
    extra_writes: Vec<TransactWriteItem>,
) -> ServiceResult<Task> {
    let now = chrono::Utc::now().to_rfc3339();
    let mut writes = vec![transition_write(table_name, task, target, actor, actor_role, &now)?];
    writes.extend(extra_writes);

    tx::commit_or(client, writes, |_| {
        if target == TaskStatus::InProgress {
            ServiceError::Conflict(format!("Task '{}' was already claimed", task.external_id))
        } else {
            ServiceError::Conflict(format!(
                "Task '{}' changed while the request was in flight",
                task.external_id
            ))
        }
    })
    .await?;

    let mut updated = task.clone();
    updated.status = target;
    updated.updated_at = now;
    updated.version += 1;
    if target == TaskStatus::InProgress {
        updated.owner = actor.to_string();
    }
    tracing::info!(
        task_id = %task.task_id,
        from = %task.status,
        to = %target,
        actor,
        "task status changed"
    );
    Ok(updated)
}

/// Append a review id to the task's ordered list.
///
/// Lands only while `hunter` owns the task, it still accepts reviews and the
/// list has room for one more deliverable review.
pub fn append_review_write(
    table_name: &str,
    task_id: &str,
    review_id: &str,
    hunter: &str,
) -> ServiceResult<TransactWriteItem> {
    let mut names = HashMap::new();
    names.insert("#status".to_string(), "status".to_string());
    names.insert("#owner".to_string(), "owner".to_string());
    let mut values = HashMap::new();
    values.insert(":rid".to_string(), string_list(&[review_id.to_string()]));
    values.insert(":empty".to_string(), AttributeValue::L(vec![]));
    values.insert(":now".to_string(), s(chrono::Utc::now().to_rfc3339()));
    values.insert(":one".to_string(), n(1));
    values.insert(":in_progress".to_string(), s(TaskStatus::InProgress.as_str()));
    values.insert(":completed".to_string(), s(TaskStatus::Completed.as_str()));
    values.insert(":me".to_string(), s(hunter));
    values.insert(":max".to_string(), n(MAX_DELIVERY_REVIEWS as i64));
    tx::update(
        table_name,
        key(TASK_PK, task_sk(task_id)),
        UpdateSpec {
            expression: "SET review_ids = list_append(if_not_exists(review_ids, :empty), :rid), updated_at = :now, version = version + :one".into(),
            condition: Some(
                "#status IN (:in_progress, :completed) AND #owner = :me \
                 AND (attribute_not_exists(review_ids) OR size(review_ids) < :max)"
                    .into(),
            ),
            names,
            values,
        },
    )
}

/// Bump the task version so an in-flight delivery sees a child changed.
pub fn touch_task_write(table_name: &str, task_id: &str, now: &str) -> ServiceResult<TransactWriteItem> {
    let mut values = HashMap::new();
    values.insert(":now".to_string(), s(now));
    values.insert(":one".to_string(), n(1));
    tx::update(
        table_name,
        key(TASK_PK, task_sk(task_id)),
        UpdateSpec {
            expression: "SET updated_at = :now, version = version + :one".into(),
            condition: Some("attribute_exists(PK)".into()),
            names: HashMap::new(),
            values,
        },
    )
}

/// Remove a review id by position, guarded on the id still sitting there.
pub fn remove_review_write(
    table_name: &str,
    task: &Task,
    review_id: &str,
) -> ServiceResult<TransactWriteItem> {
    let index = task
        .review_ids
        .iter()
        .position(|id| id == review_id)
        .ok_or_else(|| ServiceError::NotFound(format!("Review '{}'", review_id)))?;

    let mut values = HashMap::new();
    values.insert(":rid".to_string(), s(review_id));
    values.insert(":now".to_string(), s(chrono::Utc::now().to_rfc3339()));
    values.insert(":one".to_string(), n(1));
    tx::update(
        table_name,
        key(TASK_PK, task_sk(&task.task_id)),
        UpdateSpec {
            expression: format!(
                "REMOVE review_ids[{0}] SET updated_at = :now, version = version + :one",
                index
            ),
            condition: Some(format!("review_ids[{}] = :rid", index)),
            names: HashMap::new(),
            values,
        },
    )
}

pub fn mark_final_report_write(table_name: &str, task_id: &str) -> ServiceResult<TransactWriteItem> {
    let mut values = HashMap::new();
    values.insert(":yes".to_string(), AttributeValue::Bool(true));
    values.insert(":now".to_string(), s(chrono::Utc::now().to_rfc3339()));
    values.insert(":one".to_string(), n(1));
    tx::update(
        table_name,
        key(TASK_PK, task_sk(task_id)),
        UpdateSpec {
            expression: "SET final_report = :yes, updated_at = :now, version = version + :one".into(),
            condition: Some("attribute_exists(PK)".into()),
            names: HashMap::new(),
            values,
        },
    )
}

/// Delete the task record only if nobody wrote to it since `task.version`.
pub fn delete_task_write(table_name: &str, task: &Task) -> ServiceResult<TransactWriteItem> {
    let mut values = HashMap::new();
    values.insert(":version".to_string(), n(task.version));
    tx::delete_if(
        table_name,
        key(TASK_PK, task_sk(&task.task_id)),
        "version = :version",
        values,
    )
}

pub fn delete_external_guard_write(table_name: &str, task: &Task) -> ServiceResult<TransactWriteItem> {
    tx::delete(table_name, key(TASK_EXTERNAL_PK, external_sk(&task.external_id)), None)
}

/// All child items (reviews, final report) under a task's partition
pub async fn load_task_children(
    client: &DynamoClient,
    table_name: &str,
    task_id: &str,
) -> ServiceResult<Vec<Item>> {
    let mut items = Vec::new();
    let mut start_key = None;
    loop {
        let result = client
            .query()
            .table_name(table_name)
            .key_condition_expression("PK = :pk")
            .expression_attribute_values(":pk", s(task_children_pk(task_id)))
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

/// Delete a task with its reviews, final report and external-id guard.
/// Returns the child items so callers can clean up attachments.
pub async fn delete_task(client: &DynamoClient, table_name: &str, task_id: &str) -> ServiceResult<Vec<Item>> {
    let task = get_task(client, table_name, task_id).await?;
    let children = load_task_children(client, table_name, task_id).await?;

    let mut delete_keys: Vec<Item> = children
        .iter()
        .filter_map(|item| {
            let pk = item.get("PK")?.as_s().ok()?;
            let sk = item.get("SK")?.as_s().ok()?;
            Some(key(pk.as_str(), sk.as_str()))
        })
        .collect();
    delete_keys.push(key(TASK_EXTERNAL_PK, external_sk(&task.external_id)));
    delete_keys.push(key(TASK_PK, task_sk(task_id)));

    batch_delete_items(client, table_name, &delete_keys).await?;
    tracing::info!(task_id, deleted = delete_keys.len(), "task deleted");
    Ok(children)
}

/// Batch delete items from DynamoDB (25 items per request with retry logic)
pub async fn batch_delete_items(client: &DynamoClient, table_name: &str, delete_keys: &[Item]) -> ServiceResult<()> {
    for chunk in delete_keys.chunks(25) {
        let mut write_reqs = Vec::with_capacity(chunk.len());
        for k in chunk {
            let request = DeleteRequest::builder()
                .set_key(Some(k.clone()))
                .build()
                .map_err(|e| ServiceError::Upstream(format!("Failed to build delete request: {}", e)))?;
            write_reqs.push(WriteRequest::builder().delete_request(request).build());
        }

        let mut unprocessed = Some(write_reqs);
        let mut attempts = 0;
        while let Some(reqs) = unprocessed {
            attempts += 1;
            let result = client
                .batch_write_item()
                .request_items(table_name, reqs)
                .send()
                .await
                .map_err(|e| ServiceError::upstream("DynamoDB batch_write_item", e))?;

            unprocessed = result
                .unprocessed_items()
                .and_then(|m| m.get(table_name))
                .filter(|v| !v.is_empty())
                .cloned();

            if unprocessed.is_some() {
                if attempts >= 5 {
                    return Err(ServiceError::Upstream(format!(
                        "DynamoDB batch_write_item left {} items unprocessed",
                        unprocessed.map(|v| v.len()).unwrap_or(0)
                    )));
                }
                sleep(Duration::from_millis(100 * attempts)).await;
            }
        }
    }

    Ok(())
}

use bughunt_atoms::files;
use bughunt_atoms::item::{get_s, sk_id};
use bughunt_atoms::notify::{self, Notification};
use bughunt_atoms::reports;
use bughunt_atoms::reviews::{self, order_reviews};
use bughunt_atoms::tasks::{self, CreateTaskPayload, Task, TaskStatus, UpdateStatusPayload, UpdateTaskPayload};
use bughunt_atoms::users::{self, Role};
use bughunt_atoms::{ServiceError, ServiceResult};
use bughunt_shared::{AppState, Principal};

use crate::types::TaskDetail;

/// Who hears about a task entering a status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recipient {
    ReviewInbox,
    AdminInbox,
}

/// The hunter hears about `Deliver` only from the delivery itself.
pub fn recipient_for(target: TaskStatus) -> Option<Recipient> {
    match target {
        TaskStatus::Completed => Some(Recipient::ReviewInbox),
        TaskStatus::Reviewed => Some(Recipient::AdminInbox),
        TaskStatus::Unclaimed | TaskStatus::InProgress | TaskStatus::Deliver => None,
    }
}

pub(crate) async fn owner_email(state: &AppState, owner: &str) -> Option<String> {
    if owner.is_empty() {
        return None;
    }
    match users::get_user(&state.dynamo_client, state.table(), owner).await {
        Ok(user) => Some(user.email),
        Err(e) => {
            tracing::warn!(owner, error = %e, "no email for task owner; skipping notification");
            None
        }
    }
}

/// The outbox message for a status change, if anybody should hear about it.
fn status_notification(state: &AppState, task: &Task, target: TaskStatus, actor: &str) -> Option<Notification> {
    match recipient_for(target)? {
        Recipient::ReviewInbox => Some(Notification::task_completed(task, &state.config.review_inbox_email)),
        Recipient::AdminInbox => Some(Notification::task_reviewed(task, actor, &state.config.admin_email)),
    }
}

pub async fn list_tasks(state: &AppState) -> ServiceResult<Vec<Task>> {
    tasks::load_tasks(&state.dynamo_client, state.table()).await
}

/// Task joined with its reviews and final report, read concurrently.
pub async fn get_task_detail(state: &AppState, task_id: &str) -> ServiceResult<TaskDetail> {
    let client = &state.dynamo_client;
    let table = state.table();
    let (task, task_reviews, final_report) = tokio::join!(
        tasks::get_task(client, table, task_id),
        reviews::load_reviews_for_task(client, table, task_id),
        reports::get_final_report(client, table, task_id),
    );
    let task = task?;
    Ok(TaskDetail {
        reviews: order_reviews(&task, task_reviews?),
        final_report: final_report?,
        task,
    })
}

pub async fn create_task(state: &AppState, principal: &Principal, payload: CreateTaskPayload) -> ServiceResult<Task> {
    principal.require(&[Role::Admin])?;
    tasks::create_task(&state.dynamo_client, state.table(), payload).await
}

pub async fn update_task(
    state: &AppState,
    principal: &Principal,
    task_id: &str,
    payload: UpdateTaskPayload,
) -> ServiceResult<Task> {
    principal.require(&[Role::Admin])?;
    tasks::update_task_fields(&state.dynamo_client, state.table(), task_id, payload).await
}

/// Attachments of the review items under a task partition, keyed by the
/// review that claimed them.
pub fn review_attachments(children: &[bughunt_atoms::item::Item]) -> Vec<(String, Vec<String>)> {
    children
        .iter()
        .filter(|item| sk_id(item, "REVIEW#").is_some())
        .map(|item| {
            let file_ids = [get_s(item, "script_file_id"), get_s(item, "support_file_id")]
                .into_iter()
                .filter(|id| !id.is_empty())
                .collect();
            (get_s(item, "SK"), file_ids)
        })
        .collect()
}

/// Delete a task with everything under it, then its review attachments.
pub async fn delete_task(state: &AppState, principal: &Principal, task_id: &str) -> ServiceResult<()> {
    principal.require(&[Role::Admin])?;
    let children = tasks::delete_task(&state.dynamo_client, state.table(), task_id).await?;
    for (owner_ref, file_ids) in review_attachments(&children) {
        files::delete_files_quietly(
            &state.dynamo_client,
            &state.s3_client,
            state.table(),
            state.bucket(),
            &owner_ref,
            &file_ids,
        )
        .await;
    }
    Ok(())
}

/// Move a task one step along the workflow.
///
/// Role and status-string checks run before any read; ownership and the
/// current status are enforced by the conditional write itself.
pub async fn change_status(
    state: &AppState,
    principal: &Principal,
    task_id: &str,
    target: TaskStatus,
) -> ServiceResult<Task> {
    target.authorize_entry(principal.role)?;

    let task = tasks::get_task(&state.dynamo_client, state.table(), task_id).await?;
    if target == TaskStatus::Completed && principal.role == Role::Hunter && task.owner != principal.username {
        return Err(ServiceError::Forbidden(format!(
            "Task '{}' belongs to another hunter",
            task.external_id
        )));
    }
    task.status.check_transition(target)?;

    let mut extra_writes = Vec::new();
    let mut preview = task.clone();
    preview.status = target;
    if let Some(notification) = status_notification(state, &preview, target, &principal.username) {
        extra_writes.push(notify::queue_write(
            state.table(),
            &notification,
            state.config.notification_ttl_days,
        )?);
    }

    tasks::transition_task(
        &state.dynamo_client,
        state.table(),
        &task,
        target,
        &principal.username,
        principal.role,
        extra_writes,
    )
    .await
}

pub async fn update_status(
    state: &AppState,
    principal: &Principal,
    task_id: &str,
    payload: UpdateStatusPayload,
) -> ServiceResult<Task> {
    let target: TaskStatus = payload.status.trim().parse()?;
    change_status(state, principal, task_id, target).await
}

pub async fn claim_task(state: &AppState, principal: &Principal, task_id: &str) -> ServiceResult<Task> {
    change_status(state, principal, task_id, TaskStatus::InProgress).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use bughunt_atoms::item::{key, review_sk, s, task_children_pk, FINAL_REPORT_SK};

    #[test]
    fn each_forward_step_has_its_audience() {
        assert_eq!(recipient_for(TaskStatus::InProgress), None);
        assert_eq!(recipient_for(TaskStatus::Completed), Some(Recipient::ReviewInbox));
        assert_eq!(recipient_for(TaskStatus::Reviewed), Some(Recipient::AdminInbox));
    }

    #[test]
    fn status_change_to_deliver_sends_nothing() {
        // the owner's "delivered" email is queued by the delivery transaction
        assert_eq!(recipient_for(TaskStatus::Deliver), None);
    }

    #[test]
    fn attachments_come_from_reviews_only() {
        let mut review = key(task_children_pk("t-1"), review_sk("r1"));
        review.insert("script_file_id".into(), s("f-script"));
        review.insert("support_file_id".into(), s("f-support"));
        let mut report = key(task_children_pk("t-1"), FINAL_REPORT_SK);
        report.insert("script_file_id".into(), s("ignored"));

        assert_eq!(
            review_attachments(&[review, report]),
            vec![("REVIEW#r1".to_string(), vec!["f-script".to_string(), "f-support".to_string()])]
        );
    }
}

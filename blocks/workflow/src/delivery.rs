use bughunt_atoms::delivered::{self, DeliveredTask};
use bughunt_atoms::notify::{self, Notification};
use bughunt_atoms::reports;
use bughunt_atoms::reviews::{self, order_reviews};
use bughunt_atoms::tasks::{self, TaskStatus};
use bughunt_atoms::users::Role;
use bughunt_atoms::{ServiceError, ServiceResult};
use bughunt_shared::{AppState, Principal};

use crate::tasks::owner_email;

/// Move a reviewed task into the delivered set.
///
/// The snapshot, every delete and the owner's notification commit in one
/// transaction conditioned on the task version read here.
pub async fn deliver_task(state: &AppState, principal: &Principal, task_id: &str) -> ServiceResult<DeliveredTask> {
    principal.require(&[Role::Admin])?;

    let client = &state.dynamo_client;
    let table = state.table();
    let (task, task_reviews, final_report) = tokio::join!(
        tasks::get_task(client, table, task_id),
        reviews::load_reviews_for_task(client, table, task_id),
        reports::get_final_report(client, table, task_id),
    );
    let task = task?;
    if !matches!(task.status, TaskStatus::Reviewed | TaskStatus::Deliver) {
        return Err(ServiceError::Conflict(format!(
            "Task '{}' is {}; only reviewed tasks can be delivered",
            task.external_id, task.status
        )));
    }

    let mut snapshot_task = task.clone();
    snapshot_task.status = TaskStatus::Deliver;
    let delivered = DeliveredTask {
        reviews: order_reviews(&task, task_reviews?),
        final_report: final_report?,
        delivered_at: chrono::Utc::now().to_rfc3339(),
        delivered_by: principal.username.clone(),
        task: snapshot_task,
    };

    let to = owner_email(state, &task.owner)
        .await
        .unwrap_or_else(|| state.config.admin_email.clone());
    let outbox = notify::queue_write(
        table,
        &Notification::task_delivered(&delivered.task, &to),
        state.config.notification_ttl_days,
    )?;

    delivered::deliver_task(client, table, &delivered, outbox).await?;
    Ok(delivered)
}

pub async fn list_delivered(state: &AppState) -> ServiceResult<Vec<DeliveredTask>> {
    delivered::load_delivered(&state.dynamo_client, state.table()).await
}

pub async fn get_delivered(state: &AppState, task_id: &str) -> ServiceResult<DeliveredTask> {
    delivered::get_delivered(&state.dynamo_client, state.table(), task_id).await
}

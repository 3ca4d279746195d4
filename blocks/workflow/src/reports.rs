use bughunt_atoms::reports::{self, merge_report, FinalReport, UpsertFinalReportPayload};
use bughunt_atoms::tasks::{self, TaskStatus};
use bughunt_atoms::users::Role;
use bughunt_atoms::{ServiceError, ServiceResult};
use bughunt_shared::{AppState, Principal};

/// Create or update a task's final report according to the caller's role.
pub async fn upsert_final_report(
    state: &AppState,
    principal: &Principal,
    payload: UpsertFinalReportPayload,
) -> ServiceResult<FinalReport> {
    let client = &state.dynamo_client;
    let table = state.table();
    let (task, existing) = tokio::join!(
        tasks::get_task(client, table, &payload.task_id),
        reports::get_final_report(client, table, &payload.task_id),
    );
    let task = task?;

    if principal.role == Role::Hunter {
        if task.owner != principal.username {
            return Err(ServiceError::Forbidden(format!(
                "Task '{}' is not claimed by you",
                task.external_id
            )));
        }
        if task.status == TaskStatus::Unclaimed {
            return Err(ServiceError::Conflict(format!("Task '{}' is not claimed", task.external_id)));
        }
    }

    let now = chrono::Utc::now().to_rfc3339();
    let existing = existing?;
    let read_updated_at = existing.as_ref().map(|r| r.updated_at.clone());
    let report = merge_report(existing, payload, &principal.username, principal.role, &now)?;
    reports::save_final_report(client, table, &report, read_updated_at.as_deref()).await?;
    Ok(report)
}

pub async fn get_final_report(state: &AppState, task_id: &str) -> ServiceResult<FinalReport> {
    reports::get_final_report(&state.dynamo_client, state.table(), task_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Final report for task '{}'", task_id)))
}

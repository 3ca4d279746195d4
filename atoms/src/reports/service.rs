use aws_sdk_dynamodb::types::TransactWriteItem;
use aws_sdk_dynamodb::Client as DynamoClient;
use std::collections::HashMap;

use super::model::{FinalReport, UpsertFinalReportPayload};
use crate::error::{ServiceError, ServiceResult};
use crate::feedback::Feedback;
use crate::item::{get_s, key, s, task_children_pk, Item, FINAL_REPORT_SK};
use crate::tasks::service::mark_final_report_write;
use crate::tx;
use crate::users::model::Role;

/// Longest accepted report summary.
pub const MAX_SUMMARY_BYTES: usize = 20_000;

pub fn report_to_item(report: &FinalReport) -> Item {
    let mut item = key(task_children_pk(&report.task_id), FINAL_REPORT_SK);
    item.insert("task_id".into(), s(&report.task_id));
    item.insert("summary".into(), s(&report.summary));
    item.insert("difficulty".into(), s(report.difficulty.as_str()));
    item.insert("updated_by".into(), s(&report.updated_by));
    item.insert("updated_at".into(), s(&report.updated_at));
    report.feedback.write_to(&mut item);
    item
}

pub fn report_from_item(item: &Item) -> ServiceResult<FinalReport> {
    Ok(FinalReport {
        task_id: get_s(item, "task_id"),
        summary: get_s(item, "summary"),
        difficulty: get_s(item, "difficulty").parse()?,
        updated_by: get_s(item, "updated_by"),
        feedback: Feedback::read_from(item),
        updated_at: get_s(item, "updated_at"),
    })
}

/// Merge an upsert into the existing report according to the author's role.
///
/// Hunters own summary and difficulty; coaches and admins only write their
/// feedback field. A new report needs both summary and difficulty.
pub fn merge_report(
    existing: Option<FinalReport>,
    payload: UpsertFinalReportPayload,
    author: &str,
    role: Role,
    now: &str,
) -> ServiceResult<FinalReport> {
    if role == Role::Hunter && payload.feedback.is_some() {
        return Err(ServiceError::Forbidden("Hunters cannot leave reviewer feedback".into()));
    }
    if role != Role::Hunter && (payload.summary.is_some() || payload.difficulty.is_some()) {
        return Err(ServiceError::Forbidden(
            "Only the hunter writes the summary and difficulty".into(),
        ));
    }

    if payload.summary.as_ref().is_some_and(|s| s.len() > MAX_SUMMARY_BYTES) {
        return Err(ServiceError::Validation(format!(
            "summary is longer than {} bytes",
            MAX_SUMMARY_BYTES
        )));
    }

    let mut report = match existing {
        Some(report) => report,
        None => {
            let summary = payload.summary.clone().filter(|s| !s.trim().is_empty());
            match (summary, payload.difficulty) {
                (Some(summary), Some(difficulty)) => FinalReport {
                    task_id: payload.task_id.clone(),
                    summary,
                    difficulty,
                    updated_by: author.to_string(),
                    feedback: Feedback::default(),
                    updated_at: now.to_string(),
                },
                _ => {
                    return Err(ServiceError::Validation(
                        "A new final report needs summary and difficulty".into(),
                    ))
                }
            }
        }
    };

    if let Some(summary) = payload.summary {
        if summary.trim().is_empty() {
            return Err(ServiceError::Validation("summary cannot be empty".into()));
        }
        report.summary = summary;
    }
    if let Some(difficulty) = payload.difficulty {
        report.difficulty = difficulty;
    }
    if let Some(feedback) = payload.feedback {
        report.feedback.set(role, &feedback)?;
    }
    report.updated_by = author.to_string();
    report.updated_at = now.to_string();
    Ok(report)
}

/// Get the final report of a task, if one exists
pub async fn get_final_report(
    client: &DynamoClient,
    table_name: &str,
    task_id: &str,
) -> ServiceResult<Option<FinalReport>> {
    let result = client
        .get_item()
        .table_name(table_name)
        .set_key(Some(key(task_children_pk(task_id), FINAL_REPORT_SK)))
        .consistent_read(true)
        .send()
        .await
        .map_err(|e| ServiceError::upstream("DynamoDB get_item", e))?;

    result.item().map(report_from_item).transpose()
}

/// Report put plus the task flag. The put only lands over the version that
/// was read: a new report must still be absent, an edit must still carry
/// the `updated_at` it was merged from.
pub fn upsert_writes(
    table_name: &str,
    report: &FinalReport,
    read_updated_at: Option<&str>,
) -> ServiceResult<Vec<TransactWriteItem>> {
    let item = report_to_item(report);
    let put = match read_updated_at {
        None => tx::put(table_name, item, Some("attribute_not_exists(PK)"))?,
        Some(read) => tx::put_if(
            table_name,
            item,
            "updated_at = :read",
            HashMap::from([(":read".to_string(), s(read))]),
        )?,
    };
    Ok(vec![put, mark_final_report_write(table_name, &report.task_id)?])
}

/// Store the report and flag the task in one transaction
pub async fn save_final_report(
    client: &DynamoClient,
    table_name: &str,
    report: &FinalReport,
    read_updated_at: Option<&str>,
) -> ServiceResult<()> {
    let writes = upsert_writes(table_name, report, read_updated_at)?;
    tx::commit_or(client, writes, |failed| {
        if failed.contains(&0) {
            ServiceError::Conflict(format!(
                "Final report of task '{}' changed while it was being saved; retry",
                report.task_id
            ))
        } else {
            ServiceError::NotFound(format!("Task '{}'", report.task_id))
        }
    })
    .await?;
    tracing::info!(task_id = %report.task_id, updated_by = %report.updated_by, "final report saved");
    Ok(())
}

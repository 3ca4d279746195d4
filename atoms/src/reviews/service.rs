use aws_sdk_dynamodb::types::TransactWriteItem;
use aws_sdk_dynamodb::Client as DynamoClient;
use std::collections::HashMap;

use super::model::{CreateReviewPayload, Review};
use crate::error::{ServiceError, ServiceResult};
use crate::feedback::{Feedback, ADMIN_ATTRIBUTE, COACH_ATTRIBUTE, LEGACY_ATTRIBUTE};
use crate::files::model::FilePurpose;
use crate::files::service::attach_write;
use crate::item::{get_s, key, opt_s, review_sk, s, sk_id, task_children_pk, Item};
use crate::tasks::model::Task;
use crate::tasks::service::{append_review_write, remove_review_write, touch_task_write};
use crate::tx::{self, UpdateSpec};
use crate::users::model::Role;

pub fn review_to_item(review: &Review) -> Item {
    let mut item = key(task_children_pk(&review.task_id), review_sk(&review.review_id));
    item.insert("task_id".into(), s(&review.task_id));
    item.insert("observed_behavior".into(), s(&review.observed_behavior));
    item.insert("vulnerabilities".into(), s(&review.vulnerabilities));
    item.insert("script_file_id".into(), s(&review.script_file_id));
    item.insert("support_file_id".into(), s(&review.support_file_id));
    item.insert("reviewer_name".into(), s(&review.reviewer_name));
    item.insert("created_at".into(), s(&review.created_at));
    item.insert("updated_at".into(), s(&review.updated_at));
    review.feedback.write_to(&mut item);
    item
}

pub fn review_from_item(item: &Item) -> Option<Review> {
    let review_id = sk_id(item, "REVIEW#")?;
    Some(Review {
        review_id,
        task_id: get_s(item, "task_id"),
        observed_behavior: get_s(item, "observed_behavior"),
        vulnerabilities: get_s(item, "vulnerabilities"),
        script_file_id: get_s(item, "script_file_id"),
        support_file_id: get_s(item, "support_file_id"),
        reviewer_name: get_s(item, "reviewer_name"),
        feedback: Feedback::read_from(item),
        created_at: get_s(item, "created_at"),
        updated_at: get_s(item, "updated_at"),
    })
}

/// Order reviews to match the task's `review_ids` list; strays go last.
pub fn order_reviews(task: &Task, mut reviews: Vec<Review>) -> Vec<Review> {
    reviews.sort_by_key(|r| {
        (
            task.review_ids
                .iter()
                .position(|id| *id == r.review_id)
                .unwrap_or(usize::MAX),
            r.created_at.clone(),
        )
    });
    reviews
}

/// Writes for a new review: the review item, its id appended to the task and
/// both attachments claimed for it.
pub fn create_writes(table_name: &str, review: &Review) -> ServiceResult<Vec<TransactWriteItem>> {
    let owner_ref = review_sk(&review.review_id);
    Ok(vec![
        tx::put(table_name, review_to_item(review), Some("attribute_not_exists(PK)"))?,
        append_review_write(table_name, &review.task_id, &review.review_id, &review.reviewer_name)?,
        attach_write(
            table_name,
            &review.script_file_id,
            &owner_ref,
            Some(&review.reviewer_name),
            FilePurpose::ReviewScript,
        )?,
        attach_write(
            table_name,
            &review.support_file_id,
            &owner_ref,
            Some(&review.reviewer_name),
            FilePurpose::ReviewSupport,
        )?,
    ])
}

fn create_conflict(review: &Review, failed: &[usize]) -> ServiceError {
    if failed.contains(&1) {
        ServiceError::Conflict(format!(
            "Task '{}' no longer accepts reviews from {}",
            review.task_id, review.reviewer_name
        ))
    } else if failed.iter().any(|index| *index >= 2) {
        ServiceError::Conflict("An attachment is missing or already used by another record".into())
    } else {
        ServiceError::Conflict(format!("Review '{}' already exists", review.review_id))
    }
}

/// Create a review, link it to its task and claim its attachments in one transaction
pub async fn create_review(
    client: &DynamoClient,
    table_name: &str,
    reviewer_name: &str,
    payload: CreateReviewPayload,
) -> ServiceResult<Review> {
    payload.validate()?;
    let now = chrono::Utc::now().to_rfc3339();
    let review = Review {
        review_id: uuid::Uuid::new_v4().to_string(),
        task_id: payload.task_id,
        observed_behavior: payload.observed_behavior,
        vulnerabilities: payload.vulnerabilities,
        script_file_id: payload.script_file_id,
        support_file_id: payload.support_file_id,
        reviewer_name: reviewer_name.to_string(),
        feedback: Feedback::default(),
        created_at: now.clone(),
        updated_at: now,
    };

    let writes = create_writes(table_name, &review)?;
    tx::commit_or(client, writes, |failed| create_conflict(&review, failed)).await?;

    tracing::info!(review_id = %review.review_id, task_id = %review.task_id, reviewer_name, "review created");
    Ok(review)
}

/// Load all reviews stored under a task
pub async fn load_reviews_for_task(
    client: &DynamoClient,
    table_name: &str,
    task_id: &str,
) -> ServiceResult<Vec<Review>> {
    let mut reviews = Vec::new();
    let mut start_key = None;
    loop {
        let result = client
            .query()
            .table_name(table_name)
            .key_condition_expression("PK = :pk AND begins_with(SK, :sk_prefix)")
            .expression_attribute_values(":pk", s(task_children_pk(task_id)))
            .expression_attribute_values(":sk_prefix", s("REVIEW#"))
            .set_exclusive_start_key(start_key)
            .send()
            .await
            .map_err(|e| ServiceError::upstream("DynamoDB query", e))?;

        reviews.extend(result.items().iter().filter_map(review_from_item));

        start_key = result.last_evaluated_key().cloned();
        if start_key.is_none() {
            break;
        }
    }
    Ok(reviews)
}

async fn get_review_item(
    client: &DynamoClient,
    table_name: &str,
    task_id: &str,
    review_id: &str,
) -> ServiceResult<Item> {
    let result = client
        .get_item()
        .table_name(table_name)
        .set_key(Some(key(task_children_pk(task_id), review_sk(review_id))))
        .consistent_read(true)
        .send()
        .await
        .map_err(|e| ServiceError::upstream("DynamoDB get_item", e))?;

    result
        .item()
        .cloned()
        .ok_or_else(|| ServiceError::NotFound(format!("Review '{}'", review_id)))
}

/// Get a specific review
pub async fn get_review(
    client: &DynamoClient,
    table_name: &str,
    task_id: &str,
    review_id: &str,
) -> ServiceResult<Review> {
    let item = get_review_item(client, table_name, task_id, review_id).await?;
    review_from_item(&item).ok_or_else(|| ServiceError::NotFound(format!("Review '{}'", review_id)))
}

struct Assignments {
    set: Vec<String>,
    remove: Vec<String>,
    values: Item,
}

impl Assignments {
    fn new(now: &str) -> Self {
        Assignments {
            set: vec!["updated_at = :now".to_string()],
            remove: Vec::new(),
            values: HashMap::from([(":now".to_string(), s(now))]),
        }
    }

    fn assign(&mut self, attribute: &str, value: Option<&str>) {
        match value {
            Some(text) => {
                self.set.push(format!("{0} = :{0}", attribute));
                self.values.insert(format!(":{}", attribute), s(text));
            }
            None => self.remove.push(attribute.to_string()),
        }
    }

    fn expression(&self) -> String {
        let mut expression = format!("SET {}", self.set.join(", "));
        if !self.remove.is_empty() {
            expression.push_str(&format!(" REMOVE {}", self.remove.join(", ")));
        }
        expression
    }
}

/// Writes recording one role's feedback on a stored review, plus a task
/// version bump so a delivery in flight cannot freeze the old text.
///
/// Only the author's attribute is touched. A review still holding the legacy
/// combined string is migrated whole, guarded on that string being unchanged.
pub fn feedback_writes(
    table_name: &str,
    stored: &Item,
    role: Role,
    text: &str,
    now: &str,
) -> ServiceResult<Vec<TransactWriteItem>> {
    let review = review_from_item(stored)
        .ok_or_else(|| ServiceError::Upstream("Review item without REVIEW# sort key".into()))?;
    let attribute = Feedback::attribute_for(role)
        .ok_or_else(|| ServiceError::Forbidden("Hunters cannot leave reviewer feedback".into()))?;
    let mut feedback = review.feedback.clone();
    feedback.set(role, text)?;

    let mut changes = Assignments::new(now);
    let condition = match opt_s(stored, LEGACY_ATTRIBUTE) {
        Some(legacy) => {
            changes.assign(COACH_ATTRIBUTE, feedback.coach.as_deref());
            changes.assign(ADMIN_ATTRIBUTE, feedback.admin.as_deref());
            changes.remove.push(LEGACY_ATTRIBUTE.to_string());
            changes.values.insert(":legacy".to_string(), s(legacy));
            "feedback = :legacy"
        }
        None => {
            changes.assign(attribute, feedback.for_role(role));
            "attribute_exists(PK) AND attribute_not_exists(feedback)"
        }
    };

    Ok(vec![
        tx::update(
            table_name,
            key(task_children_pk(&review.task_id), review_sk(&review.review_id)),
            UpdateSpec {
                expression: changes.expression(),
                condition: Some(condition.to_string()),
                names: HashMap::new(),
                values: changes.values,
            },
        )?,
        touch_task_write(table_name, &review.task_id, now)?,
    ])
}

/// Set the author's feedback field, leaving the other role's feedback intact.
pub async fn set_review_feedback(
    client: &DynamoClient,
    table_name: &str,
    task_id: &str,
    review_id: &str,
    role: Role,
    text: &str,
) -> ServiceResult<Review> {
    let stored = get_review_item(client, table_name, task_id, review_id).await?;
    let now = chrono::Utc::now().to_rfc3339();
    let writes = feedback_writes(table_name, &stored, role, text, &now)?;
    tx::commit_or(client, writes, |failed| {
        if failed.contains(&0) {
            ServiceError::Conflict(format!("Review '{}' changed while feedback was saved; retry", review_id))
        } else {
            ServiceError::NotFound(format!("Task '{}'", task_id))
        }
    })
    .await?;

    tracing::info!(review_id, role = %role, "review feedback updated");
    get_review(client, table_name, task_id, review_id).await
}

/// Delete a review and unlink it from its task in one transaction.
pub async fn delete_review(
    client: &DynamoClient,
    table_name: &str,
    task: &Task,
    review_id: &str,
) -> ServiceResult<()> {
    let writes = vec![
        tx::delete(
            table_name,
            key(task_children_pk(&task.task_id), review_sk(review_id)),
            Some("attribute_exists(PK)"),
        )?,
        remove_review_write(table_name, task, review_id)?,
    ];
    tx::commit_or(client, writes, |_| {
        ServiceError::Conflict(format!(
            "Review '{}' changed while it was being deleted; retry",
            review_id
        ))
    })
    .await?;
    tracing::info!(review_id, task_id = %task.task_id, "review deleted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::model::TaskStatus;

    fn review(id: &str, created_at: &str) -> Review {
        Review {
            review_id: id.into(),
            task_id: "t-1".into(),
            observed_behavior: "Login form leaks user existence".into(),
            vulnerabilities: "CWE-204".into(),
            script_file_id: "f-script".into(),
            support_file_id: "f-support".into(),
            reviewer_name: "ivy".into(),
            feedback: Feedback {
                coach: Some("clear repro".into()),
                admin: None,
            },
            created_at: created_at.into(),
            updated_at: created_at.into(),
        }
    }

    fn task_with(ids: &[&str]) -> Task {
        Task {
            task_id: "t-1".into(),
            external_id: "BH-1".into(),
            project_name: "Portal".into(),
            industry: String::new(),
            domain_link: String::new(),
            tool_link: String::new(),
            status: TaskStatus::InProgress,
            owner: "ivy".into(),
            review_ids: ids.iter().map(|s| s.to_string()).collect(),
            final_report: false,
            version: 2,
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    #[test]
    fn review_item_roundtrip_keeps_feedback() {
        let original = review("r1", "2026-04-01T00:00:00Z");
        let item = review_to_item(&original);
        assert_eq!(get_s(&item, "PK"), "TASK#t-1");
        assert_eq!(get_s(&item, "SK"), "REVIEW#r1");
        assert_eq!(review_from_item(&item), Some(original));
    }

    #[test]
    fn reviews_follow_task_order() {
        let task = task_with(&["r2", "r1"]);
        let ordered = order_reviews(
            &task,
            vec![
                review("stray", "2026-04-01T00:00:00Z"),
                review("r1", "2026-04-02T00:00:00Z"),
                review("r2", "2026-04-03T00:00:00Z"),
            ],
        );
        let ids: Vec<_> = ordered.iter().map(|r| r.review_id.as_str()).collect();
        assert_eq!(ids, vec!["r2", "r1", "stray"]);
    }

    #[test]
    fn creation_links_review_to_task() {
        let writes = create_writes("bughunt", &review("r1", "2026-04-01T00:00:00Z")).unwrap();
        assert_eq!(writes.len(), 4);
        assert!(writes[0].put().is_some());
        let link = writes[1].update().expect("task update");
        assert!(link.update_expression().contains("list_append"));
        assert!(link.condition_expression().unwrap().contains("#owner = :me"));
        assert_eq!(get_s(link.key(), "SK"), "TASK#t-1");
    }

    #[test]
    fn creation_claims_both_attachments() {
        let writes = create_writes("bughunt", &review("r1", "2026-04-01T00:00:00Z")).unwrap();
        for (write, file_id) in writes[2..].iter().zip(["f-script", "f-support"]) {
            let claim = write.update().expect("file update");
            assert_eq!(get_s(claim.key(), "SK"), format!("FILE#{}", file_id));
            assert!(claim.condition_expression().unwrap().contains("attribute_not_exists(attached_to)"));
            assert_eq!(
                claim.expression_attribute_values().unwrap().get(":owner"),
                Some(&s("REVIEW#r1"))
            );
        }
    }

    #[test]
    fn create_conflicts_name_the_failed_guard() {
        let r = review("r1", "2026-04-01T00:00:00Z");
        assert!(create_conflict(&r, &[1]).to_string().contains("no longer accepts reviews"));
        assert!(create_conflict(&r, &[3]).to_string().contains("attachment"));
    }

    #[test]
    fn feedback_sets_only_the_authors_attribute() {
        let stored = review_to_item(&review("r1", "2026-04-01T00:00:00Z"));
        let writes = feedback_writes("bughunt", &stored, Role::Admin, "ship it", "2026-04-05T00:00:00Z").unwrap();
        let update = writes[0].update().unwrap();
        assert_eq!(update.update_expression(), "SET updated_at = :now, admin_feedback = :admin_feedback");
        assert_eq!(
            update.condition_expression(),
            Some("attribute_exists(PK) AND attribute_not_exists(feedback)")
        );
        let values = update.expression_attribute_values().unwrap();
        assert!(!values.contains_key(":coach_feedback"));

        let cleared = feedback_writes("bughunt", &stored, Role::Coach, " ", "2026-04-05T00:00:00Z").unwrap();
        assert_eq!(
            cleared[0].update().unwrap().update_expression(),
            "SET updated_at = :now REMOVE coach_feedback"
        );
    }

    #[test]
    fn feedback_bumps_task_version_in_same_transaction() {
        let stored = review_to_item(&review("r1", "2026-04-01T00:00:00Z"));
        let writes = feedback_writes("bughunt", &stored, Role::Coach, "good", "2026-04-05T00:00:00Z").unwrap();
        assert_eq!(writes.len(), 2);
        let task = writes[1].update().unwrap();
        assert_eq!(get_s(task.key(), "SK"), "TASK#t-1");
        assert!(task.update_expression().contains("version = version + :one"));
    }

    #[test]
    fn legacy_feedback_migrates_under_a_guard() {
        let mut stored = review_to_item(&review("r1", "2026-04-01T00:00:00Z"));
        stored.remove("coach_feedback");
        stored.insert("feedback".into(), s("[COACH FEEDBACK] old note"));
        let writes = feedback_writes("bughunt", &stored, Role::Admin, "approved", "2026-04-05T00:00:00Z").unwrap();
        let update = writes[0].update().unwrap();
        assert_eq!(update.condition_expression(), Some("feedback = :legacy"));
        assert!(update.update_expression().contains("coach_feedback = :coach_feedback"));
        assert!(update.update_expression().ends_with("REMOVE feedback"));
        let values = update.expression_attribute_values().unwrap();
        assert_eq!(values.get(":coach_feedback"), Some(&s("old note")));
        assert_eq!(values.get(":admin_feedback"), Some(&s("approved")));
    }

    #[test]
    fn hunters_cannot_write_feedback() {
        let stored = review_to_item(&review("r1", "2026-04-01T00:00:00Z"));
        assert!(matches!(
            feedback_writes("bughunt", &stored, Role::Hunter, "me", "now"),
            Err(ServiceError::Forbidden(_))
        ));
    }
}

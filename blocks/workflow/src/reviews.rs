use bughunt_atoms::files::{self, FilePurpose, StoredFile};
use bughunt_atoms::item::review_sk;
use bughunt_atoms::reviews::{self, order_reviews, CreateReviewPayload, FeedbackPayload, Review};
use bughunt_atoms::tasks::{self, Task, TaskStatus};
use bughunt_atoms::users::Role;
use bughunt_atoms::{ServiceError, ServiceResult};
use bughunt_shared::{AppState, Principal};

/// Tasks accept new reviews while the hunter is still working on them.
pub fn accepts_reviews(task: &Task) -> bool {
    matches!(task.status, TaskStatus::InProgress | TaskStatus::Completed)
}

/// An attachment must be the caller's own unused upload for the right slot.
/// The create transaction re-checks all of this when it claims the file.
pub fn check_attachment(file: &StoredFile, uploader: &str, purpose: FilePurpose) -> ServiceResult<()> {
    if file.uploaded_by != uploader {
        return Err(ServiceError::Forbidden(format!(
            "File '{}' was uploaded by someone else",
            file.file_id
        )));
    }
    if file.purpose != purpose {
        return Err(ServiceError::Validation(format!(
            "File '{}' was uploaded as {}, expected {}",
            file.file_id,
            file.purpose.as_str(),
            purpose.as_str()
        )));
    }
    if file.attached_to.is_some() {
        return Err(ServiceError::Conflict(format!(
            "File '{}' is already attached to another record",
            file.file_id
        )));
    }
    Ok(())
}

pub async fn create_review(
    state: &AppState,
    principal: &Principal,
    payload: CreateReviewPayload,
) -> ServiceResult<Review> {
    principal.require(&[Role::Hunter])?;
    payload.validate()?;

    let client = &state.dynamo_client;
    let table = state.table();
    let (task, script, support) = tokio::join!(
        tasks::get_task(client, table, &payload.task_id),
        files::get_file(client, table, &payload.script_file_id),
        files::get_file(client, table, &payload.support_file_id),
    );
    let task = task?;
    if task.owner != principal.username {
        return Err(ServiceError::Forbidden(format!(
            "Task '{}' is not claimed by you",
            task.external_id
        )));
    }
    if !accepts_reviews(&task) {
        return Err(ServiceError::Conflict(format!(
            "Task '{}' is {} and no longer accepts reviews",
            task.external_id, task.status
        )));
    }
    check_attachment(&script?, &principal.username, FilePurpose::ReviewScript)?;
    check_attachment(&support?, &principal.username, FilePurpose::ReviewSupport)?;

    reviews::create_review(client, table, &principal.username, payload).await
}

pub async fn list_reviews_for_task(state: &AppState, task_id: &str) -> ServiceResult<Vec<Review>> {
    let client = &state.dynamo_client;
    let table = state.table();
    let (task, task_reviews) = tokio::join!(
        tasks::get_task(client, table, task_id),
        reviews::load_reviews_for_task(client, table, task_id),
    );
    Ok(order_reviews(&task?, task_reviews?))
}

pub async fn get_review(state: &AppState, task_id: &str, review_id: &str) -> ServiceResult<Review> {
    reviews::get_review(&state.dynamo_client, state.table(), task_id, review_id).await
}

pub async fn set_feedback(
    state: &AppState,
    principal: &Principal,
    task_id: &str,
    review_id: &str,
    payload: FeedbackPayload,
) -> ServiceResult<Review> {
    principal.require(&[Role::Coach, Role::Admin])?;
    reviews::set_review_feedback(
        &state.dynamo_client,
        state.table(),
        task_id,
        review_id,
        principal.role,
        &payload.feedback,
    )
    .await
}

/// Remove a review, then its two attachments. Attachment failures are only logged.
pub async fn delete_review(
    state: &AppState,
    principal: &Principal,
    task_id: &str,
    review_id: &str,
) -> ServiceResult<()> {
    let client = &state.dynamo_client;
    let table = state.table();
    let (task, review) = tokio::join!(
        tasks::get_task(client, table, task_id),
        reviews::get_review(client, table, task_id, review_id),
    );
    let (task, review) = (task?, review?);
    principal.require_owner_or_admin(&review.reviewer_name)?;

    reviews::delete_review(client, table, &task, review_id).await?;
    files::delete_files_quietly(
        client,
        &state.s3_client,
        table,
        state.bucket(),
        &review_sk(review_id),
        &[review.script_file_id, review.support_file_id],
    )
    .await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(uploaded_by: &str, purpose: FilePurpose) -> StoredFile {
        StoredFile {
            file_id: "f-1".into(),
            filename: "poc.sh".into(),
            content_type: "text/x-shellscript".into(),
            s3_key: "uploads/review_script/f-1/poc.sh".into(),
            uploaded_by: uploaded_by.into(),
            purpose,
            created_at: "2026-02-01T00:00:00Z".into(),
            attached_to: None,
        }
    }

    #[test]
    fn attachments_must_be_own_upload_in_right_slot() {
        assert!(check_attachment(&file("hank", FilePurpose::ReviewScript), "hank", FilePurpose::ReviewScript).is_ok());
        assert!(matches!(
            check_attachment(&file("gina", FilePurpose::ReviewScript), "hank", FilePurpose::ReviewScript),
            Err(ServiceError::Forbidden(_))
        ));
        assert!(matches!(
            check_attachment(&file("hank", FilePurpose::Doc), "hank", FilePurpose::ReviewSupport),
            Err(ServiceError::Validation(_))
        ));
    }

    #[test]
    fn attachments_already_in_use_are_refused() {
        let mut used = file("hank", FilePurpose::ReviewScript);
        used.attached_to = Some("REVIEW#r-other".into());
        assert!(matches!(
            check_attachment(&used, "hank", FilePurpose::ReviewScript),
            Err(ServiceError::Conflict(_))
        ));
    }
}

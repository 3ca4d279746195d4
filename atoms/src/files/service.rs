use aws_sdk_dynamodb::types::TransactWriteItem;
use aws_sdk_dynamodb::Client as DynamoClient;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::Client as S3Client;
use std::collections::HashMap;
use std::time::Duration;

use super::model::{CreateUploadPayload, FilePurpose, StoredFile};
use crate::error::{ServiceError, ServiceResult};
use crate::item::{file_sk, get_s, key, opt_s, put_opt, s, sk_id, Item, FILE_PK};
use crate::tx::{self, UpdateSpec};

pub const UPLOAD_URL_TTL: Duration = Duration::from_secs(15 * 60);
pub const DOWNLOAD_URL_TTL: Duration = Duration::from_secs(5 * 60);
const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Object key layout: uploads/{purpose}/{file_id}/{filename}
pub fn object_key(file: &StoredFile) -> String {
    format!("uploads/{}/{}/{}", file.purpose.as_str(), file.file_id, file.filename)
}

pub fn file_to_item(file: &StoredFile) -> Item {
    let mut item = key(FILE_PK, file_sk(&file.file_id));
    item.insert("filename".into(), s(&file.filename));
    item.insert("content_type".into(), s(&file.content_type));
    item.insert("s3_key".into(), s(&file.s3_key));
    item.insert("uploaded_by".into(), s(&file.uploaded_by));
    item.insert("purpose".into(), s(file.purpose.as_str()));
    item.insert("created_at".into(), s(&file.created_at));
    put_opt(&mut item, "attached_to", &file.attached_to);
    item
}

pub fn file_from_item(item: &Item) -> ServiceResult<StoredFile> {
    let file_id = sk_id(item, "FILE#")
        .ok_or_else(|| ServiceError::Upstream("File item without FILE# sort key".into()))?;
    Ok(StoredFile {
        file_id,
        filename: get_s(item, "filename"),
        content_type: get_s(item, "content_type"),
        s3_key: get_s(item, "s3_key"),
        uploaded_by: get_s(item, "uploaded_by"),
        purpose: get_s(item, "purpose").parse()?,
        created_at: get_s(item, "created_at"),
        attached_to: opt_s(item, "attached_to"),
    })
}

pub fn new_stored_file(payload: CreateUploadPayload, uploaded_by: &str) -> ServiceResult<StoredFile> {
    payload.validate()?;
    let mut file = StoredFile {
        file_id: uuid::Uuid::new_v4().to_string(),
        filename: payload.filename.trim().to_string(),
        content_type: payload
            .content_type
            .filter(|ct| !ct.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string()),
        s3_key: String::new(),
        uploaded_by: uploaded_by.to_string(),
        purpose: payload.purpose,
        created_at: chrono::Utc::now().to_rfc3339(),
        attached_to: None,
    };
    file.s3_key = object_key(&file);
    Ok(file)
}

/// Claim a file for one owner record inside that record's create transaction.
///
/// The file must exist, be unclaimed, carry `purpose` and, when `uploader` is
/// given, have been uploaded by them.
pub fn attach_write(
    table_name: &str,
    file_id: &str,
    owner_ref: &str,
    uploader: Option<&str>,
    purpose: FilePurpose,
) -> ServiceResult<TransactWriteItem> {
    let mut condition = vec![
        "attribute_exists(PK)",
        "attribute_not_exists(attached_to)",
        "purpose = :purpose",
    ];
    let mut values = HashMap::new();
    values.insert(":owner".to_string(), s(owner_ref));
    values.insert(":purpose".to_string(), s(purpose.as_str()));
    if let Some(uploader) = uploader {
        condition.push("uploaded_by = :uploader");
        values.insert(":uploader".to_string(), s(uploader));
    }
    tx::update(
        table_name,
        key(FILE_PK, file_sk(file_id)),
        UpdateSpec {
            expression: "SET attached_to = :owner".into(),
            condition: Some(condition.join(" AND ")),
            names: HashMap::new(),
            values,
        },
    )
}

/// Record the file and hand back a presigned PUT URL for its bytes
pub async fn create_upload(
    dynamo: &DynamoClient,
    s3: &S3Client,
    table_name: &str,
    bucket_name: &str,
    file: StoredFile,
) -> ServiceResult<(StoredFile, String)> {
    let presigning = PresigningConfig::expires_in(UPLOAD_URL_TTL)
        .map_err(|e| ServiceError::Upstream(format!("Invalid presigning config: {}", e)))?;
    let presigned = s3
        .put_object()
        .bucket(bucket_name)
        .key(&file.s3_key)
        .content_type(&file.content_type)
        .presigned(presigning)
        .await
        .map_err(|e| ServiceError::upstream("S3 presign put_object", e))?;

    dynamo
        .put_item()
        .table_name(table_name)
        .set_item(Some(file_to_item(&file)))
        .condition_expression("attribute_not_exists(PK)")
        .send()
        .await
        .map_err(|e| ServiceError::upstream("DynamoDB put_item", e))?;

    tracing::info!(file_id = %file.file_id, purpose = file.purpose.as_str(), uploaded_by = %file.uploaded_by, "upload url issued");
    Ok((file, presigned.uri().to_string()))
}

pub async fn get_file(client: &DynamoClient, table_name: &str, file_id: &str) -> ServiceResult<StoredFile> {
    let result = client
        .get_item()
        .table_name(table_name)
        .set_key(Some(key(FILE_PK, file_sk(file_id))))
        .send()
        .await
        .map_err(|e| ServiceError::upstream("DynamoDB get_item", e))?;

    match result.item() {
        Some(item) => file_from_item(item),
        None => Err(ServiceError::NotFound(format!("File '{}'", file_id))),
    }
}

/// `Content-Disposition` value with the filename quoted and stripped of quotes.
pub fn attachment_disposition(filename: &str) -> String {
    let safe: String = filename.chars().filter(|c| *c != '"' && !c.is_control()).collect();
    format!("attachment; filename=\"{}\"", safe)
}

/// Short-lived GET URL that makes S3 serve the object as a named download.
pub async fn presigned_download(s3: &S3Client, bucket_name: &str, file: &StoredFile) -> ServiceResult<String> {
    let presigning = PresigningConfig::expires_in(DOWNLOAD_URL_TTL)
        .map_err(|e| ServiceError::Upstream(format!("Invalid presigning config: {}", e)))?;
    let presigned = s3
        .get_object()
        .bucket(bucket_name)
        .key(&file.s3_key)
        .response_content_type(&file.content_type)
        .response_content_disposition(attachment_disposition(&file.filename))
        .presigned(presigning)
        .await
        .map_err(|e| ServiceError::upstream("S3 presign get_object", e))?;
    Ok(presigned.uri().to_string())
}

/// Condition for removing a file's metadata: unattached files go freely,
/// attached ones only on behalf of their owner.
pub fn delete_condition(attached_to: Option<&str>) -> (&'static str, Item) {
    match attached_to {
        None => (
            "attribute_exists(PK) AND attribute_not_exists(attached_to)",
            HashMap::new(),
        ),
        Some(owner_ref) => (
            "attached_to = :owner",
            HashMap::from([(":owner".to_string(), s(owner_ref))]),
        ),
    }
}

/// Remove a file's metadata, then its object. `attached_to` names the owner
/// record the caller acts for; the delete is refused for anyone else's file.
pub async fn delete_file(
    dynamo: &DynamoClient,
    s3: &S3Client,
    table_name: &str,
    bucket_name: &str,
    file: &StoredFile,
    attached_to: Option<&str>,
) -> ServiceResult<()> {
    let (condition, values) = delete_condition(attached_to);
    dynamo
        .delete_item()
        .table_name(table_name)
        .set_key(Some(key(FILE_PK, file_sk(&file.file_id))))
        .condition_expression(condition)
        .set_expression_attribute_values((!values.is_empty()).then_some(values))
        .send()
        .await
        .map_err(|e| {
            if e.as_service_error()
                .map(|se| se.is_conditional_check_failed_exception())
                .unwrap_or(false)
            {
                ServiceError::Conflict(format!("File '{}' is attached to another record", file.file_id))
            } else {
                ServiceError::upstream("DynamoDB delete_item", e)
            }
        })?;

    s3.delete_object()
        .bucket(bucket_name)
        .key(&file.s3_key)
        .send()
        .await
        .map_err(|e| ServiceError::upstream("S3 delete_object", e))?;

    tracing::info!(file_id = %file.file_id, attached_to, "file deleted");
    Ok(())
}

/// Best-effort cleanup of the attachments of a deleted owner record.
/// Only files claimed by `owner_ref` are removed; failures are logged and skipped.
pub async fn delete_files_quietly(
    dynamo: &DynamoClient,
    s3: &S3Client,
    table_name: &str,
    bucket_name: &str,
    owner_ref: &str,
    file_ids: &[String],
) {
    for file_id in file_ids.iter().filter(|id| !id.is_empty()) {
        let outcome = match get_file(dynamo, table_name, file_id).await {
            Ok(file) if file.attached_to.as_deref() == Some(owner_ref) => {
                delete_file(dynamo, s3, table_name, bucket_name, &file, Some(owner_ref)).await
            }
            Ok(file) => {
                tracing::warn!(file_id = %file_id, attached_to = ?file.attached_to, owner_ref, "keeping file not owned by deleted record");
                Ok(())
            }
            Err(ServiceError::NotFound(_)) => Ok(()),
            Err(e) => Err(e),
        };
        if let Err(e) = outcome {
            tracing::warn!(file_id = %file_id, error = %e, "attachment cleanup failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::files::model::FilePurpose;

    #[test]
    fn new_file_gets_key_under_its_purpose() {
        let file = new_stored_file(
            CreateUploadPayload {
                filename: " exploit.py ".into(),
                content_type: None,
                purpose: FilePurpose::ReviewScript,
            },
            "hank",
        )
        .unwrap();
        assert_eq!(file.filename, "exploit.py");
        assert_eq!(file.content_type, "application/octet-stream");
        assert_eq!(
            file.s3_key,
            format!("uploads/review_script/{}/exploit.py", file.file_id)
        );
    }

    #[test]
    fn file_item_roundtrip() {
        let file = StoredFile {
            file_id: "f-1".into(),
            filename: "notes.pdf".into(),
            content_type: "application/pdf".into(),
            s3_key: "uploads/doc/f-1/notes.pdf".into(),
            uploaded_by: "kate".into(),
            purpose: FilePurpose::Doc,
            created_at: "2026-01-05T00:00:00Z".into(),
            attached_to: Some("DOC#d-1".into()),
        };
        let item = file_to_item(&file);
        assert_eq!(get_s(&item, "SK"), "FILE#f-1");
        assert_eq!(get_s(&item, "attached_to"), "DOC#d-1");
        assert_eq!(file_from_item(&item).unwrap(), file);
    }

    #[test]
    fn attaching_requires_an_unclaimed_file_of_the_uploader() {
        let write = attach_write("bughunt", "f-1", "REVIEW#r-1", Some("hank"), FilePurpose::ReviewScript).unwrap();
        let update = write.update().unwrap();
        assert_eq!(update.update_expression(), "SET attached_to = :owner");
        let condition = update.condition_expression().unwrap();
        assert!(condition.contains("attribute_not_exists(attached_to)"));
        assert!(condition.contains("uploaded_by = :uploader"));
        assert!(condition.contains("purpose = :purpose"));
        let values = update.expression_attribute_values().unwrap();
        assert_eq!(values.get(":purpose"), Some(&s("review_script")));

        let doc = attach_write("bughunt", "f-2", "DOC#d-1", None, FilePurpose::Doc).unwrap();
        assert!(!doc.update().unwrap().condition_expression().unwrap().contains("uploaded_by"));
    }

    #[test]
    fn attached_files_are_deleted_only_by_their_owner() {
        let (free, values) = delete_condition(None);
        assert!(free.contains("attribute_not_exists(attached_to)"));
        assert!(values.is_empty());

        let (owned, values) = delete_condition(Some("REVIEW#r-1"));
        assert_eq!(owned, "attached_to = :owner");
        assert_eq!(values.get(":owner"), Some(&s("REVIEW#r-1")));
    }

    #[test]
    fn disposition_drops_quotes() {
        assert_eq!(
            attachment_disposition("evil\".sh"),
            "attachment; filename=\"evil.sh\""
        );
    }
}

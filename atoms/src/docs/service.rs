use aws_sdk_dynamodb::types::TransactWriteItem;
use aws_sdk_dynamodb::Client as DynamoClient;

use super::model::{CreateDocPayload, Doc, DocKind};
use crate::error::{ServiceError, ServiceResult};
use crate::files::model::FilePurpose;
use crate::files::service::attach_write;
use crate::item::{get_s, key, opt_s, put_opt, s, sk_id, Item};
use crate::tx;

pub fn doc_pk(kind: DocKind) -> String {
    format!("DOC#{}", kind.as_str())
}

pub fn doc_sk(doc_id: &str) -> String {
    format!("DOC#{}", doc_id)
}

pub fn doc_to_item(doc: &Doc) -> Item {
    let mut item = key(doc_pk(doc.kind), doc_sk(&doc.doc_id));
    item.insert("kind".into(), s(doc.kind.as_str()));
    item.insert("title".into(), s(&doc.title));
    item.insert("body".into(), s(&doc.body));
    item.insert("created_by".into(), s(&doc.created_by));
    item.insert("created_at".into(), s(&doc.created_at));
    put_opt(&mut item, "file_id", &doc.file_id);
    item
}

pub fn doc_from_item(item: &Item) -> ServiceResult<Doc> {
    let doc_id = sk_id(item, "DOC#")
        .ok_or_else(|| ServiceError::Upstream("Doc item without DOC# sort key".into()))?;
    Ok(Doc {
        doc_id,
        kind: get_s(item, "kind").parse()?,
        title: get_s(item, "title"),
        body: get_s(item, "body"),
        file_id: opt_s(item, "file_id"),
        created_by: get_s(item, "created_by"),
        created_at: get_s(item, "created_at"),
    })
}

/// The doc put, plus the claim on its library file when one is attached.
pub fn create_writes(table_name: &str, doc: &Doc) -> ServiceResult<Vec<TransactWriteItem>> {
    let mut writes = vec![tx::put(table_name, doc_to_item(doc), Some("attribute_not_exists(PK)"))?];
    if let Some(file_id) = &doc.file_id {
        writes.push(attach_write(table_name, file_id, &doc_sk(&doc.doc_id), None, FilePurpose::Doc)?);
    }
    Ok(writes)
}

pub async fn create_doc(
    client: &DynamoClient,
    table_name: &str,
    kind: DocKind,
    created_by: &str,
    payload: CreateDocPayload,
) -> ServiceResult<Doc> {
    payload.validate(kind)?;
    let doc = Doc {
        doc_id: uuid::Uuid::new_v4().to_string(),
        kind,
        title: payload.title.trim().to_string(),
        body: payload.body.trim().to_string(),
        file_id: payload.file_id.filter(|id| !id.is_empty()),
        created_by: created_by.to_string(),
        created_at: chrono::Utc::now().to_rfc3339(),
    };

    let writes = create_writes(table_name, &doc)?;
    tx::commit_or(client, writes, |failed| {
        if failed.contains(&1) {
            ServiceError::Conflict("The file is missing, not a library upload or already attached".into())
        } else {
            ServiceError::Conflict(format!("Doc '{}' already exists", doc.doc_id))
        }
    })
    .await?;

    tracing::info!(doc_id = %doc.doc_id, kind = kind.as_str(), created_by, "doc created");
    Ok(doc)
}

/// List one library, newest first
pub async fn list_docs(client: &DynamoClient, table_name: &str, kind: DocKind) -> ServiceResult<Vec<Doc>> {
    let mut docs = Vec::new();
    let mut start_key = None;
    loop {
        let result = client
            .query()
            .table_name(table_name)
            .key_condition_expression("PK = :pk")
            .expression_attribute_values(":pk", s(doc_pk(kind)))
            .set_exclusive_start_key(start_key)
            .send()
            .await
            .map_err(|e| ServiceError::upstream("DynamoDB query", e))?;

        for item in result.items() {
            docs.push(doc_from_item(item)?);
        }

        start_key = result.last_evaluated_key().cloned();
        if start_key.is_none() {
            break;
        }
    }
    docs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(docs)
}

/// Delete a doc and return it, so an attached file can be cleaned up
pub async fn delete_doc(
    client: &DynamoClient,
    table_name: &str,
    kind: DocKind,
    doc_id: &str,
) -> ServiceResult<Doc> {
    let result = client
        .delete_item()
        .table_name(table_name)
        .set_key(Some(key(doc_pk(kind), doc_sk(doc_id))))
        .return_values(aws_sdk_dynamodb::types::ReturnValue::AllOld)
        .send()
        .await
        .map_err(|e| ServiceError::upstream("DynamoDB delete_item", e))?;

    let doc = result
        .attributes()
        .map(doc_from_item)
        .transpose()?
        .ok_or_else(|| ServiceError::NotFound(format!("{} '{}'", kind.as_str(), doc_id)))?;
    tracing::info!(doc_id, kind = kind.as_str(), "doc deleted");
    Ok(doc)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn each_library_has_its_own_partition() {
        let doc = Doc {
            doc_id: "d-1".into(),
            kind: DocKind::Video,
            title: "Burp basics".into(),
            body: "https://videos.test/burp".into(),
            file_id: None,
            created_by: "kate".into(),
            created_at: "2026-01-01T00:00:00Z".into(),
        };
        let item = doc_to_item(&doc);
        assert_eq!(get_s(&item, "PK"), "DOC#video");
        assert_eq!(get_s(&item, "SK"), "DOC#d-1");
        assert!(!item.contains_key("file_id"));
        assert_eq!(doc_from_item(&item).unwrap(), doc);
        assert_eq!(create_writes("bughunt", &doc).unwrap().len(), 1);
    }

    #[test]
    fn attached_file_is_claimed_with_the_doc() {
        let doc = Doc {
            doc_id: "d-2".into(),
            kind: DocKind::Script,
            title: "Scope rules".into(),
            body: String::new(),
            file_id: Some("f-9".into()),
            created_by: "kate".into(),
            created_at: "2026-01-01T00:00:00Z".into(),
        };
        let writes = create_writes("bughunt", &doc).unwrap();
        assert_eq!(writes.len(), 2);
        let claim = writes[1].update().unwrap();
        assert_eq!(get_s(claim.key(), "SK"), "FILE#f-9");
        assert_eq!(
            claim.expression_attribute_values().unwrap().get(":owner"),
            Some(&s("DOC#d-2"))
        );
        assert!(claim.condition_expression().unwrap().contains("attribute_not_exists(attached_to)"));
    }
}

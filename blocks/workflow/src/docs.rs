use bughunt_atoms::docs::{self, CreateDocPayload, Doc, DocKind};
use bughunt_atoms::files::{self, FilePurpose};
use bughunt_atoms::users::Role;
use bughunt_atoms::{ServiceError, ServiceResult};
use bughunt_shared::{AppState, Principal};

pub async fn list_docs(state: &AppState, kind: DocKind) -> ServiceResult<Vec<Doc>> {
    docs::list_docs(&state.dynamo_client, state.table(), kind).await
}

pub async fn create_doc(
    state: &AppState,
    principal: &Principal,
    kind: DocKind,
    payload: CreateDocPayload,
) -> ServiceResult<Doc> {
    principal.require(&[Role::Coach, Role::Admin])?;
    if let Some(file_id) = payload.file_id.as_deref().filter(|id| !id.is_empty()) {
        let file = files::get_file(&state.dynamo_client, state.table(), file_id).await?;
        if file.purpose != FilePurpose::Doc {
            return Err(ServiceError::Validation(format!(
                "File '{}' is not a library upload",
                file_id
            )));
        }
        if file.attached_to.is_some() {
            return Err(ServiceError::Conflict(format!(
                "File '{}' is already attached to another record",
                file_id
            )));
        }
    }
    docs::create_doc(&state.dynamo_client, state.table(), kind, &principal.username, payload).await
}

pub async fn delete_doc(state: &AppState, principal: &Principal, kind: DocKind, doc_id: &str) -> ServiceResult<()> {
    principal.require(&[Role::Coach, Role::Admin])?;
    let doc = docs::delete_doc(&state.dynamo_client, state.table(), kind, doc_id).await?;
    if let Some(file_id) = doc.file_id {
        files::delete_files_quietly(
            &state.dynamo_client,
            &state.s3_client,
            state.table(),
            state.bucket(),
            &docs::doc_sk(doc_id),
            &[file_id],
        )
        .await;
    }
    Ok(())
}

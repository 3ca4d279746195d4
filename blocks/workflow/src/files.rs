use bughunt_atoms::files::{self, CreateUploadPayload, FilePurpose, StoredFile, UploadTicket, UPLOAD_URL_TTL};
use bughunt_atoms::users::Role;
use bughunt_atoms::{ServiceError, ServiceResult};
use bughunt_shared::{AppState, Principal};
use lambda_http::http::header::{CACHE_CONTROL, LOCATION};
use lambda_http::http::StatusCode;
use lambda_http::{Body, Error, Response};

/// Who may upload what: hunters attach review files, coaches and admins
/// attach library files.
pub fn check_upload_role(principal: &Principal, purpose: FilePurpose) -> ServiceResult<()> {
    match purpose {
        FilePurpose::ReviewScript | FilePurpose::ReviewSupport => principal.require(&[Role::Hunter]),
        FilePurpose::Doc => principal.require(&[Role::Coach, Role::Admin]),
    }
}

pub async fn create_upload(
    state: &AppState,
    principal: &Principal,
    payload: CreateUploadPayload,
) -> ServiceResult<UploadTicket> {
    check_upload_role(principal, payload.purpose)?;
    let file = files::new_stored_file(payload, &principal.username)?;
    let (file, upload_url) = files::create_upload(
        &state.dynamo_client,
        &state.s3_client,
        state.table(),
        state.bucket(),
        file,
    )
    .await?;
    Ok(UploadTicket {
        file,
        upload_url,
        expires_in_secs: UPLOAD_URL_TTL.as_secs(),
    })
}

pub async fn get_file(state: &AppState, file_id: &str) -> ServiceResult<StoredFile> {
    files::get_file(&state.dynamo_client, state.table(), file_id).await
}

/// Delete an unattached upload. Files in use by a review or doc go with their owner.
pub async fn delete_file(state: &AppState, principal: &Principal, file_id: &str) -> ServiceResult<()> {
    let file = files::get_file(&state.dynamo_client, state.table(), file_id).await?;
    principal.require_owner_or_admin(&file.uploaded_by)?;
    if let Some(owner) = &file.attached_to {
        return Err(ServiceError::Conflict(format!(
            "File '{}' is attached to {} and is deleted with it",
            file_id, owner
        )));
    }
    files::delete_file(&state.dynamo_client, &state.s3_client, state.table(), state.bucket(), &file, None).await
}

/// Redirect to a short-lived presigned GET so large objects bypass the Lambda payload limit.
pub fn redirect_response(url: &str) -> Result<Response<Body>, ServiceError> {
    Response::builder()
        .status(StatusCode::FOUND)
        .header(LOCATION, url)
        .header(CACHE_CONTROL, "no-store")
        .body(Body::Empty)
        .map_err(|e| ServiceError::Upstream(format!("Failed to build download response: {}", e)))
}

pub async fn download(state: &AppState, file_id: &str) -> Result<Response<Body>, ServiceError> {
    let file = files::get_file(&state.dynamo_client, state.table(), file_id).await?;
    let url = files::presigned_download(&state.s3_client, state.bucket(), &file).await?;
    tracing::info!(file_id, "download url issued");
    redirect_response(&url)
}

/// Download as a handler result, rendering errors as JSON.
pub async fn download_handler(state: &AppState, file_id: &str) -> Result<Response<Body>, Error> {
    match download(state, file_id).await {
        Ok(resp) => Ok(resp),
        Err(e) => bughunt_atoms::http::error_response(&e),
    }
}

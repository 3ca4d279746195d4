use bughunt_atoms::notify::{self, Notification};
use bughunt_atoms::users::{self, LoginPayload, PendingUser, RegisterPayload, Role, User, UserActionPayload};
use bughunt_atoms::{ServiceError, ServiceResult};
use bughunt_shared::auth::{cognito, jwt};
use bughunt_shared::{AppState, Principal};

use crate::types::{LoginResponse, MessageResponse};

/// Store a registration for admin approval.
///
/// The table transaction runs first so a duplicate username writes nothing;
/// if Cognito then refuses the sign-up the pending item is rolled back.
pub async fn register(state: &AppState, payload: RegisterPayload) -> ServiceResult<MessageResponse> {
    payload.validate()?;
    let pending = PendingUser {
        username: payload.username.trim().to_string(),
        email: payload.email.trim().to_string(),
        role: payload.role,
        created_at: chrono::Utc::now().to_rfc3339(),
    };

    users::create_pending_user(&state.dynamo_client, state.table(), &pending).await?;

    if let Err(e) = cognito::sign_up(
        &state.cognito_client,
        &state.config,
        &pending.username,
        &pending.email,
        &payload.password,
    )
    .await
    {
        if let Err(cleanup) = users::delete_pending_user(&state.dynamo_client, state.table(), &pending.username).await {
            tracing::error!(username = %pending.username, error = %cleanup, "failed to roll back pending user");
        }
        return Err(e);
    }

    tracing::info!(username = %pending.username, role = %pending.role, "registration received");
    Ok(MessageResponse::new("Registration received; an admin will review it"))
}

pub async fn approve_user(state: &AppState, principal: &Principal, payload: UserActionPayload) -> ServiceResult<User> {
    principal.require(&[Role::Admin])?;
    let pending = users::get_pending_user(&state.dynamo_client, state.table(), &payload.username).await?;

    cognito::confirm_user(&state.cognito_client, &state.config, &pending.username).await?;

    let now = chrono::Utc::now().to_rfc3339();
    let user = User::from_pending(pending, &principal.username, &now);
    let welcome = notify::queue_write(
        state.table(),
        &Notification::user_approved(&user.username, &user.email),
        state.config.notification_ttl_days,
    )?;
    users::approve_pending_user(&state.dynamo_client, state.table(), user, vec![welcome]).await
}

pub async fn reject_user(
    state: &AppState,
    principal: &Principal,
    payload: UserActionPayload,
) -> ServiceResult<MessageResponse> {
    principal.require(&[Role::Admin])?;
    let pending = users::get_pending_user(&state.dynamo_client, state.table(), &payload.username).await?;

    cognito::delete_user(&state.cognito_client, &state.config, &pending.username).await?;
    users::delete_pending_user(&state.dynamo_client, state.table(), &pending.username).await?;
    notify::queue(
        &state.dynamo_client,
        state.table(),
        &Notification::user_rejected(&pending.username, &pending.email),
        state.config.notification_ttl_days,
    )
    .await?;

    tracing::info!(username = %pending.username, rejected_by = %principal.username, "registration rejected");
    Ok(MessageResponse::new(format!("User '{}' rejected", pending.username)))
}

pub async fn list_pending_users(state: &AppState, principal: &Principal) -> ServiceResult<Vec<PendingUser>> {
    principal.require(&[Role::Admin])?;
    users::list_pending_users(&state.dynamo_client, state.table()).await
}

pub async fn list_users(state: &AppState, principal: &Principal) -> ServiceResult<Vec<User>> {
    principal.require(&[Role::Admin])?;
    users::list_users(&state.dynamo_client, state.table()).await
}

pub async fn me(state: &AppState, principal: &Principal) -> ServiceResult<User> {
    users::get_user(&state.dynamo_client, state.table(), &principal.username).await
}

/// Check the password with Cognito, then issue a token carrying the stored role.
pub async fn login(state: &AppState, payload: LoginPayload) -> ServiceResult<LoginResponse> {
    let username = payload.username.trim();
    if username.is_empty() || payload.password.is_empty() {
        return Err(ServiceError::Validation("username and password are required".into()));
    }

    cognito::check_password(&state.cognito_client, &state.config, username, &payload.password).await?;

    let user = match users::get_user(&state.dynamo_client, state.table(), username).await {
        Ok(user) => user,
        Err(ServiceError::NotFound(_)) => {
            tracing::warn!(username, "cognito accepted a user with no approved record");
            return Err(ServiceError::Forbidden("Account is awaiting approval".into()));
        }
        Err(e) => return Err(e),
    };
    if !user.verified {
        return Err(ServiceError::Forbidden("Account is awaiting approval".into()));
    }

    let now = chrono::Utc::now().timestamp();
    let token = jwt::issue(state.jwt_secret(), &user.username, user.role, now, state.config.jwt_ttl_secs)
        .map_err(|e| ServiceError::Upstream(format!("Failed to issue token: {}", e)))?;

    tracing::info!(username = %user.username, role = %user.role, "login succeeded");
    Ok(LoginResponse {
        token,
        expires_in: state.config.jwt_ttl_secs,
        user,
    })
}

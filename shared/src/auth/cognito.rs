use aws_sdk_cognitoidentityprovider::types::{AttributeType, AuthFlowType};
use aws_sdk_cognitoidentityprovider::Client as CognitoClient;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bughunt_atoms::{ServiceError, ServiceResult};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::config::Config;

/// Cognito SECRET_HASH: base64(HMAC-SHA256(client_secret, username + client_id)).
pub fn secret_hash(username: &str, client_id: &str, client_secret: &str) -> ServiceResult<String> {
    let mut mac = Hmac::<Sha256>::new_from_slice(client_secret.as_bytes())
        .map_err(|e| ServiceError::Upstream(format!("Invalid Cognito client secret: {}", e)))?;
    mac.update(username.as_bytes());
    mac.update(client_id.as_bytes());
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

/// Create the Cognito identity for a registration. It stays unconfirmed
/// until an admin approves the request.
pub async fn sign_up(
    client: &CognitoClient,
    config: &Config,
    username: &str,
    email: &str,
    password: &str,
) -> ServiceResult<()> {
    let hash = secret_hash(username, &config.cognito_client_id, &config.cognito_client_secret)?;
    let email_attr = AttributeType::builder()
        .name("email")
        .value(email)
        .build()
        .map_err(|e| ServiceError::Upstream(format!("Failed to build attribute: {}", e)))?;

    client
        .sign_up()
        .client_id(&config.cognito_client_id)
        .secret_hash(hash)
        .username(username)
        .password(password)
        .user_attributes(email_attr)
        .send()
        .await
        .map_err(|e| match e.as_service_error() {
            Some(se) if se.is_username_exists_exception() => {
                ServiceError::Validation(format!("Username '{}' is already taken", username))
            }
            Some(se) if se.is_invalid_password_exception() => {
                ServiceError::Validation("Password does not meet the pool policy".into())
            }
            _ => ServiceError::upstream("Cognito sign_up", e),
        })?;

    tracing::info!(username, "cognito user signed up");
    Ok(())
}

pub async fn confirm_user(client: &CognitoClient, config: &Config, username: &str) -> ServiceResult<()> {
    client
        .admin_confirm_sign_up()
        .user_pool_id(&config.cognito_user_pool_id)
        .username(username)
        .send()
        .await
        .map_err(|e| match e.as_service_error() {
            Some(se) if se.is_user_not_found_exception() => {
                ServiceError::NotFound(format!("Cognito user '{}'", username))
            }
            _ => ServiceError::upstream("Cognito admin_confirm_sign_up", e),
        })?;
    Ok(())
}

/// Remove a Cognito identity. Already-missing users count as removed.
pub async fn delete_user(client: &CognitoClient, config: &Config, username: &str) -> ServiceResult<()> {
    match client
        .admin_delete_user()
        .user_pool_id(&config.cognito_user_pool_id)
        .username(username)
        .send()
        .await
    {
        Ok(_) => Ok(()),
        Err(e)
            if e
                .as_service_error()
                .map(|se| se.is_user_not_found_exception())
                .unwrap_or(false) =>
        {
            tracing::warn!(username, "cognito user already absent");
            Ok(())
        }
        Err(e) => Err(ServiceError::upstream("Cognito admin_delete_user", e)),
    }
}

/// Check a username/password pair with USER_PASSWORD_AUTH.
pub async fn check_password(
    client: &CognitoClient,
    config: &Config,
    username: &str,
    password: &str,
) -> ServiceResult<()> {
    let hash = secret_hash(username, &config.cognito_client_id, &config.cognito_client_secret)?;
    let result = client
        .initiate_auth()
        .auth_flow(AuthFlowType::UserPasswordAuth)
        .client_id(&config.cognito_client_id)
        .auth_parameters("USERNAME", username)
        .auth_parameters("PASSWORD", password)
        .auth_parameters("SECRET_HASH", hash)
        .send()
        .await
        .map_err(|e| match e.as_service_error() {
            Some(se)
                if se.is_not_authorized_exception()
                    || se.is_user_not_found_exception()
                    || se.is_user_not_confirmed_exception() =>
            {
                tracing::warn!(username, "cognito rejected credentials");
                ServiceError::Unauthorized
            }
            _ => ServiceError::upstream("Cognito initiate_auth", e),
        })?;

    // A challenge (e.g. NEW_PASSWORD_REQUIRED) means the sign-in is not complete.
    if result.authentication_result().is_none() {
        tracing::warn!(username, challenge = ?result.challenge_name(), "sign-in needs a challenge");
        return Err(ServiceError::Unauthorized);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secret_hash_matches_reference_vector() {
        assert_eq!(
            secret_hash("alice", "client123", "topsecret").unwrap(),
            "QOaF4kSzdPw1nPLE5QMEoi2mW87FFhdfpWgk5WhA12c="
        );
    }

    #[test]
    fn secret_hash_depends_on_username() {
        assert_ne!(
            secret_hash("alice", "client123", "topsecret").unwrap(),
            secret_hash("bob", "client123", "topsecret").unwrap()
        );
    }
}

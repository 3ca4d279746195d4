pub mod cognito;
pub mod jwt;

use bughunt_atoms::users::Role;
use bughunt_atoms::ServiceError;
use lambda_http::http::HeaderMap;

/// Caller identity taken from a verified bearer token.
#[derive(Debug, Clone, PartialEq)]
pub struct Principal {
    pub username: String,
    pub role: Role,
}

impl Principal {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Fail with 403 unless the caller holds one of `roles`.
    pub fn require(&self, roles: &[Role]) -> Result<(), ServiceError> {
        if roles.contains(&self.role) {
            Ok(())
        } else {
            tracing::warn!(username = %self.username, role = %self.role, "role not allowed");
            Err(ServiceError::Forbidden(format!(
                "This action is not available to the {} role",
                self.role
            )))
        }
    }

    /// Owner of a resource or an admin.
    pub fn require_owner_or_admin(&self, owner: &str) -> Result<(), ServiceError> {
        if self.is_admin() || self.username == owner {
            Ok(())
        } else {
            Err(ServiceError::Forbidden("Only the owner or an admin can do this".into()))
        }
    }
}

pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer ").or_else(|| v.strip_prefix("bearer ")))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Resolve the caller from the `Authorization` header.
pub fn authenticate(headers: &HeaderMap, secret: &[u8], now: i64) -> Result<Principal, ServiceError> {
    let token = bearer_token(headers).ok_or(ServiceError::Unauthorized)?;
    let claims = jwt::verify(secret, token, now).map_err(|e| {
        tracing::warn!(error = %e, "bearer token rejected");
        ServiceError::Unauthorized
    })?;
    Ok(Principal {
        username: claims.sub,
        role: claims.role,
    })
}

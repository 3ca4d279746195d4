use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ServiceError;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Hunter,
    Coach,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Hunter => "hunter",
            Role::Coach => "coach",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ServiceError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "hunter" => Ok(Role::Hunter),
            "coach" => Ok(Role::Coach),
            "admin" => Ok(Role::Admin),
            other => Err(ServiceError::Validation(format!("Unknown role '{}'", other))),
        }
    }
}

/// Registration awaiting admin approval
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PendingUser {
    pub username: String,
    pub email: String,
    pub role: Role,
    pub created_at: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct User {
    pub username: String,
    pub email: String,
    pub role: Role,
    pub verified: bool,
    pub created_at: String,
    pub approved_at: String,
    pub approved_by: String,
}

impl User {
    pub fn from_pending(pending: PendingUser, approved_by: &str, now: &str) -> Self {
        User {
            username: pending.username,
            email: pending.email,
            role: pending.role,
            verified: true,
            created_at: pending.created_at,
            approved_at: now.to_string(),
            approved_by: approved_by.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RegisterPayload {
    pub username: String,
    pub email: String,
    pub password: String,
    pub role: Role,
}

#[derive(Debug, Deserialize)]
pub struct LoginPayload {
    pub username: String,
    pub password: String,
}

/// Body of approve/reject actions
#[derive(Debug, Deserialize)]
pub struct UserActionPayload {
    pub username: String,
}

impl RegisterPayload {
    pub fn validate(&self) -> Result<(), ServiceError> {
        let username = self.username.trim();
        if username.len() < 3 || username.len() > 32 {
            return Err(ServiceError::Validation(
                "Username must be between 3 and 32 characters".into(),
            ));
        }
        if !username
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
        {
            return Err(ServiceError::Validation(
                "Username may only contain letters, digits, '.', '_' and '-'".into(),
            ));
        }
        let email = self.email.trim();
        if email.is_empty() || !email.contains('@') {
            return Err(ServiceError::Validation("Please provide a valid email address".into()));
        }
        if self.password.len() < 8 {
            return Err(ServiceError::Validation(
                "Password must be at least 8 characters".into(),
            ));
        }
        if self.role == Role::Admin {
            return Err(ServiceError::Forbidden("Admin accounts cannot self-register".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(username: &str, role: Role) -> RegisterPayload {
        RegisterPayload {
            username: username.to_string(),
            email: "hunter@example.com".to_string(),
            password: "correct horse".to_string(),
            role,
        }
    }

    #[test]
    fn role_parses_case_insensitively() {
        assert_eq!("Coach".parse::<Role>().unwrap(), Role::Coach);
        assert!("owner".parse::<Role>().is_err());
    }

    #[test]
    fn registration_rules() {
        assert!(payload("alice", Role::Hunter).validate().is_ok());
        assert!(payload("al", Role::Hunter).validate().is_err());
        assert!(payload("alice smith", Role::Hunter).validate().is_err());
        assert!(matches!(
            payload("root", Role::Admin).validate(),
            Err(ServiceError::Forbidden(_))
        ));

        let mut weak = payload("bob", Role::Coach);
        weak.password = "short".into();
        assert!(weak.validate().is_err());

        let mut no_at = payload("bob", Role::Coach);
        no_at.email = "bob.example.com".into();
        assert!(no_at.validate().is_err());
    }

    #[test]
    fn approval_marks_user_verified() {
        let pending = PendingUser {
            username: "carol".into(),
            email: "carol@example.com".into(),
            role: Role::Coach,
            created_at: "2026-01-01T00:00:00Z".into(),
        };
        let user = User::from_pending(pending, "admin", "2026-01-02T00:00:00Z");
        assert!(user.verified);
        assert_eq!(user.role, Role::Coach);
        assert_eq!(user.approved_by, "admin");
        assert_eq!(user.created_at, "2026-01-01T00:00:00Z");
    }
}

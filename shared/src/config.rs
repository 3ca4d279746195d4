use std::{env, fmt::Display, str::FromStr};

use tracing::{info, warn};

pub const MIN_JWT_SECRET_LEN: usize = 32;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    #[error("environment variable {0} must be set")]
    Missing(&'static str),

    #[error("invalid {key} value: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub table_name: String,
    pub bucket_name: String,
    pub jwt_secret: String,
    pub jwt_ttl_secs: i64,
    pub cognito_client_id: String,
    pub cognito_client_secret: String,
    pub cognito_user_pool_id: String,
    pub email_from: String,
    pub admin_email: String,
    pub review_inbox_email: String,
    pub allowed_origins: Vec<String>,
    pub notification_ttl_days: i64,
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup; `load` reads the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let jwt_secret = required(&lookup, "JWT_SECRET")?;
        if jwt_secret.len() < MIN_JWT_SECRET_LEN {
            return Err(ConfigError::Invalid {
                key: "JWT_SECRET",
                reason: format!("must be at least {} bytes", MIN_JWT_SECRET_LEN),
            });
        }

        let email_from = required(&lookup, "EMAIL_FROM")?;
        let allowed_origins = or_default(&lookup, "ALLOWED_ORIGINS", "http://localhost:5173")
            .split(',')
            .map(|origin| origin.trim().trim_end_matches('/').to_string())
            .filter(|origin| !origin.is_empty() && origin != "*")
            .collect();

        Ok(Self {
            table_name: or_default(&lookup, "TABLE_NAME", "bughunt"),
            bucket_name: or_default(&lookup, "S3_BUCKET_NAME", "bughunt-files"),
            jwt_secret,
            jwt_ttl_secs: parsed(&lookup, "JWT_TTL_SECS", "43200")?,
            cognito_client_id: required(&lookup, "COGNITO_CLIENT_ID")?,
            cognito_client_secret: required(&lookup, "COGNITO_CLIENT_SECRET")?,
            cognito_user_pool_id: required(&lookup, "COGNITO_USER_POOL_ID")?,
            admin_email: or_default(&lookup, "ADMIN_EMAIL", &email_from),
            review_inbox_email: or_default(&lookup, "REVIEW_INBOX_EMAIL", &email_from),
            email_from,
            allowed_origins,
            notification_ttl_days: parsed(&lookup, "NOTIFICATION_TTL_DAYS", "14")?,
        })
    }
}

fn required<F: Fn(&str) -> Option<String>>(lookup: &F, key: &'static str) -> Result<String, ConfigError> {
    lookup(key)
        .filter(|v| !v.trim().is_empty())
        .ok_or(ConfigError::Missing(key))
}

fn or_default<F: Fn(&str) -> Option<String>>(lookup: &F, key: &str, default: &str) -> String {
    lookup(key).filter(|v| !v.trim().is_empty()).unwrap_or_else(|| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    })
}

fn parsed<T, F>(lookup: &F, key: &'static str, default: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
    F: Fn(&str) -> Option<String>,
{
    or_default(lookup, key, default).parse().map_err(|e: T::Err| {
        warn!("Invalid {key} value: {e}");
        ConfigError::Invalid {
            key,
            reason: e.to_string(),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_with(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let mut vars: HashMap<String, String> = [
            ("JWT_SECRET", "0123456789abcdef0123456789abcdef"),
            ("COGNITO_CLIENT_ID", "client"),
            ("COGNITO_CLIENT_SECRET", "secret"),
            ("COGNITO_USER_POOL_ID", "pool"),
            ("EMAIL_FROM", "noreply@bughunt.test"),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        for (k, v) in pairs {
            vars.insert(k.to_string(), v.to_string());
        }
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn defaults_fill_optional_settings() {
        let config = Config::from_lookup(env_with(&[])).unwrap();
        assert_eq!(config.table_name, "bughunt");
        assert_eq!(config.bucket_name, "bughunt-files");
        assert_eq!(config.jwt_ttl_secs, 43200);
        assert_eq!(config.admin_email, "noreply@bughunt.test");
        assert_eq!(config.review_inbox_email, "noreply@bughunt.test");
        assert_eq!(config.allowed_origins, vec!["http://localhost:5173"]);
        assert_eq!(config.notification_ttl_days, 14);
    }

    #[test]
    fn short_jwt_secret_is_rejected() {
        let err = Config::from_lookup(env_with(&[("JWT_SECRET", "short")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "JWT_SECRET", .. }));
    }

    #[test]
    fn missing_cognito_client_is_reported() {
        let err = Config::from_lookup(env_with(&[("COGNITO_CLIENT_ID", " ")])).unwrap_err();
        assert_eq!(err, ConfigError::Missing("COGNITO_CLIENT_ID"));
    }

    #[test]
    fn origins_are_trimmed_and_wildcard_dropped() {
        let config = Config::from_lookup(env_with(&[(
            "ALLOWED_ORIGINS",
            "https://app.bughunt.test/, *, http://localhost:5173",
        )]))
        .unwrap();
        assert_eq!(
            config.allowed_origins,
            vec!["https://app.bughunt.test", "http://localhost:5173"]
        );
    }

    #[test]
    fn non_numeric_ttl_is_invalid() {
        let err = Config::from_lookup(env_with(&[("JWT_TTL_SECS", "soon")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "JWT_TTL_SECS", .. }));
    }
}

use aws_sdk_dynamodb::error::DisplayErrorContext;
use lambda_http::http::StatusCode;

/// Error returned by every atom and block service.
///
/// Each variant maps to exactly one HTTP status so handlers never pick codes ad hoc.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("{0}")]
    Validation(String),

    #[error("authentication required")]
    Unauthorized,

    #[error("{0}")]
    Forbidden(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Upstream(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ServiceError {
    /// Wrap an AWS SDK failure, keeping the full error chain in the message.
    pub fn upstream<E: std::error::Error>(operation: &str, err: E) -> Self {
        let message = format!("{}: {}", operation, DisplayErrorContext(&err));
        tracing::error!(operation, error = %message, "upstream call failed");
        ServiceError::Upstream(message)
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ServiceError::Validation(_) => StatusCode::BAD_REQUEST,
            ServiceError::Unauthorized => StatusCode::UNAUTHORIZED,
            ServiceError::Forbidden(_) => StatusCode::FORBIDDEN,
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::Conflict(_) => StatusCode::CONFLICT,
            ServiceError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ServiceError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable kind for the `error` field of JSON bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            ServiceError::Validation(_) => "ValidationError",
            ServiceError::Unauthorized => "Unauthorized",
            ServiceError::Forbidden(_) => "Forbidden",
            ServiceError::NotFound(_) => "NotFound",
            ServiceError::Conflict(_) => "Conflict",
            ServiceError::Upstream(_) => "UpstreamError",
            ServiceError::Serialization(_) => "InternalError",
        }
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_follow_error_kind() {
        assert_eq!(ServiceError::Validation("bad".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(ServiceError::Unauthorized.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ServiceError::Forbidden("no".into()).status(), StatusCode::FORBIDDEN);
        assert_eq!(ServiceError::NotFound("Task".into()).status(), StatusCode::NOT_FOUND);
        assert_eq!(ServiceError::Conflict("race".into()).status(), StatusCode::CONFLICT);
        assert_eq!(ServiceError::Upstream("x".into()).status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn not_found_message_names_the_entity() {
        assert_eq!(ServiceError::NotFound("Review".into()).to_string(), "Review not found");
    }
}

use serde::{Deserialize, Serialize};

use crate::error::ServiceError;
use crate::feedback::Feedback;

/// Longest accepted `observed_behavior` or `vulnerabilities` text.
pub const MAX_REVIEW_TEXT_BYTES: usize = 20_000;

/// A hunter's finding on a task
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Review {
    pub review_id: String,
    pub task_id: String,
    pub observed_behavior: String,
    pub vulnerabilities: String,

    /// StoredFile ids of the two attachments
    pub script_file_id: String,
    pub support_file_id: String,

    pub reviewer_name: String,
    #[serde(default)]
    pub feedback: Feedback,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateReviewPayload {
    pub task_id: String,
    pub observed_behavior: String,
    pub vulnerabilities: String,
    pub script_file_id: String,
    pub support_file_id: String,
}

#[derive(Debug, Deserialize)]
pub struct FeedbackPayload {
    pub feedback: String,
}

impl CreateReviewPayload {
    pub fn validate(&self) -> Result<(), ServiceError> {
        if self.observed_behavior.trim().is_empty() {
            return Err(ServiceError::Validation("observed_behavior is required".into()));
        }
        if self.vulnerabilities.trim().is_empty() {
            return Err(ServiceError::Validation("vulnerabilities is required".into()));
        }
        for (field, text) in [
            ("observed_behavior", &self.observed_behavior),
            ("vulnerabilities", &self.vulnerabilities),
        ] {
            if text.len() > MAX_REVIEW_TEXT_BYTES {
                return Err(ServiceError::Validation(format!(
                    "{} is longer than {} bytes",
                    field, MAX_REVIEW_TEXT_BYTES
                )));
            }
        }
        if self.script_file_id.is_empty() || self.support_file_id.is_empty() {
            return Err(ServiceError::Validation(
                "Both script_file_id and support_file_id are required".into(),
            ));
        }
        if self.script_file_id == self.support_file_id {
            return Err(ServiceError::Validation(
                "script and support attachments must be different files".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(observed: String) -> CreateReviewPayload {
        CreateReviewPayload {
            task_id: "t-1".into(),
            observed_behavior: observed,
            vulnerabilities: "CWE-79".into(),
            script_file_id: "f-1".into(),
            support_file_id: "f-2".into(),
        }
    }

    #[test]
    fn text_length_is_capped() {
        assert!(payload("x".repeat(MAX_REVIEW_TEXT_BYTES)).validate().is_ok());
        assert!(matches!(
            payload("x".repeat(MAX_REVIEW_TEXT_BYTES + 1)).validate(),
            Err(ServiceError::Validation(_))
        ));
    }

    #[test]
    fn attachments_must_differ() {
        let mut same = payload("reflected XSS".into());
        same.support_file_id = same.script_file_id.clone();
        assert!(matches!(same.validate(), Err(ServiceError::Validation(_))));
    }
}

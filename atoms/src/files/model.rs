use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::ServiceError;

pub const MAX_FILENAME_LEN: usize = 255;

/// What an uploaded object is attached to.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FilePurpose {
    ReviewScript,
    ReviewSupport,
    Doc,
}

impl FilePurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilePurpose::ReviewScript => "review_script",
            FilePurpose::ReviewSupport => "review_support",
            FilePurpose::Doc => "doc",
        }
    }
}

impl FromStr for FilePurpose {
    type Err = ServiceError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "review_script" => Ok(FilePurpose::ReviewScript),
            "review_support" => Ok(FilePurpose::ReviewSupport),
            "doc" => Ok(FilePurpose::Doc),
            other => Err(ServiceError::Validation(format!("Unknown file purpose '{}'", other))),
        }
    }
}

/// Metadata of an object in the files bucket
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct StoredFile {
    pub file_id: String,
    pub filename: String,
    pub content_type: String,
    pub s3_key: String,
    pub uploaded_by: String,
    pub purpose: FilePurpose,
    pub created_at: String,

    /// Sort key of the review or doc using this file. A file serves one owner.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attached_to: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateUploadPayload {
    pub filename: String,
    pub content_type: Option<String>,
    pub purpose: FilePurpose,
}

impl CreateUploadPayload {
    pub fn validate(&self) -> Result<(), ServiceError> {
        let name = self.filename.trim();
        if name.is_empty() {
            return Err(ServiceError::Validation("filename is required".into()));
        }
        if name.len() > MAX_FILENAME_LEN {
            return Err(ServiceError::Validation(format!(
                "filename must be at most {} characters",
                MAX_FILENAME_LEN
            )));
        }
        if name.contains(['/', '\\']) || name.chars().any(char::is_control) {
            return Err(ServiceError::Validation("filename cannot contain path separators".into()));
        }
        Ok(())
    }
}

/// Returned to the browser, which PUTs the bytes straight to S3.
#[derive(Debug, Serialize)]
pub struct UploadTicket {
    pub file: StoredFile,
    pub upload_url: String,
    pub expires_in_secs: u64,
}

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::ServiceError;

/// The three training libraries hunters browse.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DocKind {
    Text,
    Video,
    Script,
}

impl DocKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocKind::Text => "text",
            DocKind::Video => "video",
            DocKind::Script => "script",
        }
    }

    /// Route segment serving this library (`/api/texts`, ...)
    pub fn from_collection(segment: &str) -> Option<DocKind> {
        match segment {
            "texts" => Some(DocKind::Text),
            "videos" => Some(DocKind::Video),
            "scripts" => Some(DocKind::Script),
            _ => None,
        }
    }
}

impl FromStr for DocKind {
    type Err = ServiceError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "text" => Ok(DocKind::Text),
            "video" => Ok(DocKind::Video),
            "script" => Ok(DocKind::Script),
            other => Err(ServiceError::Validation(format!("Unknown doc kind '{}'", other))),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Doc {
    pub doc_id: String,
    pub kind: DocKind,
    pub title: String,

    /// Text content, video URL or script description depending on `kind`
    pub body: String,
    pub file_id: Option<String>,
    pub created_by: String,
    pub created_at: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateDocPayload {
    pub title: String,
    pub body: String,
    pub file_id: Option<String>,
}

impl CreateDocPayload {
    pub fn validate(&self, kind: DocKind) -> Result<(), ServiceError> {
        if self.title.trim().is_empty() {
            return Err(ServiceError::Validation("title is required".into()));
        }
        if self.title.len() > 200 {
            return Err(ServiceError::Validation("title must be at most 200 characters".into()));
        }
        match kind {
            DocKind::Video => {
                let url = self.body.trim();
                if !(url.starts_with("https://") || url.starts_with("http://")) || url.contains(char::is_whitespace) {
                    return Err(ServiceError::Validation("video body must be an http(s) URL".into()));
                }
            }
            DocKind::Script if self.file_id.is_none() && self.body.trim().is_empty() => {
                return Err(ServiceError::Validation(
                    "script needs a description or an attached file".into(),
                ));
            }
            DocKind::Text if self.body.trim().is_empty() => {
                return Err(ServiceError::Validation("text body is required".into()));
            }
            _ => {}
        }
        Ok(())
    }
}

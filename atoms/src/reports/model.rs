use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::ServiceError;
use crate::feedback::Feedback;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
    Critical,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "Easy",
            Difficulty::Medium => "Medium",
            Difficulty::Hard => "Hard",
            Difficulty::Critical => "Critical",
        }
    }
}

impl FromStr for Difficulty {
    type Err = ServiceError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "Easy" => Ok(Difficulty::Easy),
            "Medium" => Ok(Difficulty::Medium),
            "Hard" => Ok(Difficulty::Hard),
            "Critical" => Ok(Difficulty::Critical),
            other => Err(ServiceError::Validation(format!("Unknown difficulty '{}'", other))),
        }
    }
}

/// Hunter's closing summary for a task (one per task)
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct FinalReport {
    pub task_id: String,
    pub summary: String,
    pub difficulty: Difficulty,
    pub updated_by: String,
    #[serde(default)]
    pub feedback: Feedback,
    pub updated_at: String,
}

/// Upsert body. Hunters send summary and difficulty; reviewers send feedback.
#[derive(Debug, Deserialize)]
pub struct UpsertFinalReportPayload {
    pub task_id: String,
    pub summary: Option<String>,
    pub difficulty: Option<Difficulty>,
    pub feedback: Option<String>,
}

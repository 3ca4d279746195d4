use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ServiceError;
use crate::users::model::Role;

/// Task domain model - a unit of security-testing work
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Task {
    pub task_id: String,
    pub external_id: String,
    pub project_name: String,
    pub industry: String,
    pub domain_link: String,
    pub tool_link: String,
    pub status: TaskStatus,

    /// Username of the claiming hunter; empty while unclaimed
    pub owner: String,

    /// Review ids in submission order
    pub review_ids: Vec<String>,

    pub final_report: bool,

    /// Bumped on every write; delivery is conditioned on it
    pub version: u64,

    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TaskStatus {
    #[serde(rename = "Unclaimed")]
    Unclaimed,
    #[serde(rename = "In Progress")]
    InProgress,
    #[serde(rename = "Completed")]
    Completed,
    #[serde(rename = "Reviewed")]
    Reviewed,
    #[serde(rename = "Deliver")]
    Deliver,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 5] = [
        TaskStatus::Unclaimed,
        TaskStatus::InProgress,
        TaskStatus::Completed,
        TaskStatus::Reviewed,
        TaskStatus::Deliver,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Unclaimed => "Unclaimed",
            TaskStatus::InProgress => "In Progress",
            TaskStatus::Completed => "Completed",
            TaskStatus::Reviewed => "Reviewed",
            TaskStatus::Deliver => "Deliver",
        }
    }

    /// The only status a task may move to from this one.
    pub fn next(&self) -> Option<TaskStatus> {
        match self {
            TaskStatus::Unclaimed => Some(TaskStatus::InProgress),
            TaskStatus::InProgress => Some(TaskStatus::Completed),
            TaskStatus::Completed => Some(TaskStatus::Reviewed),
            TaskStatus::Reviewed => Some(TaskStatus::Deliver),
            TaskStatus::Deliver => None,
        }
    }

    /// Roles allowed to move a task *into* this status.
    ///
    /// Moving into `Completed` additionally requires the caller to own the task
    /// unless they are an admin; that check needs the stored task.
    pub fn entry_roles(&self) -> &'static [Role] {
        match self {
            TaskStatus::Unclaimed => &[],
            TaskStatus::InProgress => &[Role::Hunter],
            TaskStatus::Completed => &[Role::Hunter, Role::Admin],
            TaskStatus::Reviewed => &[Role::Coach, Role::Admin],
            TaskStatus::Deliver => &[Role::Admin],
        }
    }

    /// Check that `role` may request `self` as a target, without looking at storage.
    pub fn authorize_entry(&self, role: Role) -> Result<(), ServiceError> {
        if self.entry_roles().contains(&role) {
            Ok(())
        } else {
            Err(ServiceError::Forbidden(format!(
                "Role {} cannot move a task to {}",
                role, self
            )))
        }
    }

    /// Validate a transition from `self` to `target`.
    pub fn check_transition(&self, target: TaskStatus) -> Result<(), ServiceError> {
        if self.next() == Some(target) {
            Ok(())
        } else {
            Err(ServiceError::Conflict(format!(
                "Illegal status transition {} -> {}",
                self, target
            )))
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = ServiceError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        TaskStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == value)
            .ok_or_else(|| {
                ServiceError::Validation(format!(
                    "Invalid status '{}'; expected one of: Unclaimed, In Progress, Completed, Reviewed, Deliver",
                    value
                ))
            })
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateTaskPayload {
    pub external_id: String,
    pub project_name: String,
    #[serde(default)]
    pub industry: String,
    #[serde(default)]
    pub domain_link: String,
    #[serde(default)]
    pub tool_link: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateTaskPayload {
    pub project_name: Option<String>,
    pub industry: Option<String>,
    pub domain_link: Option<String>,
    pub tool_link: Option<String>,
}

/// Body of `PATCH /api/task/update-status/{task_id}`; status arrives as a raw
/// string so an unknown value becomes a 400 instead of a decode failure.
#[derive(Debug, Deserialize)]
pub struct UpdateStatusPayload {
    pub status: String,
}

impl CreateTaskPayload {
    pub fn validate(&self) -> Result<(), ServiceError> {
        if self.external_id.trim().is_empty() {
            return Err(ServiceError::Validation("external_id is required".into()));
        }
        if self.project_name.trim().is_empty() {
            return Err(ServiceError::Validation("project_name is required".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_are_ordered_along_the_workflow() {
        assert!(TaskStatus::Unclaimed < TaskStatus::InProgress);
        assert!(TaskStatus::Reviewed < TaskStatus::Deliver);
        let mut walked = vec![TaskStatus::Unclaimed];
        while let Some(next) = walked.last().unwrap().next() {
            walked.push(next);
        }
        assert_eq!(walked, TaskStatus::ALL.to_vec());
    }

    #[test]
    fn only_single_forward_steps_are_legal() {
        assert!(TaskStatus::Unclaimed.check_transition(TaskStatus::InProgress).is_ok());
        assert!(TaskStatus::Completed.check_transition(TaskStatus::Reviewed).is_ok());

        let skip = TaskStatus::Unclaimed.check_transition(TaskStatus::Completed).unwrap_err();
        assert!(matches!(skip, ServiceError::Conflict(_)));
        let back = TaskStatus::Reviewed.check_transition(TaskStatus::InProgress).unwrap_err();
        assert!(matches!(back, ServiceError::Conflict(_)));
        assert!(TaskStatus::Deliver.check_transition(TaskStatus::Deliver).is_err());
    }

    #[test]
    fn unknown_status_is_a_validation_error() {
        let err = "Done".parse::<TaskStatus>().unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
        assert_eq!("In Progress".parse::<TaskStatus>().unwrap(), TaskStatus::InProgress);
    }

    #[test]
    fn entry_roles_gate_targets() {
        assert!(TaskStatus::InProgress.authorize_entry(Role::Hunter).is_ok());
        assert!(TaskStatus::InProgress.authorize_entry(Role::Coach).is_err());
        assert!(TaskStatus::Reviewed.authorize_entry(Role::Hunter).is_err());
        assert!(TaskStatus::Deliver.authorize_entry(Role::Coach).is_err());
        assert!(TaskStatus::Deliver.authorize_entry(Role::Admin).is_ok());
        assert!(TaskStatus::Unclaimed.authorize_entry(Role::Admin).is_err());
    }

    #[test]
    fn status_serializes_with_display_names() {
        assert_eq!(serde_json::to_string(&TaskStatus::InProgress).unwrap(), "\"In Progress\"");
        let parsed: TaskStatus = serde_json::from_str("\"Deliver\"").unwrap();
        assert_eq!(parsed, TaskStatus::Deliver);
    }
}

use serde::{Deserialize, Serialize};

use crate::tasks::model::Task;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    TaskCompleted,
    TaskReviewed,
    TaskDelivered,
    UserApproved,
    UserRejected,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::TaskCompleted => "task_completed",
            NotificationKind::TaskReviewed => "task_reviewed",
            NotificationKind::TaskDelivered => "task_delivered",
            NotificationKind::UserApproved => "user_approved",
            NotificationKind::UserRejected => "user_rejected",
        }
    }
}

/// Outbox record; the stream lambda turns each one into an email.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Notification {
    pub notification_id: String,
    pub kind: NotificationKind,
    pub to: String,
    pub subject: String,
    pub body: String,
    pub created_at: String,
}

impl Notification {
    fn new(kind: NotificationKind, to: &str, subject: String, body: String) -> Self {
        Notification {
            notification_id: uuid::Uuid::new_v4().to_string(),
            kind,
            to: to.to_string(),
            subject,
            body,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn task_completed(task: &Task, to: &str) -> Self {
        Self::new(
            NotificationKind::TaskCompleted,
            to,
            format!("[Bug Hunt] {} is ready for review", task.external_id),
            format!(
                "Hunter {} marked task {} ({}) as Completed.\n\nIt has {} submitted review(s) awaiting coach feedback.",
                task.owner,
                task.external_id,
                task.project_name,
                task.review_ids.len()
            ),
        )
    }

    pub fn task_reviewed(task: &Task, reviewer: &str, to: &str) -> Self {
        Self::new(
            NotificationKind::TaskReviewed,
            to,
            format!("[Bug Hunt] {} was reviewed", task.external_id),
            format!(
                "{} reviewed task {} ({}). It is waiting for admin approval before delivery.",
                reviewer, task.external_id, task.project_name
            ),
        )
    }

    pub fn task_delivered(task: &Task, to: &str) -> Self {
        Self::new(
            NotificationKind::TaskDelivered,
            to,
            format!("[Bug Hunt] {} was delivered", task.external_id),
            format!(
                "Your work on task {} ({}) was approved and delivered. Thank you!",
                task.external_id, task.project_name
            ),
        )
    }

    pub fn user_approved(username: &str, to: &str) -> Self {
        Self::new(
            NotificationKind::UserApproved,
            to,
            "[Bug Hunt] Your account was approved".to_string(),
            format!("Hi {}, your account was approved. You can now sign in.", username),
        )
    }

    pub fn user_rejected(username: &str, to: &str) -> Self {
        Self::new(
            NotificationKind::UserRejected,
            to,
            "[Bug Hunt] Your registration was declined".to_string(),
            format!("Hi {}, your registration request was not approved.", username),
        )
    }
}

use bughunt_atoms::reports::FinalReport;
use bughunt_atoms::reviews::Review;
use bughunt_atoms::tasks::Task;
use bughunt_atoms::users::User;
use serde::Serialize;

/// A task joined with its reviews (in submission order) and final report.
#[derive(Debug, Serialize)]
pub struct TaskDetail {
    pub task: Task,
    pub reviews: Vec<Review>,
    pub final_report: Option<FinalReport>,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub expires_in: i64,
    pub user: User,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

use serde::{Deserialize, Serialize};

use crate::reports::model::FinalReport;
use crate::reviews::model::Review;
use crate::tasks::model::Task;

/// Frozen copy of a task at delivery, with its reviews and final report.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct DeliveredTask {
    pub task: Task,
    #[serde(default)]
    pub reviews: Vec<Review>,
    pub final_report: Option<FinalReport>,
    pub delivered_at: String,
    pub delivered_by: String,
}

impl DeliveredTask {
    pub fn task_id(&self) -> &str {
        &self.task.task_id
    }

    pub fn owner(&self) -> &str {
        &self.task.owner
    }
}

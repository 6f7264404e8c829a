//! Response payloads of the action and stats endpoints.

use serde::{Deserialize, Serialize};

use super::{TaskId, TaskStatus};

/// `POST /tasks/submit` -> `{id, status, message}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub id: TaskId,
    pub status: TaskStatus,
    #[serde(default)]
    pub message: String,
}

/// Cancel and delete answer with a free-form status word
/// (`"cancelled"`, `"cancellation_requested"`, `"deleted"`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionResponse {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// `POST /tasks/{id}/retry`: the retry is a brand-new task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryResponse {
    pub status: String,
    pub new_task_id: TaskId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Task counts by status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStats {
    #[serde(rename = "PENDING", default)]
    pub pending: u64,
    #[serde(rename = "RUNNING", default)]
    pub running: u64,
    #[serde(rename = "COMPLETED", default)]
    pub completed: u64,
    #[serde(rename = "FAILED", default)]
    pub failed: u64,
    #[serde(alias = "TOTAL", default)]
    pub total: u64,
}

impl TaskStats {
    /// All counters zero; what an unsupported stats endpoint degrades to.
    pub fn zero() -> Self {
        Self::default()
    }

    pub fn count(&self, status: TaskStatus) -> u64 {
        match status {
            TaskStatus::Pending => self.pending,
            TaskStatus::Running => self.running,
            TaskStatus::Completed => self.completed,
            TaskStatus::Failed => self.failed,
            TaskStatus::Unknown => 0,
        }
    }

    pub fn record(&mut self, status: TaskStatus) {
        match status {
            TaskStatus::Pending => self.pending += 1,
            TaskStatus::Running => self.running += 1,
            TaskStatus::Completed => self.completed += 1,
            TaskStatus::Failed => self.failed += 1,
            TaskStatus::Unknown => {}
        }
        self.total += 1;
    }
}

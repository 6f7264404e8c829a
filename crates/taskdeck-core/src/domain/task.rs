//! Task record as seen by the client.
//!
//! List and search endpoints return summaries (`id`, `status`, `task_type`,
//! `created_at`); detail returns everything including logs. Both decode into
//! the same [`Task`] with the missing parts left empty.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::time;
use super::{LogLevel, TaskId, TaskStatus};

/// One line of a task's append-only log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    #[serde(with = "time::required")]
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
}

/// A unit of agent work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    #[serde(alias = "task_id")]
    pub id: TaskId,
    pub status: TaskStatus,
    #[serde(default)]
    pub task_type: String,

    #[serde(with = "time::required")]
    pub created_at: DateTime<Utc>,
    #[serde(default, with = "time::optional", skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, with = "time::optional", skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    /// Originating request: instructions, context URLs, agent config.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_data: Option<serde_json::Map<String, serde_json::Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_details: Option<String>,

    /// Chronological; insertion order is time order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub logs: Vec<LogEntry>,
}

/// The first lifecycle invariant a record breaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvariantViolation {
    /// `started_at` must be null exactly while the task is pending.
    StartedAtMismatch,
    /// `completed_at` must be set exactly when the task is terminal.
    CompletedAtMismatch,
    /// Both `result_data` and `error_details` are present.
    ResultAndError,
    /// `result_data` on a task that is not `COMPLETED`.
    ResultWithoutCompletion,
    /// `error_details` on a task that is not `FAILED`.
    ErrorWithoutFailure,
}

impl Task {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Instructions the task was submitted with, if the input carries them.
    pub fn instructions(&self) -> Option<&str> {
        self.input_data
            .as_ref()?
            .get("task_instructions")?
            .as_str()
    }

    /// Checks the lifecycle invariants.
    ///
    /// `Unknown` statuses are not checked: we cannot tell which rule applies.
    pub fn check_invariants(&self) -> Result<(), InvariantViolation> {
        if self.status == TaskStatus::Unknown {
            return Ok(());
        }
        if self.started_at.is_none() != (self.status == TaskStatus::Pending) {
            return Err(InvariantViolation::StartedAtMismatch);
        }
        if self.completed_at.is_some() != self.status.is_terminal() {
            return Err(InvariantViolation::CompletedAtMismatch);
        }
        match (&self.result_data, &self.error_details) {
            (Some(_), Some(_)) => Err(InvariantViolation::ResultAndError),
            (Some(_), None) if self.status != TaskStatus::Completed => {
                Err(InvariantViolation::ResultWithoutCompletion)
            }
            (None, Some(_)) if self.status != TaskStatus::Failed => {
                Err(InvariantViolation::ErrorWithoutFailure)
            }
            _ => Ok(()),
        }
    }
}

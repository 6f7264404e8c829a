//! Actions - ユーザー操作の実行
//!
//! Submit, cancel, retry and delete. Preconditions are checked locally first
//! and a failed check skips the network call; the store may still refuse.
//! Successes resync the affected views. Only delete touches a snapshot
//! before the resync. Every failure goes through one handler that logs the
//! technical detail and builds the user-facing message.

use std::fmt;
use std::sync::Arc;

use super::sync::SyncTarget;
use crate::domain::{ApiError, SubmitRequest, Task, TaskId, TaskStatus};
use crate::ports::{Confirm, TaskApi};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Submit,
    Cancel,
    Retry,
    Delete,
}

impl Action {
    fn label(self) -> &'static str {
        match self {
            Action::Submit => "Submit task",
            Action::Cancel => "Cancel task",
            Action::Retry => "Retry task",
            Action::Delete => "Delete task",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Why an action did not reach the network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The task's status does not allow the action.
    NotAllowed { action: Action, status: TaskStatus },
    /// The user declined the confirmation prompt.
    Declined,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    /// Navigate to the new task.
    Submitted { id: TaskId, message: String },
    Cancelled { status: String, message: Option<String> },
    /// Track `new_id`; the original task is unchanged.
    Retried { new_id: TaskId, message: Option<String> },
    Deleted { id: TaskId },
    Skipped(SkipReason),
}

impl ActionOutcome {
    /// Task the caller should navigate to, if any.
    pub fn navigate_to(&self) -> Option<&TaskId> {
        match self {
            ActionOutcome::Submitted { id, .. } => Some(id),
            ActionOutcome::Retried { new_id, .. } => Some(new_id),
            _ => None,
        }
    }
}

/// A failed action. Snapshots are left as they were.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct ActionFailure {
    pub action: Action,
    pub task_id: Option<TaskId>,
    /// Context plus server detail, ready for an alert.
    pub message: String,
    #[source]
    pub source: ApiError,
}

/// ActionOrchestrator は操作を実行する
#[derive(Clone)]
pub struct ActionOrchestrator {
    api: Arc<dyn TaskApi>,
    confirm: Arc<dyn Confirm>,
}

impl ActionOrchestrator {
    pub fn new(api: Arc<dyn TaskApi>, confirm: Arc<dyn Confirm>) -> Self {
        Self { api, confirm }
    }

    pub async fn submit(
        &self,
        request: &SubmitRequest,
        targets: &[&dyn SyncTarget],
    ) -> Result<ActionOutcome, ActionFailure> {
        let response = self
            .api
            .submit_task(request)
            .await
            .map_err(|err| fail(Action::Submit, None, err))?;
        tracing::info!(task_id = %response.id, "task submitted");
        resync_all(targets).await;
        Ok(ActionOutcome::Submitted {
            id: response.id,
            message: response.message,
        })
    }

    pub async fn cancel(
        &self,
        task: &Task,
        targets: &[&dyn SyncTarget],
    ) -> Result<ActionOutcome, ActionFailure> {
        if !task.status.can_cancel() {
            return Ok(skip(Action::Cancel, task));
        }
        let response = self
            .api
            .cancel_task(&task.id)
            .await
            .map_err(|err| fail(Action::Cancel, Some(&task.id), err))?;
        tracing::info!(task_id = %task.id, status = %response.status, "task cancel accepted");
        resync_all(targets).await;
        Ok(ActionOutcome::Cancelled {
            status: response.status,
            message: response.message,
        })
    }

    pub async fn retry(
        &self,
        task: &Task,
        targets: &[&dyn SyncTarget],
    ) -> Result<ActionOutcome, ActionFailure> {
        if !task.status.can_retry() {
            return Ok(skip(Action::Retry, task));
        }
        let response = self
            .api
            .retry_task(&task.id)
            .await
            .map_err(|err| fail(Action::Retry, Some(&task.id), err))?;
        tracing::info!(task_id = %task.id, new_task_id = %response.new_task_id, "task retried");
        resync_all(targets).await;
        Ok(ActionOutcome::Retried {
            new_id: response.new_task_id,
            message: response.message,
        })
    }

    /// Asks for confirmation first; on success the row disappears from every
    /// target before they resync.
    pub async fn delete(
        &self,
        task: &Task,
        targets: &[&dyn SyncTarget],
    ) -> Result<ActionOutcome, ActionFailure> {
        if !task.status.can_delete() {
            return Ok(skip(Action::Delete, task));
        }
        let prompt = format!("Delete task {} and its logs? This cannot be undone.", task.id);
        if !self.confirm.confirm(&prompt).await {
            tracing::debug!(task_id = %task.id, "delete declined");
            return Ok(ActionOutcome::Skipped(SkipReason::Declined));
        }
        self.api
            .delete_task(&task.id)
            .await
            .map_err(|err| fail(Action::Delete, Some(&task.id), err))?;
        tracing::info!(task_id = %task.id, "task deleted");
        for target in targets {
            target.forget_task(&task.id);
        }
        resync_all(targets).await;
        Ok(ActionOutcome::Deleted {
            id: task.id.clone(),
        })
    }
}

fn skip(action: Action, task: &Task) -> ActionOutcome {
    tracing::debug!(%action, task_id = %task.id, status = %task.status, "precondition not met, skipped");
    ActionOutcome::Skipped(SkipReason::NotAllowed {
        action,
        status: task.status,
    })
}

async fn resync_all(targets: &[&dyn SyncTarget]) {
    for target in targets {
        target.resync().await;
    }
}

fn fail(action: Action, task_id: Option<&TaskId>, err: ApiError) -> ActionFailure {
    tracing::error!(
        %action,
        task_id = ?task_id.map(TaskId::as_str),
        kind = ?err.kind(),
        status_code = ?err.status_code(),
        detail = ?err.detail(),
        "task action failed"
    );
    ActionFailure {
        action,
        task_id: task_id.cloned(),
        message: format!("{action} failed. {}", err.user_message()),
        source: err,
    }
}

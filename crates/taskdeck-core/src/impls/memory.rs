//! In-memory task store.
//!
//! Plays the backend in tests: same status rules, same rejections, same
//! response shapes, and stats degrading to zeros when disabled. Worker progress is driven by hand
//! through [`InMemoryTaskStore::start`], [`complete`](InMemoryTaskStore::complete)
//! and [`fail`](InMemoryTaskStore::fail).

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::Duration;
use tokio::sync::Mutex;

use crate::domain::request::MAX_LOG_LIMIT;
use crate::domain::{
    ActionResponse, ApiError, ErrorKind, ListQuery, LogEntry, LogLevel, LogQuery, RetryResponse,
    SearchFilter, SubmitRequest, SubmitResponse, Task, TaskId, TaskStats, TaskStatus,
};
use crate::ports::{Clock, IdGenerator, SystemClock, TaskApi, UlidGenerator};

const TASK_TYPE: &str = "general_agent_task";
const DEFAULT_LOG_LIMIT: usize = 1000;

/// Endpoints a backend may not implement.
#[derive(Debug, Clone, Copy)]
struct Features {
    search: bool,
    stats: bool,
    delete: bool,
}

/// In-memory store state.
struct StoreState {
    /// All task records (single source of truth).
    records: HashMap<TaskId, Task>,

    /// Insertion order, oldest first.
    order: Vec<TaskId>,

    features: Features,

    /// Every call fails as if the server were down.
    offline: bool,
}

impl StoreState {
    fn get(&self, id: &TaskId) -> Result<&Task, ApiError> {
        self.records
            .get(id)
            .ok_or_else(|| ApiError::not_found(format!("task {id} does not exist")))
    }

    fn get_mut(&mut self, id: &TaskId) -> Result<&mut Task, ApiError> {
        self.records
            .get_mut(id)
            .ok_or_else(|| ApiError::not_found(format!("task {id} does not exist")))
    }

    /// Newest first, like the backend's `ORDER BY created_at DESC`.
    fn newest_first(&self) -> impl Iterator<Item = &Task> {
        self.order.iter().rev().filter_map(|id| self.records.get(id))
    }

    fn insert(&mut self, task: Task) {
        self.order.push(task.id.clone());
        self.records.insert(task.id.clone(), task);
    }
}

/// Rejection the backend answers with HTTP 400.
fn rejected(detail: impl Into<String>) -> ApiError {
    ApiError::new(ErrorKind::Server, Some(400), "Server error (HTTP 400)").with_detail(detail)
}

/// List and search return summaries without logs.
fn summary(task: &Task) -> Task {
    Task {
        logs: Vec::new(),
        ..task.clone()
    }
}

/// In-memory implementation of [`TaskApi`].
#[derive(Clone)]
pub struct InMemoryTaskStore {
    state: Arc<Mutex<StoreState>>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    calls: Arc<AtomicUsize>,
}

impl Default for InMemoryTaskStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }

    pub fn with_clock<C: Clock + Clone + 'static>(clock: C) -> Self {
        Self {
            state: Arc::new(Mutex::new(StoreState {
                records: HashMap::new(),
                order: Vec::new(),
                features: Features {
                    search: true,
                    stats: true,
                    delete: true,
                },
                offline: false,
            })),
            clock: Arc::new(clock.clone()),
            ids: Arc::new(UlidGenerator::new(clock)),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Answer search with 501.
    pub async fn disable_search(&self) {
        self.state.lock().await.features.search = false;
    }

    /// Behave like a backend answering stats with 501: zeros, no error.
    pub async fn disable_stats(&self) {
        self.state.lock().await.features.stats = false;
    }

    /// Answer delete with 501.
    pub async fn disable_delete(&self) {
        self.state.lock().await.features.delete = false;
    }

    pub async fn set_offline(&self, offline: bool) {
        self.state.lock().await.offline = offline;
    }

    /// Number of `TaskApi` calls received so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Current record, bypassing the API (and the call counter).
    pub async fn snapshot(&self, id: &TaskId) -> Option<Task> {
        self.state.lock().await.records.get(id).cloned()
    }

    /// PENDING -> RUNNING.
    pub async fn start(&self, id: &TaskId) -> Result<(), ApiError> {
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        let task = state.get_mut(id)?;
        if task.status != TaskStatus::Pending {
            return Err(rejected(format!(
                "Task cannot be started, status is {}.",
                task.status
            )));
        }
        task.status = TaskStatus::Running;
        task.started_at = Some(now);
        push_log(task, now, LogLevel::Info, "Worker: task started.");
        Ok(())
    }

    /// RUNNING -> COMPLETED with a result.
    pub async fn complete(&self, id: &TaskId, result: serde_json::Value) -> Result<(), ApiError> {
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        let task = state.get_mut(id)?;
        if task.status != TaskStatus::Running {
            return Err(rejected(format!(
                "Task cannot complete, status is {}.",
                task.status
            )));
        }
        task.status = TaskStatus::Completed;
        task.completed_at = Some(now);
        task.result_data = Some(result);
        push_log(task, now, LogLevel::Info, "Worker: task completed.");
        Ok(())
    }

    /// PENDING or RUNNING -> FAILED with error details.
    pub async fn fail(&self, id: &TaskId, error: impl Into<String>) -> Result<(), ApiError> {
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        let task = state.get_mut(id)?;
        mark_failed(task, now, error.into())
    }

    pub async fn append_log(
        &self,
        id: &TaskId,
        level: LogLevel,
        message: impl Into<String>,
    ) -> Result<(), ApiError> {
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        let task = state.get_mut(id)?;
        push_log(task, now, level, message);
        Ok(())
    }

    /// Counts the call and takes the lock, failing while offline.
    async fn enter(&self) -> Result<tokio::sync::MutexGuard<'_, StoreState>, ApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let state = self.state.lock().await;
        if state.offline {
            return Err(ApiError::network_unreachable(
                "memory://tasks",
                "store is offline",
            ));
        }
        Ok(state)
    }
}

fn push_log(
    task: &mut Task,
    at: chrono::DateTime<chrono::Utc>,
    level: LogLevel,
    message: impl Into<String>,
) {
    task.logs.push(LogEntry {
        timestamp: at,
        level,
        message: message.into(),
    });
}

fn mark_failed(
    task: &mut Task,
    now: chrono::DateTime<chrono::Utc>,
    error: String,
) -> Result<(), ApiError> {
    if task.status.is_terminal() {
        return Err(rejected(format!(
            "Task cannot fail, status is {}.",
            task.status
        )));
    }
    // a task failed before it ran still gets a start time
    task.started_at.get_or_insert(now);
    task.status = TaskStatus::Failed;
    task.completed_at = Some(now);
    push_log(task, now, LogLevel::Error, error.clone());
    task.error_details = Some(error);
    Ok(())
}

#[async_trait]
impl TaskApi for InMemoryTaskStore {
    async fn list_tasks(&self, query: ListQuery) -> Result<Vec<Task>, ApiError> {
        query.validate()?;
        let state = self.enter().await?;
        Ok(state
            .newest_first()
            .skip(query.offset as usize)
            .take(query.limit as usize)
            .map(summary)
            .collect())
    }

    async fn search_tasks(&self, filter: &SearchFilter) -> Result<Vec<Task>, ApiError> {
        let filter = filter.normalized()?;
        let state = self.enter().await?;
        if !state.features.search {
            return Err(ApiError::feature_unavailable("task search"));
        }
        let cutoff = filter
            .days
            .map(|days| self.clock.now() - Duration::days(i64::from(days)));
        Ok(state
            .newest_first()
            .filter(|task| {
                filter
                    .status
                    .as_deref()
                    .is_none_or(|status| task.status.as_str() == status)
            })
            .filter(|task| {
                filter
                    .task_type
                    .as_deref()
                    .is_none_or(|t| task.task_type == t)
            })
            .filter(|task| cutoff.is_none_or(|cutoff| task.created_at >= cutoff))
            .take(crate::domain::request::DEFAULT_LIST_LIMIT as usize)
            .map(summary)
            .collect())
    }

    async fn get_task_details(&self, id: &TaskId) -> Result<Task, ApiError> {
        let state = self.enter().await?;
        state.get(id).cloned()
    }

    async fn get_task_logs(&self, id: &TaskId, query: LogQuery) -> Result<Vec<LogEntry>, ApiError> {
        query.validate()?;
        let state = self.enter().await?;
        let task = state.get(id)?;
        let limit = query
            .limit
            .map_or(DEFAULT_LOG_LIMIT, |l| l.min(MAX_LOG_LIMIT) as usize);
        Ok(task
            .logs
            .iter()
            .filter(|entry| query.level.is_none_or(|level| entry.level == level))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn get_task_stats(&self) -> Result<TaskStats, ApiError> {
        let state = self.enter().await?;
        if !state.features.stats {
            tracing::debug!("stats not implemented by the store, reporting zeros");
            return Ok(TaskStats::zero());
        }
        let mut stats = TaskStats::zero();
        for task in state.records.values() {
            stats.record(task.status);
        }
        Ok(stats)
    }

    async fn submit_task(&self, request: &SubmitRequest) -> Result<SubmitResponse, ApiError> {
        request.validate()?;
        let mut state = self.enter().await?;
        let now = self.clock.now();
        let id = self.ids.generate_task_id();

        let input = serde_json::to_value(request)
            .map_err(|err| ApiError::malformed_response("submit request", err))?;
        let mut task = Task {
            id: id.clone(),
            status: TaskStatus::Pending,
            task_type: TASK_TYPE.to_string(),
            created_at: now,
            started_at: None,
            completed_at: None,
            input_data: input.as_object().cloned(),
            result_data: None,
            error_details: None,
            logs: Vec::new(),
        };
        push_log(&mut task, now, LogLevel::Info, "API: Task submitted.");
        state.insert(task);
        tracing::debug!(task_id = %id, "task submitted to in-memory store");

        Ok(SubmitResponse {
            id,
            status: TaskStatus::Pending,
            message: "Agent task accepted and queued.".to_string(),
        })
    }

    async fn cancel_task(&self, id: &TaskId) -> Result<ActionResponse, ApiError> {
        let mut state = self.enter().await?;
        let now = self.clock.now();
        let task = state.get_mut(id)?;
        match task.status {
            TaskStatus::Pending => {
                mark_failed(task, now, "Task cancelled by user before start.".into())?;
                Ok(ActionResponse {
                    status: "cancelled".into(),
                    message: Some("Task was pending and has been marked as failed.".into()),
                })
            }
            TaskStatus::Running => {
                mark_failed(task, now, "Task cancelled by user request.".into())?;
                Ok(ActionResponse {
                    status: "cancellation_requested".into(),
                    message: Some("Cancellation requested; task marked as failed.".into()),
                })
            }
            other => Err(rejected(format!(
                "Task cannot be cancelled, status is {other}."
            ))),
        }
    }

    async fn retry_task(&self, id: &TaskId) -> Result<RetryResponse, ApiError> {
        let mut state = self.enter().await?;
        let now = self.clock.now();
        let original = state.get(id)?;
        if original.status != TaskStatus::Failed {
            return Err(rejected(format!(
                "Only FAILED tasks can be retried (status: {}).",
                original.status
            )));
        }

        let new_id = self.ids.generate_task_id();
        let mut task = Task {
            id: new_id.clone(),
            status: TaskStatus::Pending,
            task_type: original.task_type.clone(),
            created_at: now,
            started_at: None,
            completed_at: None,
            input_data: original.input_data.clone(),
            result_data: None,
            error_details: None,
            logs: Vec::new(),
        };
        push_log(
            &mut task,
            now,
            LogLevel::Info,
            format!("API: Task created as retry of {id}."),
        );
        state.insert(task);

        Ok(RetryResponse {
            status: "retry_queued".into(),
            message: Some(format!("New task {new_id} created and queued for retry.")),
            new_task_id: new_id,
        })
    }

    async fn delete_task(&self, id: &TaskId) -> Result<ActionResponse, ApiError> {
        let mut state = self.enter().await?;
        if !state.features.delete {
            return Err(ApiError::feature_unavailable("task deletion"));
        }
        if state.get(id)?.status == TaskStatus::Running {
            return Err(rejected("Cannot delete a RUNNING task. Cancel it first."));
        }
        state.records.remove(id);
        state.order.retain(|existing| existing != id);
        Ok(ActionResponse {
            status: "deleted".into(),
            message: Some(format!("Task {id} and its logs have been deleted.")),
        })
    }
}

//! TaskApi port - タスク API の境界
//!
//! One method per backend operation. Implementations translate each call into
//! exactly one request and return either a typed value or a normalized
//! [`ApiError`]; transport-specific error shapes never cross this trait.

use async_trait::async_trait;

use crate::domain::{
    ActionResponse, ApiError, ListQuery, LogEntry, LogQuery, RetryResponse, SearchFilter,
    SubmitRequest, SubmitResponse, Task, TaskId, TaskStats,
};

/// TaskApi はタスクストアへの型付きアクセス
///
/// # 契約
/// - list/search: "not found" is an empty list, not an error
/// - search/delete: HTTP 501 is `FeatureUnavailable`
/// - stats: HTTP 501 degrades to all-zero counts
#[async_trait]
pub trait TaskApi: Send + Sync {
    async fn list_tasks(&self, query: ListQuery) -> Result<Vec<Task>, ApiError>;

    async fn search_tasks(&self, filter: &SearchFilter) -> Result<Vec<Task>, ApiError>;

    /// Full record including logs.
    async fn get_task_details(&self, id: &TaskId) -> Result<Task, ApiError>;

    async fn get_task_logs(&self, id: &TaskId, query: LogQuery) -> Result<Vec<LogEntry>, ApiError>;

    async fn get_task_stats(&self) -> Result<TaskStats, ApiError>;

    async fn submit_task(&self, request: &SubmitRequest) -> Result<SubmitResponse, ApiError>;

    async fn cancel_task(&self, id: &TaskId) -> Result<ActionResponse, ApiError>;

    /// Requeues a failed task under a new id; the original is untouched.
    async fn retry_task(&self, id: &TaskId) -> Result<RetryResponse, ApiError>;

    async fn delete_task(&self, id: &TaskId) -> Result<ActionResponse, ApiError>;
}

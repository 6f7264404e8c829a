//! Scope - ビューごとの取得対象
//!
//! A scope says what one view fetches and how its snapshot reacts to
//! terminal results, optimistic deletes and pushed status changes.

use std::time::Duration;

use async_trait::async_trait;

use crate::domain::{ApiError, ListQuery, SearchFilter, Task, TaskId, TaskStats, TaskStatus};
use crate::ports::TaskApi;

/// Polling period per kind of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollIntervals {
    pub list: Duration,
    pub search: Duration,
    pub detail: Duration,
    pub stats: Duration,
}

impl Default for PollIntervals {
    fn default() -> Self {
        Self {
            list: Duration::from_secs(10),
            search: Duration::from_secs(10),
            detail: Duration::from_secs(5),
            stats: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewKind {
    List,
    Search,
    Detail,
    Stats,
}

impl PollIntervals {
    pub fn for_kind(&self, kind: ViewKind) -> Duration {
        match kind {
            ViewKind::List => self.list,
            ViewKind::Search => self.search,
            ViewKind::Detail => self.detail,
            ViewKind::Stats => self.stats,
        }
    }
}

/// Scope はビューが同期する対象
#[async_trait]
pub trait Scope: Send + Sync + 'static {
    type Data: Clone + Send + Sync + 'static;

    fn kind(&self) -> ViewKind;

    async fn fetch(&self, api: &dyn TaskApi) -> Result<Self::Data, ApiError>;

    /// Whether the timer keeps running once `data` is the snapshot.
    fn keeps_polling(&self, _data: &Self::Data) -> bool {
        true
    }

    /// Drops `id` from the snapshot; returns whether anything was removed.
    fn forget(&self, _data: &mut Self::Data, _id: &TaskId) -> bool {
        false
    }

    /// Whether a pushed status change for `id` concerns this view.
    fn tracks(&self, _id: &TaskId, _status: TaskStatus) -> bool {
        false
    }
}

fn forget_row(rows: &mut Vec<Task>, id: &TaskId) -> bool {
    let before = rows.len();
    rows.retain(|task| &task.id != id);
    rows.len() != before
}

/// The task list.
#[derive(Debug, Clone, Default)]
pub struct ListScope {
    pub query: ListQuery,
}

#[async_trait]
impl Scope for ListScope {
    type Data = Vec<Task>;

    fn kind(&self) -> ViewKind {
        ViewKind::List
    }

    async fn fetch(&self, api: &dyn TaskApi) -> Result<Vec<Task>, ApiError> {
        api.list_tasks(self.query).await
    }

    fn forget(&self, data: &mut Vec<Task>, id: &TaskId) -> bool {
        forget_row(data, id)
    }
}

/// Filtered task list.
#[derive(Debug, Clone, Default)]
pub struct SearchScope {
    pub filter: SearchFilter,
}

#[async_trait]
impl Scope for SearchScope {
    type Data = Vec<Task>;

    fn kind(&self) -> ViewKind {
        ViewKind::Search
    }

    async fn fetch(&self, api: &dyn TaskApi) -> Result<Vec<Task>, ApiError> {
        api.search_tasks(&self.filter).await
    }

    fn forget(&self, data: &mut Vec<Task>, id: &TaskId) -> bool {
        forget_row(data, id)
    }
}

/// One task with its logs. Polls only while the task is not terminal.
#[derive(Debug, Clone)]
pub struct DetailScope {
    pub id: TaskId,
}

impl DetailScope {
    pub fn new(id: impl Into<TaskId>) -> Self {
        Self { id: id.into() }
    }
}

#[async_trait]
impl Scope for DetailScope {
    type Data = Task;

    fn kind(&self) -> ViewKind {
        ViewKind::Detail
    }

    async fn fetch(&self, api: &dyn TaskApi) -> Result<Task, ApiError> {
        api.get_task_details(&self.id).await
    }

    fn keeps_polling(&self, data: &Task) -> bool {
        !data.is_terminal()
    }

    fn tracks(&self, id: &TaskId, status: TaskStatus) -> bool {
        &self.id == id && status.is_terminal()
    }
}

/// Counts by status.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatsScope;

#[async_trait]
impl Scope for StatsScope {
    type Data = TaskStats;

    fn kind(&self) -> ViewKind {
        ViewKind::Stats
    }

    async fn fetch(&self, api: &dyn TaskApi) -> Result<TaskStats, ApiError> {
        api.get_task_stats().await
    }
}

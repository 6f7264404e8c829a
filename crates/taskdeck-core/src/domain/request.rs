//! Request payloads and their client-side validation.
//!
//! The rules mirror what the backend enforces, so bad input fails before a
//! network call with the same `"field - reason"` message format.

use serde::{Deserialize, Serialize};

use super::{ApiError, LogLevel, TaskStatus};

/// Shortest instruction text the backend accepts.
pub const MIN_INSTRUCTIONS_LEN: usize = 10;

pub const MAX_LIST_LIMIT: u32 = 1000;
pub const DEFAULT_LIST_LIMIT: u32 = 100;
pub const MAX_LOG_LIMIT: u32 = 5000;

/// Payload of `POST /tasks/submit`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitRequest {
    pub task_instructions: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_urls: Option<Vec<String>>,
    /// Open agent configuration, e.g. `{"use_vision": false, "max_steps": 15}`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_config: Option<serde_json::Map<String, serde_json::Value>>,
}

impl SubmitRequest {
    pub fn new(task_instructions: impl Into<String>) -> Self {
        Self {
            task_instructions: task_instructions.into(),
            context_urls: None,
            agent_config: None,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.context_urls.get_or_insert_with(Vec::new).push(url.into());
        self
    }

    pub fn with_config(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.agent_config
            .get_or_insert_with(serde_json::Map::new)
            .insert(key.into(), value);
        self
    }

    pub fn validate(&self) -> Result<(), ApiError> {
        let mut violations: Vec<(String, String)> = Vec::new();

        let instructions = self.task_instructions.trim();
        if instructions.is_empty() {
            violations.push(("task_instructions".into(), "must not be empty".into()));
        } else if instructions.chars().count() < MIN_INSTRUCTIONS_LEN {
            violations.push((
                "task_instructions".into(),
                format!("must be at least {MIN_INSTRUCTIONS_LEN} characters"),
            ));
        }

        for (i, url) in self.context_urls.iter().flatten().enumerate() {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                violations.push((
                    format!("context_urls.{i}"),
                    format!("invalid URL '{url}', must start with http:// or https://"),
                ));
            }
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(ApiError::invalid_fields(violations))
        }
    }
}

/// Query of `GET /tasks/search/json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub days: Option<u32>,
}

impl SearchFilter {
    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = Some(status.as_str().to_string());
        self
    }

    pub fn with_task_type(mut self, task_type: impl Into<String>) -> Self {
        self.task_type = Some(task_type.into());
        self
    }

    pub fn within_days(mut self, days: u32) -> Self {
        self.days = Some(days);
        self
    }

    /// Returns the filter with its status upper-cased, or the violations.
    pub fn normalized(&self) -> Result<Self, ApiError> {
        let mut violations: Vec<(&str, String)> = Vec::new();
        let status = match self.status.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => {
                let upper = raw.to_ascii_uppercase();
                if TaskStatus::ALL.iter().any(|s| s.as_str() == upper) {
                    Some(upper)
                } else {
                    violations.push((
                        "status",
                        "must be one of PENDING, RUNNING, COMPLETED, FAILED".to_string(),
                    ));
                    None
                }
            }
        };
        if self.days == Some(0) {
            violations.push(("days", "must be at least 1".to_string()));
        }
        if !violations.is_empty() {
            return Err(ApiError::invalid_fields(violations));
        }
        Ok(Self {
            status,
            task_type: self
                .task_type
                .as_ref()
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty()),
            days: self.days,
        })
    }
}

/// Paging for `GET /tasks/list/json`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListQuery {
    pub limit: u32,
    pub offset: u32,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIST_LIMIT,
            offset: 0,
        }
    }
}

impl ListQuery {
    pub fn new(limit: u32, offset: u32) -> Self {
        Self { limit, offset }
    }

    pub fn validate(&self) -> Result<(), ApiError> {
        if self.limit == 0 || self.limit > MAX_LIST_LIMIT {
            return Err(ApiError::invalid_fields([(
                "limit",
                format!("must be between 1 and {MAX_LIST_LIMIT}"),
            )]));
        }
        Ok(())
    }
}

/// Filter for `GET /tasks/{id}/logs/json`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LogQuery {
    pub level: Option<LogLevel>,
    pub limit: Option<u32>,
}

impl LogQuery {
    pub fn validate(&self) -> Result<(), ApiError> {
        if let Some(limit) = self.limit
            && (limit == 0 || limit > MAX_LOG_LIMIT)
        {
            return Err(ApiError::invalid_fields([(
                "limit",
                format!("must be between 1 and {MAX_LOG_LIMIT}"),
            )]));
        }
        Ok(())
    }
}

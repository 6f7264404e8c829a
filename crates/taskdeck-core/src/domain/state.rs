//! State - タスクの状態とログレベル
//!
//! Both enums are closed: values the backend sends that we do not know decode
//! to `Unknown` instead of failing the whole record.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// TaskStatus はタスクの状態
///
/// # 状態遷移
/// - Pending -> Running -> Completed
/// - Pending -> Running -> Failed
/// - Pending -> Failed (cancelled before start)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "&'static str")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    /// Anything the backend sent that is not one of the four statuses.
    Unknown,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 4] = [
        TaskStatus::Pending,
        TaskStatus::Running,
        TaskStatus::Completed,
        TaskStatus::Failed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "PENDING",
            TaskStatus::Running => "RUNNING",
            TaskStatus::Completed => "COMPLETED",
            TaskStatus::Failed => "FAILED",
            TaskStatus::Unknown => "UNKNOWN",
        }
    }

    /// No further automatic transition is expected.
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    pub fn can_cancel(self) -> bool {
        matches!(self, TaskStatus::Pending | TaskStatus::Running)
    }

    pub fn can_retry(self) -> bool {
        self == TaskStatus::Failed
    }

    pub fn can_delete(self) -> bool {
        self.is_terminal()
    }

    pub fn tone(self) -> Tone {
        match self {
            TaskStatus::Pending => Tone::Info,
            TaskStatus::Running => Tone::Progress,
            TaskStatus::Completed => Tone::Success,
            TaskStatus::Failed => Tone::Danger,
            TaskStatus::Unknown => Tone::Neutral,
        }
    }
}

impl FromStr for TaskStatus {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let status = match s.trim().to_ascii_uppercase().as_str() {
            "PENDING" => TaskStatus::Pending,
            "RUNNING" => TaskStatus::Running,
            "COMPLETED" => TaskStatus::Completed,
            "FAILED" => TaskStatus::Failed,
            _ => TaskStatus::Unknown,
        };
        Ok(status)
    }
}

impl From<String> for TaskStatus {
    fn from(value: String) -> Self {
        let Ok(status) = value.parse::<TaskStatus>();
        status
    }
}

impl From<TaskStatus> for &'static str {
    fn from(value: TaskStatus) -> Self {
        value.as_str()
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity of a task log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "&'static str")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
    Unknown,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
            LogLevel::Critical => "CRITICAL",
            LogLevel::Unknown => "UNKNOWN",
        }
    }

    pub fn tone(self) -> Tone {
        match self {
            LogLevel::Debug => Tone::Neutral,
            LogLevel::Info => Tone::Info,
            LogLevel::Warning => Tone::Warning,
            LogLevel::Error | LogLevel::Critical => Tone::Danger,
            LogLevel::Unknown => Tone::Neutral,
        }
    }
}

impl FromStr for LogLevel {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let level = match s.trim().to_ascii_uppercase().as_str() {
            "DEBUG" => LogLevel::Debug,
            "INFO" => LogLevel::Info,
            "WARNING" | "WARN" => LogLevel::Warning,
            "ERROR" => LogLevel::Error,
            "CRITICAL" => LogLevel::Critical,
            _ => LogLevel::Unknown,
        };
        Ok(level)
    }
}

impl From<String> for LogLevel {
    fn from(value: String) -> Self {
        let Ok(level) = value.parse::<LogLevel>();
        level
    }
}

impl From<LogLevel> for &'static str {
    fn from(value: LogLevel) -> Self {
        value.as_str()
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Presentation class shared by statuses and log levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tone {
    Neutral,
    Info,
    Progress,
    Success,
    Warning,
    Danger,
}

impl Tone {
    /// Single-character marker used by plain-text renderers.
    pub fn glyph(self) -> char {
        match self {
            Tone::Neutral => '·',
            Tone::Info => '○',
            Tone::Progress => '▶',
            Tone::Success => '✔',
            Tone::Warning => '!',
            Tone::Danger => '✖',
        }
    }
}

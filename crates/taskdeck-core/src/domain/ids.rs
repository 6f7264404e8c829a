//! Task identifiers.
//!
//! The store assigns ids and the client treats them as opaque strings. Ids
//! minted locally (the in-memory store) are ULID based so they sort by
//! creation time, and carry the same `task-` prefix the display uses.

use serde::{Deserialize, Serialize};
use std::fmt;
use ulid::Ulid;

const LOCAL_PREFIX: &str = "task-";

/// Identifier of a task, assigned by the store at creation; immutable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// ULID から TaskId を作成（ローカル採番用）
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self(format!("{LOCAL_PREFIX}{ulid}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TaskId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for TaskId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl AsRef<str> for TaskId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

//! Events - プッシュチャネルのメッセージ
//!
//! Server frames are JSON objects `{type, task_id?, content, status?}`.
//! Anything that does not decode into a known kind is rejected here and
//! dropped by the channel.

use serde::{Deserialize, Serialize};

use super::{TaskId, TaskStatus};

/// PushMessage はサーバーからの通知
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PushMessage {
    /// Free text from the agent, appended to the transcript.
    AgentThought {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        task_id: Option<TaskId>,
        content: String,
    },

    /// Status transition of one task.
    TaskStatus {
        task_id: TaskId,
        status: TaskStatus,
        #[serde(default)]
        content: String,
    },

    /// Server notice, appended to the transcript.
    SystemMessage {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        task_id: Option<TaskId>,
        content: String,
    },
}

impl PushMessage {
    pub fn decode(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub fn task_id(&self) -> Option<&TaskId> {
        match self {
            PushMessage::AgentThought { task_id, .. } | PushMessage::SystemMessage { task_id, .. } => {
                task_id.as_ref()
            }
            PushMessage::TaskStatus { task_id, .. } => Some(task_id),
        }
    }
}

/// Frames the client sends to the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Subscribe { task_id: TaskId },
}

impl ClientFrame {
    pub fn encode(&self) -> String {
        // a tagged enum of strings always serializes
        serde_json::to_string(self).unwrap_or_default()
    }
}

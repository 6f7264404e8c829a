//! Console - エージェントの実況表示
//!
//! Transcript of pushed messages plus the processing indicator for the task
//! the console follows.

use crate::domain::{PushMessage, TaskId, TaskStatus};

/// Oldest lines are dropped beyond this.
pub const MAX_TRANSCRIPT_LINES: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    Thought,
    Status,
    System,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptLine {
    pub kind: LineKind,
    pub task_id: Option<TaskId>,
    pub text: String,
}

/// Console state published by the push channel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsoleState {
    pub transcript: Vec<TranscriptLine>,
    /// The followed task is still being worked on.
    pub processing: bool,
    pub active_task: Option<TaskId>,
    pub connected: bool,
    /// Lines ever appended, including ones dropped from the front.
    pub appended: u64,
}

impl ConsoleState {
    /// Starts following `id` with the processing indicator on.
    pub fn track(&mut self, id: TaskId) {
        self.active_task = Some(id);
        self.processing = true;
    }

    /// Applies one message in delivery order. Returns the status change it
    /// carried, if any.
    pub fn apply(&mut self, message: &PushMessage) -> Option<(TaskId, TaskStatus)> {
        match message {
            PushMessage::AgentThought { task_id, content } => {
                self.push_line(LineKind::Thought, task_id.clone(), content.clone());
                None
            }
            PushMessage::SystemMessage { task_id, content } => {
                self.push_line(LineKind::System, task_id.clone(), content.clone());
                None
            }
            PushMessage::TaskStatus {
                task_id,
                status,
                content,
            } => {
                let text = if content.is_empty() {
                    status.to_string()
                } else {
                    format!("{status}: {content}")
                };
                self.push_line(LineKind::Status, Some(task_id.clone()), text);
                if status.is_terminal() && self.active_task.as_ref() == Some(task_id) {
                    self.processing = false;
                    self.active_task = None;
                }
                Some((task_id.clone(), *status))
            }
        }
    }

    /// Retained lines appended after the first `seen`, plus the count to
    /// pass next time. Lines already dropped by the cap are skipped.
    pub fn lines_since(&self, seen: u64) -> (&[TranscriptLine], u64) {
        let first_retained = self.appended - self.transcript.len() as u64;
        let start = seen.clamp(first_retained, self.appended) - first_retained;
        // start <= transcript.len(), so the cast cannot truncate
        (&self.transcript[start as usize..], self.appended)
    }

    fn push_line(&mut self, kind: LineKind, task_id: Option<TaskId>, text: String) {
        self.appended += 1;
        self.transcript.push(TranscriptLine {
            kind,
            task_id,
            text,
        });
        if self.transcript.len() > MAX_TRANSCRIPT_LINES {
            let excess = self.transcript.len() - MAX_TRANSCRIPT_LINES;
            self.transcript.drain(..excess);
        }
    }
}

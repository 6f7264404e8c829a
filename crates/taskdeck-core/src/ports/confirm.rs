//! Confirm port - 破壊的操作の確認
//!
//! Delete is irreversible, so the orchestrator asks before issuing it.

use async_trait::async_trait;

#[async_trait]
pub trait Confirm: Send + Sync {
    /// `true` if the user agreed to `prompt`.
    async fn confirm(&self, prompt: &str) -> bool;
}

/// Pre-approved confirmation (e.g. `--yes`).
#[derive(Debug, Clone, Copy, Default)]
pub struct AssumeYes;

#[async_trait]
impl Confirm for AssumeYes {
    async fn confirm(&self, _prompt: &str) -> bool {
        true
    }
}

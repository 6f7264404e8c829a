//! DashboardBuilder - クライアントの構築とワイヤリング
//!
//! Wires the API client, the push channel, the sync controller and the
//! action orchestrator together. Missing pieces fail at `build()` rather than
//! at first use.

use std::sync::Arc;

use super::actions::ActionOrchestrator;
use super::channel::ConsoleHandle;
use super::reconnect::ReconnectPolicy;
use super::scope::PollIntervals;
use super::sync::SyncController;
use crate::config::ClientConfig;
use crate::impls::{HttpTaskApi, WsTransport};
use crate::ports::{AssumeYes, Confirm, PushTransport, TaskApi};

/// DashboardBuilder はクライアントを構築
///
/// # 使用例
/// ```ignore
/// let dashboard = DashboardBuilder::from_config(&config)?
///     .confirm(StdinConfirm)
///     .build()?;
/// let list = dashboard.sync.mount(ListScope::default());
/// ```
pub struct DashboardBuilder {
    api: Option<Arc<dyn TaskApi>>,
    push: Option<Arc<dyn PushTransport>>,
    confirm: Arc<dyn Confirm>,
    intervals: PollIntervals,
    reconnect: ReconnectPolicy,
}

/// BuildError はクライアント構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("No task API configured. Call `api()` or start from `from_config()`.")]
    MissingApi,

    #[error("HTTP client could not be created: {0}")]
    HttpClient(#[from] reqwest::Error),
}

impl DashboardBuilder {
    pub fn new() -> Self {
        Self {
            api: None,
            push: None,
            confirm: Arc::new(AssumeYes),
            intervals: PollIntervals::default(),
            reconnect: ReconnectPolicy::default(),
        }
    }

    /// HTTP API and WebSocket push channel from `config`.
    pub fn from_config(config: &ClientConfig) -> Result<Self, BuildError> {
        let api = HttpTaskApi::new(config.base_url.clone(), config.request_timeout)?;
        Ok(Self::new()
            .api(Arc::new(api))
            .push(Arc::new(WsTransport::new(config.ws_url.clone())))
            .intervals(config.intervals)
            .reconnect_policy(config.reconnect_policy()))
    }

    pub fn api(mut self, api: Arc<dyn TaskApi>) -> Self {
        self.api = Some(api);
        self
    }

    pub fn push(mut self, transport: Arc<dyn PushTransport>) -> Self {
        self.push = Some(transport);
        self
    }

    /// Dashboard without a push channel; views rely on polling alone.
    pub fn without_push(mut self) -> Self {
        self.push = None;
        self
    }

    pub fn confirm(mut self, confirm: impl Confirm + 'static) -> Self {
        self.confirm = Arc::new(confirm);
        self
    }

    pub fn intervals(mut self, intervals: PollIntervals) -> Self {
        self.intervals = intervals;
        self
    }

    pub fn reconnect_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    /// Opens the push channel when one is configured, so this must run
    /// inside a Tokio runtime.
    pub fn build(self) -> Result<Dashboard, BuildError> {
        let api = self.api.ok_or(BuildError::MissingApi)?;

        let console = self
            .push
            .map(|transport| ConsoleHandle::open(transport, self.reconnect));
        let mut sync = SyncController::new(Arc::clone(&api), self.intervals);
        if let Some(console) = &console {
            sync = sync.with_push(console.status_updates());
        }
        let actions = ActionOrchestrator::new(Arc::clone(&api), self.confirm);

        Ok(Dashboard {
            api,
            sync,
            actions,
            console,
        })
    }
}

impl Default for DashboardBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Dashboard はクライアント一式
pub struct Dashboard {
    pub api: Arc<dyn TaskApi>,
    pub sync: SyncController,
    pub actions: ActionOrchestrator,
    /// `None` when built without a push channel.
    pub console: Option<ConsoleHandle>,
}

impl Dashboard {
    /// Closes the push channel and waits for it.
    pub async fn shutdown(self) {
        if let Some(console) = self.console {
            console.close().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ApiError;
    use crate::impls::InMemoryTaskStore;
    use crate::ports::PushConnection;
    use async_trait::async_trait;

    struct Unreachable;

    #[async_trait]
    impl PushTransport for Unreachable {
        async fn connect(&self) -> Result<Box<dyn PushConnection>, ApiError> {
            Err(ApiError::network_unreachable("fake://push", "refused"))
        }
    }

    #[test]
    fn build_without_api_fails() {
        let result = DashboardBuilder::new().build();
        assert!(matches!(result, Err(BuildError::MissingApi)));
    }

    #[test]
    fn build_without_push_has_no_console() {
        let dashboard = DashboardBuilder::new()
            .api(Arc::new(InMemoryTaskStore::new()))
            .build()
            .unwrap();
        assert!(dashboard.console.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn build_with_push_opens_console() {
        let dashboard = DashboardBuilder::new()
            .api(Arc::new(InMemoryTaskStore::new()))
            .push(Arc::new(Unreachable))
            .build()
            .unwrap();
        let console = dashboard.console.as_ref().unwrap();
        assert!(!console.state().connected);
        dashboard.shutdown().await;
    }

    #[test]
    fn from_config_uses_http_and_ws() {
        let config = ClientConfig::default();
        let builder = DashboardBuilder::from_config(&config).unwrap();
        assert!(builder.api.is_some());
        assert!(builder.push.is_some());
        assert_eq!(builder.intervals, config.intervals);
    }
}

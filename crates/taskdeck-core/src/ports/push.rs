//! PushTransport port - プッシュチャネル（WebSocket など）
//!
//! The transport only moves text frames. Decoding, reconnecting and applying
//! messages live in `app::channel`.

use async_trait::async_trait;

use crate::domain::ApiError;

/// Opens connections to the push endpoint.
#[async_trait]
pub trait PushTransport: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn PushConnection>, ApiError>;
}

/// One live connection.
///
/// `recv` must be cancel safe: the channel races it against outbound frames
/// and shutdown.
#[async_trait]
pub trait PushConnection: Send {
    /// Next text frame; `None` once the connection is closed.
    async fn recv(&mut self) -> Option<Result<String, ApiError>>;

    async fn send(&mut self, frame: String) -> Result<(), ApiError>;

    async fn close(&mut self);
}

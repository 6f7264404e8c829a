//! WsTransport - WebSocket によるプッシュチャネル
//!
//! Text frames only. Pings are answered by tungstenite itself; binary and
//! pong frames are skipped.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use url::Url;

use crate::domain::ApiError;
use crate::ports::{PushConnection, PushTransport};

/// Connects to the agent push endpoint (`ws://host/ws/agent` by default).
#[derive(Debug, Clone)]
pub struct WsTransport {
    url: Url,
}

impl WsTransport {
    pub fn new(url: Url) -> Self {
        Self { url }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl PushTransport for WsTransport {
    async fn connect(&self) -> Result<Box<dyn PushConnection>, ApiError> {
        let (stream, _) = connect_async(self.url.as_str())
            .await
            .map_err(|err| ApiError::network_unreachable(self.url.as_str(), err))?;
        tracing::debug!(url = %self.url, "push channel connected");
        Ok(Box::new(WsConnection {
            stream,
            url: self.url.clone(),
        }))
    }
}

struct WsConnection {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    url: Url,
}

#[async_trait]
impl PushConnection for WsConnection {
    async fn recv(&mut self) -> Option<Result<String, ApiError>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text)),
                Ok(Message::Close(frame)) => {
                    tracing::debug!(url = %self.url, ?frame, "push channel closed by server");
                    return None;
                }
                Ok(_) => continue,
                Err(err) => {
                    return Some(Err(ApiError::network_unreachable(self.url.as_str(), err)));
                }
            }
        }
    }

    async fn send(&mut self, frame: String) -> Result<(), ApiError> {
        self.stream
            .send(Message::Text(frame))
            .await
            .map_err(|err| ApiError::network_unreachable(self.url.as_str(), err))
    }

    async fn close(&mut self) {
        if let Err(err) = self.stream.close(None).await {
            tracing::debug!(url = %self.url, error = %err, "push channel close failed");
        }
    }
}

//! Impls - ports の実装
//!
//! # 含まれる実装
//! - **HttpTaskApi**: REST バックエンド用の TaskApi
//! - **WsTransport**: WebSocket のプッシュチャネル
//! - **InMemoryTaskStore**: テスト・デモ用のバックエンド代替

pub mod http;
pub mod memory;
pub mod ws;

pub use self::http::HttpTaskApi;
pub use self::memory::InMemoryTaskStore;
pub use self::ws::WsTransport;

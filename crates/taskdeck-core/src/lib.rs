//! taskdeck-core
//!
//! Client core of the browser-agent task dashboard.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, state, task, request, response, events, errors, time）
//! - **ports**: 抽象化レイヤー（TaskApi, PushTransport, Confirm, Clock, IdGenerator）
//! - **impls**: 実装（HttpTaskApi, WsTransport, InMemoryTaskStore）
//! - **app**: アプリケーションロジック（builder, sync, channel, console, actions）
//! - **config**: 環境変数からの設定

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod ports;

pub use app::{Dashboard, DashboardBuilder};
pub use config::{ClientConfig, ConfigError};
pub use domain::{ApiError, ErrorKind, Task, TaskId, TaskStatus};

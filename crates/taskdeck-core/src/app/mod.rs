//! App - アプリケーション層
//!
//! このモジュールは、ports を組み合わせてダッシュボードの振る舞いを実装します。
//!
//! # 主要コンポーネント
//! - **DashboardBuilder**: クライアントの構築とワイヤリング
//! - **SyncController**: ビューごとのポーリングとプッシュによる同期
//! - **ConsoleHandle**: プッシュチャネルの監視と再接続
//! - **ActionOrchestrator**: submit / cancel / retry / delete

pub mod actions;
pub mod builder;
pub mod channel;
pub mod console;
pub mod reconnect;
pub mod scope;
pub mod sync;

// 主要な型を再エクスポート
pub use self::actions::{Action, ActionFailure, ActionOrchestrator, ActionOutcome, SkipReason};
pub use self::builder::{BuildError, Dashboard, DashboardBuilder};
pub use self::channel::ConsoleHandle;
pub use self::console::{ConsoleState, LineKind, MAX_TRANSCRIPT_LINES, TranscriptLine};
pub use self::reconnect::ReconnectPolicy;
pub use self::scope::{DetailScope, ListScope, PollIntervals, Scope, SearchScope, StatsScope, ViewKind};
pub use self::sync::{Phase, StatusUpdate, SyncController, SyncTarget, ViewHandle, ViewState};

//! Ports - 抽象化レイヤー
//!
//! Each trait is a seam to something outside the client core: the task
//! backend, the push endpoint, the wall clock, the user.

pub mod clock;
pub mod confirm;
pub mod id_generator;
pub mod push;
pub mod task_api;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::confirm::{AssumeYes, Confirm};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::push::{PushConnection, PushTransport};
pub use self::task_api::TaskApi;

//! Domain model: task records, statuses, requests, responses, push frames,
//! and the normalized error type.

pub mod errors;
pub mod events;
pub mod ids;
pub mod request;
pub mod response;
pub mod state;
pub mod task;
pub mod time;

pub use errors::{ApiError, ErrorKind};
pub use events::{ClientFrame, PushMessage};
pub use ids::TaskId;
pub use request::{ListQuery, LogQuery, SearchFilter, SubmitRequest};
pub use response::{ActionResponse, RetryResponse, SubmitResponse, TaskStats};
pub use state::{LogLevel, TaskStatus, Tone};
pub use task::{InvariantViolation, LogEntry, Task};

//! Buffered CSV recording of per-frame gaze data.
//!
//! Rows are queued in memory and written in bulk once the queue reaches its
//! flush threshold, when the session ends, or when the recorder is dropped.

pub mod error;
pub mod layout;
pub mod queue;
pub mod recorder;

pub use error::RecordError;
pub use layout::{RowContext, RowLayout, session_file_name};
pub use queue::{LogQueue, LogRecord};
pub use recorder::{RecorderStats, SessionRecorder};

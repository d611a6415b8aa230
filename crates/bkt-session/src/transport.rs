//! Job transport boundary.
//!
//! The controller only ever talks to the remote engine through
//! [`JobTransport`]. Implementations must be `Send + Sync` so a controller can
//! hold one behind an `Arc` across task boundaries.

use std::fmt;

use async_trait::async_trait;
use bkt_schemas::{SessionConfig, SessionEvent, TaskId};
use futures_util::stream::BoxStream;

/// Ordered inbound events for one task. Ends when either side closes it.
pub type EventStream = BoxStream<'static, Result<SessionEvent, StreamError>>;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// The start request was refused or never reached the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartError {
    /// The server answered and said no. `message` is shown to the user as-is.
    Rejected { status: Option<u16>, message: String },
    /// Network or transport failure.
    Transport(String),
    /// The server answered with something that is not a task handle.
    Decode(String),
}

impl fmt::Display for StartError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StartError::Rejected { message, .. } => f.write_str(message),
            StartError::Transport(msg) => write!(f, "failed to reach backtest server: {msg}"),
            StartError::Decode(msg) => write!(f, "unexpected start response: {msg}"),
        }
    }
}

impl std::error::Error for StartError {}

/// The event stream could not be opened or broke while open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    Connect(String),
    Transport(String),
    /// Closed before a `complete` or `error` record arrived.
    Closed,
}

impl fmt::Display for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamError::Connect(msg) => write!(f, "event stream connect failed: {msg}"),
            StreamError::Transport(msg) => write!(f, "WebSocket connection error: {msg}"),
            StreamError::Closed => f.write_str("event stream closed before completion"),
        }
    }
}

impl std::error::Error for StreamError {}

// ---------------------------------------------------------------------------
// JobTransport
// ---------------------------------------------------------------------------

#[async_trait]
pub trait JobTransport: Send + Sync {
    /// Short name for logs (e.g. `"http"`).
    fn name(&self) -> &'static str;

    /// Submit strategy source and configuration; returns the job handle.
    async fn start_job(&self, code: &str, config: &SessionConfig) -> Result<TaskId, StartError>;

    /// Ask the server to cancel `task_id`. Best-effort: callers log failures
    /// and carry on.
    async fn stop_job(&self, task_id: &TaskId) -> anyhow::Result<()>;

    /// Open the push event stream for `task_id`.
    async fn subscribe(&self, task_id: &TaskId) -> Result<EventStream, StreamError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejected_start_displays_server_message_verbatim() {
        let err = StartError::Rejected {
            status: Some(429),
            message: "rate limited".to_string(),
        };
        assert_eq!(err.to_string(), "rate limited");
    }

    #[test]
    fn stream_error_display() {
        assert_eq!(
            StreamError::Closed.to_string(),
            "event stream closed before completion"
        );
        assert_eq!(
            StreamError::Transport("reset by peer".to_string()).to_string(),
            "WebSocket connection error: reset by peer"
        );
    }
}

//! Backtest session snapshot and the stream events that mutate it.
//!
//! [`BacktestSession::apply`] is the only place an event changes a session.
//! The controller in `bkt-session` decides *whether* an event is applied
//! (stale subscriptions are dropped there); this module decides *how*.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::result::BacktestResult;

const UNKNOWN_ERROR: &str = "Unknown error";
const STAGE_STARTING: &str = "starting";
const STAGE_DONE: &str = "done";

// ---------------------------------------------------------------------------
// TaskId
// ---------------------------------------------------------------------------

/// Opaque job handle assigned by the remote transport.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// SessionStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    #[default]
    Idle,
    /// Start request issued; no event received yet.
    Starting,
    Running,
    /// **Terminal.**
    Completed,
    /// **Terminal.**
    Error,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Idle => "idle",
            SessionStatus::Starting => "starting",
            SessionStatus::Running => "running",
            SessionStatus::Completed => "completed",
            SessionStatus::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Error)
    }

    /// `true` while the remote job may still emit events.
    pub fn is_active(&self) -> bool {
        matches!(self, SessionStatus::Starting | SessionStatus::Running)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// SessionEvent
// ---------------------------------------------------------------------------

/// One record of the push event stream: `{"type": ..., "data": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum SessionEvent {
    Progress {
        #[serde(default)]
        percent: Option<f64>,
        #[serde(default)]
        stage: Option<String>,
    },
    Complete(Box<BacktestResult>),
    Error {
        #[serde(default)]
        message: String,
    },
}

impl SessionEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            SessionEvent::Progress { .. } => "progress",
            SessionEvent::Complete(_) => "complete",
            SessionEvent::Error { .. } => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, SessionEvent::Progress { .. })
    }
}

// ---------------------------------------------------------------------------
// BacktestSession
// ---------------------------------------------------------------------------

/// Observable state of the one backtest a controller owns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BacktestSession {
    pub task_id: Option<TaskId>,
    pub status: SessionStatus,
    /// 0..=100
    pub progress: u8,
    pub stage: String,
    /// Present only when `status == Completed`.
    pub result: Option<Box<BacktestResult>>,
    /// Present only when `status == Error`.
    pub error: Option<String>,
}

impl BacktestSession {
    pub fn idle() -> Self {
        Self::default()
    }

    pub fn starting() -> Self {
        Self {
            status: SessionStatus::Starting,
            stage: STAGE_STARTING.to_string(),
            ..Self::default()
        }
    }

    /// Terminal error snapshot with no task attached.
    pub fn failed(message: impl Into<String>) -> Self {
        let mut s = Self::default();
        s.fail(message.into());
        s
    }

    /// Apply one stream event. Returns `true` when the session became terminal.
    pub fn apply(&mut self, event: SessionEvent) -> bool {
        match event {
            SessionEvent::Progress { percent, stage } => {
                self.status = SessionStatus::Running;
                if let Some(p) = percent.filter(|p| p.is_finite()) {
                    self.progress = p.clamp(0.0, 100.0).round() as u8;
                }
                if let Some(s) = stage {
                    self.stage = s;
                }
                false
            }
            SessionEvent::Complete(result) => {
                self.status = SessionStatus::Completed;
                self.progress = 100;
                self.stage = STAGE_DONE.to_string();
                self.result = Some(result);
                self.error = None;
                true
            }
            SessionEvent::Error { message } => {
                self.fail(message);
                true
            }
        }
    }

    fn fail(&mut self, message: String) {
        self.status = SessionStatus::Error;
        self.progress = 0;
        self.stage.clear();
        self.result = None;
        self.error = Some(if message.trim().is_empty() {
            UNKNOWN_ERROR.to_string()
        } else {
            message
        });
    }
}

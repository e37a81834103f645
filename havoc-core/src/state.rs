//! Engine run-state machine - NO I/O, just state transitions.
//!
//! ```text
//! Running --CancelRequested--> Cancelling --RollbackCompleted--> Stopped
//! ```
//!
//! Any other event leaves the state unchanged.

use serde::Serialize;

/// Process-wide run state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    /// The chaos loop may start new cycles.
    #[default]
    Running,
    /// Cancellation received; in-flight work finishes, then rollback runs.
    Cancelling,
    /// Rollback finished.
    Stopped,
}

/// Inputs to the run-state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunEvent {
    /// External interrupt received.
    CancelRequested,
    /// Rollback pass completed.
    RollbackCompleted,
}

impl RunState {
    /// Apply an event and return the next state.
    pub fn on_event(self, event: RunEvent) -> Self {
        match (self, event) {
            (RunState::Running, RunEvent::CancelRequested) => RunState::Cancelling,
            (RunState::Cancelling, RunEvent::RollbackCompleted) => RunState::Stopped,
            (state, _) => state,
        }
    }

    /// Whether new cycles may start.
    pub fn is_running(&self) -> bool {
        matches!(self, RunState::Running)
    }

    /// Whether the engine has fully stopped.
    pub fn is_stopped(&self) -> bool {
        matches!(self, RunState::Stopped)
    }

    /// Lowercase name for logs and HTTP responses.
    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::Running => "running",
            RunState::Cancelling => "cancelling",
            RunState::Stopped => "stopped",
        }
    }
}

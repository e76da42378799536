//! Turn-gated session state machine
//!
//! The decision for every event depends only on the turn count, the turn
//! ceiling and the event itself. Wall-clock time and reply content never
//! enter into it.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Result, WrenError};

/// Lifecycle status of an interview
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CompletionStatus {
    #[default]
    InProgress,
    Complete,
    EarlyExit,
    Interrupted,
}

impl CompletionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, CompletionStatus::InProgress)
    }

    /// Ended before reaching the turn ceiling
    pub fn is_early_termination(&self) -> bool {
        matches!(self, CompletionStatus::EarlyExit | CompletionStatus::Interrupted)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CompletionStatus::InProgress => "in_progress",
            CompletionStatus::Complete => "complete",
            CompletionStatus::EarlyExit => "early_exit",
            CompletionStatus::Interrupted => "interrupted",
        }
    }
}

impl fmt::Display for CompletionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Input that advances a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// A user turn was received
    Turn,
    /// The user asked to stop
    Quit,
    /// Input ended unexpectedly
    Interrupt,
}

impl fmt::Display for SessionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionEvent::Turn => f.write_str("turn"),
            SessionEvent::Quit => f.write_str("quit"),
            SessionEvent::Interrupt => f.write_str("interrupt"),
        }
    }
}

/// What the caller should do after an event
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    /// Keep interviewing
    Continue,
    /// The session ended early; summarize what was collected
    ReadyToSummarize,
    /// The turn ceiling was reached
    ForcedComplete,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Continue => "continue",
            Decision::ReadyToSummarize => "ready_to_summarize",
            Decision::ForcedComplete => "forced_complete",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Turn counter and status for one session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStateMachine {
    session_id: String,
    turn_count: u32,
    max_turns: u32,
    status: CompletionStatus,
}

impl SessionStateMachine {
    pub fn new(session_id: impl Into<String>, max_turns: u32) -> Self {
        Self {
            session_id: session_id.into(),
            turn_count: 0,
            max_turns: max_turns.max(1),
            status: CompletionStatus::InProgress,
        }
    }

    /// Rebuild a machine from persisted values
    pub fn restore(
        session_id: impl Into<String>,
        turn_count: u32,
        max_turns: u32,
        status: CompletionStatus,
    ) -> Result<Self> {
        let session_id = session_id.into();
        let corrupt = |reason: String| WrenError::CorruptState {
            session_id: session_id.clone(),
            reason,
        };

        if max_turns == 0 {
            return Err(corrupt("max_turns is 0".to_string()));
        }
        if turn_count > max_turns {
            return Err(corrupt(format!(
                "turn_count {} exceeds max_turns {}",
                turn_count, max_turns
            )));
        }
        if turn_count == max_turns && status == CompletionStatus::InProgress {
            return Err(corrupt(format!("in_progress at the ceiling of {} turns", max_turns)));
        }

        Ok(Self {
            session_id,
            turn_count,
            max_turns,
            status,
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn turn_count(&self) -> u32 {
        self.turn_count
    }

    pub fn max_turns(&self) -> u32 {
        self.max_turns
    }

    pub fn status(&self) -> CompletionStatus {
        self.status
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn turns_remaining(&self) -> u32 {
        self.max_turns - self.turn_count
    }

    /// Compute the outcome of `event` without applying it
    pub fn peek(&self, event: SessionEvent) -> Result<(Decision, u32, CompletionStatus)> {
        if self.status.is_terminal() {
            return Err(WrenError::InvalidTransition {
                session_id: self.session_id.clone(),
                status: self.status.to_string(),
                event: event.to_string(),
            });
        }

        Ok(match event {
            SessionEvent::Turn => {
                let next = self.turn_count + 1;
                if next >= self.max_turns {
                    (Decision::ForcedComplete, next, CompletionStatus::Complete)
                } else {
                    (Decision::Continue, next, CompletionStatus::InProgress)
                }
            }
            SessionEvent::Quit => {
                (Decision::ReadyToSummarize, self.turn_count, CompletionStatus::EarlyExit)
            }
            SessionEvent::Interrupt => {
                (Decision::ReadyToSummarize, self.turn_count, CompletionStatus::Interrupted)
            }
        })
    }

    /// Apply `event`; a terminal session rejects every event and stays as is
    pub fn advance(&mut self, event: SessionEvent) -> Result<Decision> {
        let (decision, turn_count, status) = self.peek(event)?;
        self.turn_count = turn_count;
        self.status = status;
        Ok(decision)
    }
}

//! Persisted view of a session

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::state::CompletionStatus;
use crate::transcript::Turn;

/// Checkpoint payload written after every event
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub turn_count: u32,
    pub max_turns: u32,
    pub completion_status: CompletionStatus,
    #[serde(default)]
    pub history: Vec<Turn>,
    /// Last completion flag reported by the conversational agent
    #[serde(default)]
    pub agent_reported_complete: bool,
    pub updated_at: DateTime<Utc>,
}

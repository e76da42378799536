//! Contracts with the collaborators around a session
//!
//! The conversational agent produces replies; the profile generator consumes
//! a finished transcript. Both live outside this crate.

use serde::{Deserialize, Serialize};

use super::state::CompletionStatus;
use crate::transcript::Turn;

/// One reply from the conversational agent
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentReply {
    pub message: String,
    /// The agent's own turn counter; informational only
    #[serde(default)]
    pub turn_count: u32,
    /// The agent's own completion flag; recorded, never used for decisions
    #[serde(default)]
    pub is_complete: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
}

impl AgentReply {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            turn_count: 0,
            is_complete: false,
            reasoning: None,
        }
    }

    pub(crate) fn into_turn(self) -> Turn {
        let turn = Turn::assistant(self.message);
        match self.reasoning {
            Some(reasoning) => turn.with_reasoning(reasoning),
            None => turn,
        }
    }
}

/// Conversational agent driven with `thread_id == session_id`
#[async_trait::async_trait]
pub trait ConversationalAgent: Send + Sync {
    async fn reply(&self, thread_id: &str, user_input: &str) -> anyhow::Result<AgentReply>;
}

/// Metadata handed to the profile generator
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SummaryMetadata {
    pub turn_count: u32,
    pub completion_status: CompletionStatus,
    pub early_termination: bool,
}

/// Everything the profile generator needs once a session has ended
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SummaryRequest {
    pub session_id: String,
    pub history: Vec<Turn>,
    pub metadata: SummaryMetadata,
}

//! Interview sessions
//!
//! - `state` - turn-gated state machine
//! - `input` - classification of raw user input
//! - `collaborator` - conversational agent and profile generator contracts
//! - `snapshot` - persisted session view
//! - `orchestrator` - per-event pipeline over store and analyzer

pub mod collaborator;
pub mod input;
pub mod orchestrator;
pub mod snapshot;
pub mod state;

pub use collaborator::{AgentReply, ConversationalAgent, SummaryMetadata, SummaryRequest};
pub use input::{classify_input, UserInput};
pub use orchestrator::{InterviewSession, SessionOrchestrator, TurnOutcome};
pub use snapshot::SessionSnapshot;
pub use state::{CompletionStatus, Decision, SessionEvent, SessionStateMachine};

pub mod archive;
pub mod checkpoint;
pub mod config;
pub mod coverage;
pub mod error;
pub mod session;
pub mod transcript;

// Re-exports for convenience
pub use archive::TranscriptArchive;
pub use checkpoint::{
    Checkpoint, CheckpointAddress, CheckpointStore, FileBackend, KvBackend, LatestConsistency,
    MemoryBackend, StoredCheckpoint,
};
pub use config::WrenConfig;
pub use coverage::{CoverageAnalyzer, CoverageReport};
pub use error::{Result, WrenError};
pub use session::{
    CompletionStatus, Decision, InterviewSession, SessionOrchestrator, SessionStateMachine,
    TurnOutcome,
};
pub use transcript::{Role, Turn};

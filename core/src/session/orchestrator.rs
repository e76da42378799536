//! Session orchestration
//!
//! Ties the state machine, the coverage analyzer and the checkpoint store
//! together. Each event goes through the same pipeline:
//!
//! 1. update the in-memory history
//! 2. advance the state machine
//! 3. run the coverage analyzer
//! 4. write a checkpoint
//! 5. hand the outcome back
//!
//! A failed write in step 4 is reported inside the outcome and leaves the
//! in-memory session untouched, so the caller can keep going without
//! durability or stop.

use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info};

use super::collaborator::{AgentReply, SummaryMetadata, SummaryRequest};
use super::snapshot::SessionSnapshot;
use super::state::{CompletionStatus, Decision, SessionEvent, SessionStateMachine};
use crate::checkpoint::{Checkpoint, CheckpointAddress, CheckpointMetadata, CheckpointStore};
use crate::config::WrenConfig;
use crate::coverage::{CoverageAnalyzer, CoverageReport};
use crate::error::{Result, WrenError};
use crate::transcript::Turn;

/// Result of one processed event
#[derive(Debug)]
pub struct TurnOutcome {
    pub decision: Decision,
    pub turn_count: u32,
    pub completion_status: CompletionStatus,
    /// Advisory text from the coverage analyzer
    pub recommendation: String,
    pub coverage: CoverageReport,
    /// Where the checkpoint went, or why it could not be written
    pub persisted: Result<CheckpointAddress>,
}

impl TurnOutcome {
    pub fn is_durable(&self) -> bool {
        self.persisted.is_ok()
    }

    pub fn persistence_error(&self) -> Option<&WrenError> {
        self.persisted.as_ref().err()
    }

    /// JSON view for logs and the CLI
    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "decision": self.decision,
            "turn_count": self.turn_count,
            "completion_status": self.completion_status,
            "recommendation": self.recommendation,
            "coverage_ratio": self.coverage.coverage_ratio,
            "ready_for_summary": self.coverage.ready_for_summary,
            "checkpoint": self.persisted.as_ref().ok().map(|a| a.key()),
            "persistence_error": self.persisted.as_ref().err().map(|e| e.to_string()),
        })
    }
}

/// Hands out per-session handles that share one store and analyzer
pub struct SessionOrchestrator {
    store: Arc<CheckpointStore>,
    analyzer: Arc<CoverageAnalyzer>,
    max_turns: u32,
    checkpoint_ns: String,
}

impl SessionOrchestrator {
    pub fn new(store: Arc<CheckpointStore>, analyzer: CoverageAnalyzer, max_turns: u32) -> Self {
        Self {
            store,
            analyzer: Arc::new(analyzer),
            max_turns,
            checkpoint_ns: String::new(),
        }
    }

    pub fn from_config(store: Arc<CheckpointStore>, config: &WrenConfig) -> Self {
        Self::new(
            store,
            CoverageAnalyzer::from_config(&config.coverage),
            config.interview.max_turns,
        )
        .with_checkpoint_namespace(config.checkpoint.checkpoint_namespace.clone())
    }

    pub fn with_checkpoint_namespace(mut self, checkpoint_ns: impl Into<String>) -> Self {
        self.checkpoint_ns = checkpoint_ns.into();
        self
    }

    pub fn store(&self) -> &Arc<CheckpointStore> {
        &self.store
    }

    pub fn max_turns(&self) -> u32 {
        self.max_turns
    }

    /// Begin a new session
    ///
    /// Fails with `SessionExists` when the id already has a checkpoint, so a
    /// stored session can only be continued through [`Self::resume`].
    pub async fn start(&self, session_id: &str) -> Result<InterviewSession> {
        if self.store.get(session_id, &self.checkpoint_ns, None).await?.is_some() {
            return Err(WrenError::SessionExists {
                session_id: session_id.to_string(),
            });
        }
        self.fresh(session_id)
    }

    /// Continue from the latest checkpoint, or start fresh when there is none
    ///
    /// The stored turn ceiling wins over the configured one so a resumed
    /// session ends where it would have ended originally.
    pub async fn resume(&self, session_id: &str) -> Result<InterviewSession> {
        let Some(stored) = self.store.get(session_id, &self.checkpoint_ns, None).await? else {
            return self.fresh(session_id);
        };

        let snapshot: SessionSnapshot = stored.payload_as()?;
        if snapshot.session_id != session_id {
            return Err(WrenError::CorruptState {
                session_id: session_id.to_string(),
                reason: format!("checkpoint belongs to session {}", snapshot.session_id),
            });
        }

        let machine = SessionStateMachine::restore(
            session_id,
            snapshot.turn_count,
            snapshot.max_turns,
            snapshot.completion_status,
        )?;

        info!(
            "[SessionOrchestrator] Resumed session {} at turn {}/{} ({})",
            session_id, snapshot.turn_count, snapshot.max_turns, snapshot.completion_status
        );

        let mut session = self.session(machine, snapshot.history, snapshot.agent_reported_complete);
        session.last_checkpoint = Some(stored.address);
        Ok(session)
    }

    fn fresh(&self, session_id: &str) -> Result<InterviewSession> {
        // Validates the id before anything is recorded under it
        self.store.address(session_id, &self.checkpoint_ns, None)?;
        info!("[SessionOrchestrator] Starting session {}", session_id);
        let machine = SessionStateMachine::new(session_id, self.max_turns);
        Ok(self.session(machine, Vec::new(), false))
    }

    fn session(
        &self,
        machine: SessionStateMachine,
        history: Vec<Turn>,
        agent_reported_complete: bool,
    ) -> InterviewSession {
        InterviewSession {
            machine,
            history,
            agent_reported_complete,
            store: Arc::clone(&self.store),
            analyzer: Arc::clone(&self.analyzer),
            checkpoint_ns: self.checkpoint_ns.clone(),
            last_checkpoint: None,
        }
    }
}

/// One interview; `&mut self` keeps it to a single writer
pub struct InterviewSession {
    machine: SessionStateMachine,
    history: Vec<Turn>,
    agent_reported_complete: bool,
    store: Arc<CheckpointStore>,
    analyzer: Arc<CoverageAnalyzer>,
    checkpoint_ns: String,
    last_checkpoint: Option<CheckpointAddress>,
}

impl InterviewSession {
    pub fn session_id(&self) -> &str {
        self.machine.session_id()
    }

    pub fn turn_count(&self) -> u32 {
        self.machine.turn_count()
    }

    pub fn max_turns(&self) -> u32 {
        self.machine.max_turns()
    }

    pub fn status(&self) -> CompletionStatus {
        self.machine.status()
    }

    pub fn is_terminal(&self) -> bool {
        self.machine.is_terminal()
    }

    pub fn history(&self) -> &[Turn] {
        &self.history
    }

    pub fn last_checkpoint(&self) -> Option<&CheckpointAddress> {
        self.last_checkpoint.as_ref()
    }

    pub fn coverage(&self) -> CoverageReport {
        self.analyzer.analyze(&self.history)
    }

    /// Record a user turn and, when available, the agent's reply to it
    pub async fn process_turn(
        &mut self,
        user_input: &str,
        reply: Option<AgentReply>,
    ) -> Result<TurnOutcome> {
        // Reject before touching history so a terminal session stays as it was
        self.machine.peek(SessionEvent::Turn)?;

        self.history.push(Turn::user(user_input));
        if let Some(reply) = reply {
            self.agent_reported_complete = reply.is_complete;
            self.history.push(reply.into_turn());
        }

        self.apply(SessionEvent::Turn).await
    }

    /// End the session at the user's request
    pub async fn quit(&mut self) -> Result<TurnOutcome> {
        self.apply(SessionEvent::Quit).await
    }

    /// End the session because input stopped unexpectedly
    pub async fn interrupt(&mut self) -> Result<TurnOutcome> {
        self.apply(SessionEvent::Interrupt).await
    }

    /// Write the current state again, e.g. after a failed write
    pub async fn persist(&mut self) -> Result<CheckpointAddress> {
        self.write_checkpoint(None).await
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.machine.session_id().to_string(),
            turn_count: self.machine.turn_count(),
            max_turns: self.machine.max_turns(),
            completion_status: self.machine.status(),
            history: self.history.clone(),
            agent_reported_complete: self.agent_reported_complete,
            updated_at: Utc::now(),
        }
    }

    /// Profile generator handoff; `None` while the interview is running
    pub fn summary_request(&self) -> Option<SummaryRequest> {
        let status = self.machine.status();
        if !status.is_terminal() {
            return None;
        }

        Some(SummaryRequest {
            session_id: self.machine.session_id().to_string(),
            history: self.history.clone(),
            metadata: SummaryMetadata {
                turn_count: self.machine.turn_count(),
                completion_status: status,
                early_termination: status.is_early_termination(),
            },
        })
    }

    async fn apply(&mut self, event: SessionEvent) -> Result<TurnOutcome> {
        let decision = self.machine.advance(event)?;
        let coverage = self.analyzer.analyze(&self.history);

        info!(
            "[InterviewSession] {} {}: turn {}/{} -> {} ({})",
            self.machine.session_id(),
            event,
            self.machine.turn_count(),
            self.machine.max_turns(),
            decision,
            self.machine.status()
        );

        let persisted = self.write_checkpoint(Some((event, decision))).await;
        if let Err(e) = &persisted {
            error!(
                "[InterviewSession] Checkpoint for {} not persisted: {}",
                self.machine.session_id(),
                e
            );
        }

        Ok(TurnOutcome {
            decision,
            turn_count: self.machine.turn_count(),
            completion_status: self.machine.status(),
            recommendation: coverage.recommendation.clone(),
            coverage,
            persisted,
        })
    }

    async fn write_checkpoint(
        &mut self,
        cause: Option<(SessionEvent, Decision)>,
    ) -> Result<CheckpointAddress> {
        let snapshot = self.snapshot();
        let payload = serde_json::to_value(&snapshot)
            .map_err(|e| WrenError::serialization(self.machine.session_id(), "pending", e))?;

        let mut metadata = CheckpointMetadata::new();
        metadata.insert("turn".to_string(), json!(snapshot.turn_count));
        metadata.insert("status".to_string(), json!(snapshot.completion_status));
        metadata.insert("written_at".to_string(), json!(snapshot.updated_at.to_rfc3339()));
        if let Some((event, decision)) = cause {
            metadata.insert("event".to_string(), json!(event.to_string()));
            metadata.insert("decision".to_string(), json!(decision));
        }

        let address = self
            .store
            .put(
                self.machine.session_id(),
                &self.checkpoint_ns,
                Checkpoint::new(payload),
                metadata,
            )
            .await?;
        self.last_checkpoint = Some(address.clone());
        Ok(address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::MemoryBackend;
    use std::time::Duration;

    fn orchestrator(max_turns: u32) -> SessionOrchestrator {
        let store = Arc::new(CheckpointStore::new(
            Arc::new(MemoryBackend::new()),
            "wren:checkpoint",
            Duration::from_secs(60),
        ));
        SessionOrchestrator::new(store, CoverageAnalyzer::default(), max_turns)
    }

    #[tokio::test]
    async fn test_turn_pipeline() {
        let orch = orchestrator(12);
        let mut session = orch.start("s1").await.unwrap();

        let outcome = session
            .process_turn("I love every book by Le Guin", Some(AgentReply::new("Which one first?")))
            .await
            .unwrap();

        assert_eq!(outcome.decision, Decision::Continue);
        assert_eq!(outcome.turn_count, 1);
        assert_eq!(outcome.completion_status, CompletionStatus::InProgress);
        assert!(outcome.is_durable());
        assert_eq!(outcome.coverage.coverage_ratio, 0.25);
        assert_eq!(session.history().len(), 2);

        let stored = orch.store().get("s1", "", None).await.unwrap().unwrap();
        let snapshot: SessionSnapshot = stored.payload_as().unwrap();
        assert_eq!(snapshot.turn_count, 1);
        assert_eq!(snapshot.history, session.history());
        assert_eq!(stored.metadata["decision"], json!("continue"));
        assert_eq!(session.last_checkpoint(), Some(&stored.address));
    }

    #[tokio::test]
    async fn test_turn_without_reply() {
        let orch = orchestrator(12);
        let mut session = orch.start("s1").await.unwrap();
        session.process_turn("hello", None).await.unwrap();
        assert_eq!(session.history(), &[Turn::user("hello")]);
    }

    #[tokio::test]
    async fn test_terminal_session_rejects_turn_without_side_effects() {
        let orch = orchestrator(12);
        let mut session = orch.start("s1").await.unwrap();
        session.process_turn("one", None).await.unwrap();
        session.quit().await.unwrap();

        let err = session.process_turn("two", None).await.unwrap_err();
        assert!(matches!(err, WrenError::InvalidTransition { .. }));
        assert_eq!(session.history().len(), 1);
        assert_eq!(session.status(), CompletionStatus::EarlyExit);

        assert!(session.quit().await.is_err());
        assert!(session.interrupt().await.is_err());
        assert_eq!(session.status(), CompletionStatus::EarlyExit);
    }

    #[tokio::test]
    async fn test_agent_completion_flag_does_not_end_session() {
        let orch = orchestrator(12);
        let mut session = orch.start("s1").await.unwrap();
        let reply = AgentReply {
            is_complete: true,
            ..AgentReply::new("All done, want your profile?")
        };
        let outcome = session.process_turn("sure", Some(reply)).await.unwrap();
        assert_eq!(outcome.decision, Decision::Continue);
        assert!(session.snapshot().agent_reported_complete);
    }

    #[tokio::test]
    async fn test_summary_request() {
        let orch = orchestrator(2);
        let mut session = orch.start("s1").await.unwrap();
        session.process_turn("a", None).await.unwrap();
        assert!(session.summary_request().is_none());

        let outcome = session.process_turn("b", None).await.unwrap();
        assert_eq!(outcome.decision, Decision::ForcedComplete);

        let request = session.summary_request().unwrap();
        assert_eq!(request.session_id, "s1");
        assert_eq!(request.history.len(), 2);
        assert_eq!(
            request.metadata,
            SummaryMetadata {
                turn_count: 2,
                completion_status: CompletionStatus::Complete,
                early_termination: false,
            }
        );
    }

    #[tokio::test]
    async fn test_resume_restores_session() {
        let orch = orchestrator(12);
        {
            let mut session = orch.start("s1").await.unwrap();
            for line in ["a", "b", "c"] {
                session.process_turn(line, Some(AgentReply::new("ok"))).await.unwrap();
            }
        }

        let mut resumed = orch.resume("s1").await.unwrap();
        assert_eq!(resumed.turn_count(), 3);
        assert_eq!(resumed.history().len(), 6);
        assert!(resumed.last_checkpoint().is_some());

        let outcome = resumed.process_turn("d", None).await.unwrap();
        assert_eq!(outcome.turn_count, 4);
    }

    #[tokio::test]
    async fn test_resume_unknown_session_starts_fresh() {
        let orch = orchestrator(12);
        let session = orch.resume("brand-new").await.unwrap();
        assert_eq!(session.turn_count(), 0);
        assert_eq!(session.status(), CompletionStatus::InProgress);
        assert!(session.last_checkpoint().is_none());
    }

    #[tokio::test]
    async fn test_resume_keeps_stored_ceiling() {
        let store = orchestrator(3).store().clone();
        let short = SessionOrchestrator::new(store.clone(), CoverageAnalyzer::default(), 3);
        let mut session = short.start("s1").await.unwrap();
        session.process_turn("a", None).await.unwrap();

        let long = SessionOrchestrator::new(store, CoverageAnalyzer::default(), 12);
        let resumed = long.resume("s1").await.unwrap();
        assert_eq!(resumed.max_turns(), 3);
    }

    #[tokio::test]
    async fn test_start_rejects_bad_session_id() {
        let orch = orchestrator(12);
        assert!(matches!(orch.start("").await, Err(WrenError::InvalidSessionId { .. })));
        assert!(matches!(orch.start("a:b").await, Err(WrenError::InvalidSessionId { .. })));
    }

    #[tokio::test]
    async fn test_outcome_json() {
        let orch = orchestrator(12);
        let mut session = orch.start("s1").await.unwrap();
        let outcome = session.process_turn("hi", None).await.unwrap();
        let value = outcome.to_json();
        assert_eq!(value["decision"], "continue");
        assert_eq!(value["completion_status"], "in_progress");
        assert!(value["checkpoint"].as_str().unwrap().starts_with("wren:checkpoint:s1:"));
        assert!(value["persistence_error"].is_null());
    }

    #[tokio::test]
    async fn test_start_refuses_stored_session() {
        let orch = orchestrator(3);
        let mut session = orch.start("s1").await.unwrap();
        for line in ["a", "b", "c"] {
            session.process_turn(line, None).await.unwrap();
        }
        assert_eq!(session.status(), CompletionStatus::Complete);

        let err = orch.start("s1").await.err().unwrap();
        assert!(matches!(err, WrenError::SessionExists { .. }));

        let stored: SessionSnapshot = orch
            .store()
            .get("s1", "", None)
            .await
            .unwrap()
            .unwrap()
            .payload_as()
            .unwrap();
        assert_eq!(stored.turn_count, 3);
        assert_eq!(stored.completion_status, CompletionStatus::Complete);

        let resumed = orch.resume("s1").await.unwrap();
        assert!(resumed.is_terminal());
    }
}

//! Transcript archive
//!
//! Finished conversations are written to
//! `<base>/<session_id>/logs/conversation_<YYYYmmdd_HHMMSS>.json` for the
//! profile generator and for later review. Writes go through a temp file and
//! a rename so a reader never sees half a transcript.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::{Result, WrenError};
use crate::session::SummaryMetadata;
use crate::transcript::Turn;

/// On-disk transcript document
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArchivedTranscript {
    pub timestamp: DateTime<Utc>,
    pub session_id: String,
    pub metadata: SummaryMetadata,
    pub conversation: Vec<Turn>,
}

pub struct TranscriptArchive {
    base: PathBuf,
}

impl TranscriptArchive {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Folder holding the transcripts of one session
    pub fn logs_dir(&self, session_id: &str) -> Result<PathBuf> {
        let usable = !session_id.is_empty()
            && session_id != "."
            && session_id != ".."
            && !session_id.contains(['/', '\\']);
        if !usable {
            return Err(WrenError::InvalidSessionId {
                session_id: session_id.to_string(),
            });
        }
        Ok(self.base.join(session_id).join("logs"))
    }

    /// Write one transcript and return its path
    pub async fn save(
        &self,
        session_id: &str,
        history: &[Turn],
        metadata: &SummaryMetadata,
    ) -> Result<PathBuf> {
        let dir = self.logs_dir(session_id)?;
        tokio::fs::create_dir_all(&dir).await?;

        let timestamp = Utc::now();
        let document = ArchivedTranscript {
            timestamp,
            session_id: session_id.to_string(),
            metadata: metadata.clone(),
            conversation: history.to_vec(),
        };

        let stem = format!("conversation_{}", timestamp.format("%Y%m%d_%H%M%S"));
        let final_path = dir.join(format!("{}.json", stem));
        let temp_path = dir.join(format!("{}.tmp", stem));

        let json = serde_json::to_string_pretty(&document)?;
        tokio::fs::write(&temp_path, json).await?;
        tokio::fs::rename(&temp_path, &final_path).await?;

        info!(
            "[TranscriptArchive] Saved {} turns for session {} to {}",
            history.len(),
            session_id,
            final_path.display()
        );
        Ok(final_path)
    }

    /// Read a transcript written by [`TranscriptArchive::save`]
    pub async fn load(path: &Path) -> Result<ArchivedTranscript> {
        let content = tokio::fs::read_to_string(path).await?;
        Ok(serde_json::from_str(&content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::CompletionStatus;
    use tempfile::TempDir;

    fn metadata() -> SummaryMetadata {
        SummaryMetadata {
            turn_count: 2,
            completion_status: CompletionStatus::EarlyExit,
            early_termination: true,
        }
    }

    #[tokio::test]
    async fn test_save_layout_and_content() {
        let dir = TempDir::new().unwrap();
        let archive = TranscriptArchive::new(dir.path());
        let history = vec![Turn::user("I read at night"), Turn::assistant("How long?")];

        let path = archive.save("s1", &history, &metadata()).await.unwrap();
        assert!(path.starts_with(dir.path().join("s1").join("logs")));
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("conversation_"));
        assert!(name.ends_with(".json"));

        let loaded = TranscriptArchive::load(&path).await.unwrap();
        assert_eq!(loaded.session_id, "s1");
        assert_eq!(loaded.conversation, history);
        assert_eq!(loaded.metadata, metadata());

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["metadata"]["completion_status"], "early_exit");
        assert_eq!(raw["conversation"][0]["role"], "user");
    }

    #[tokio::test]
    async fn test_no_temp_files_left() {
        let dir = TempDir::new().unwrap();
        let archive = TranscriptArchive::new(dir.path());
        archive.save("s1", &[], &metadata()).await.unwrap();

        let leftovers: Vec<_> = std::fs::read_dir(dir.path().join("s1/logs"))
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().is_some_and(|x| x == "tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn test_rejects_path_like_session_ids() {
        let dir = TempDir::new().unwrap();
        let archive = TranscriptArchive::new(dir.path());
        for bad in ["", "..", "a/b", "a\\b"] {
            assert!(matches!(
                archive.save(bad, &[], &metadata()).await,
                Err(WrenError::InvalidSessionId { .. })
            ));
        }
    }
}

//! Canonical checkpoint record encoding
//!
//! Records are stored as versioned JSON so independently deployed readers
//! and writers agree on the format:
//!
//! ```json
//! {"version":1,"checkpoint":{...},"metadata":{...},
//!  "config":{"session_id":"...","checkpoint_ns":"","checkpoint_id":"..."}}
//! ```

use serde::{Deserialize, Serialize};

use super::{Checkpoint, CheckpointMetadata};
use crate::error::{Result, WrenError};

/// Current record format version
pub const RECORD_VERSION: u32 = 1;

/// Where a record was written, stored inside the record itself
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordConfig {
    pub session_id: String,
    #[serde(default)]
    pub checkpoint_ns: String,
    pub checkpoint_id: String,
}

/// On-disk / on-wire checkpoint record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointRecord {
    pub version: u32,
    pub checkpoint: Checkpoint,
    #[serde(default)]
    pub metadata: CheckpointMetadata,
    pub config: RecordConfig,
}

impl CheckpointRecord {
    pub fn new(checkpoint: Checkpoint, metadata: CheckpointMetadata, config: RecordConfig) -> Self {
        Self {
            version: RECORD_VERSION,
            checkpoint,
            metadata,
            config,
        }
    }
}

pub fn encode(record: &CheckpointRecord) -> Result<Vec<u8>> {
    serde_json::to_vec(record).map_err(|e| {
        WrenError::serialization(&record.config.session_id, &record.config.checkpoint_id, e)
    })
}

/// Decode a record read from `session_id` / `checkpoint_id`
///
/// The ids are only used to give errors enough context to diagnose.
pub fn decode(bytes: &[u8], session_id: &str, checkpoint_id: &str) -> Result<CheckpointRecord> {
    let record: CheckpointRecord = serde_json::from_slice(bytes)
        .map_err(|e| WrenError::serialization(session_id, checkpoint_id, e))?;

    if record.version != RECORD_VERSION {
        return Err(WrenError::serialization(
            session_id,
            checkpoint_id,
            format!("unsupported record version {}", record.version),
        ));
    }

    Ok(record)
}

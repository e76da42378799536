//! Checkpoint persistence
//!
//! Durable, namespaced, TTL-bounded storage of session snapshots with a
//! movable `latest` alias per session.
//!
//! # Key Layout
//!
//! Every checkpoint lives under
//! `{namespace}:{session_id}[:{checkpoint_ns}]:{checkpoint_id}` and the most
//! recent one is duplicated under
//! `{namespace}:{session_id}[:{checkpoint_ns}]:latest`. The checkpoint
//! namespace segment is left out when it is empty.
//!
//! # Backends
//!
//! - [`memory::MemoryBackend`] - sharded in-process map, atomic multi-key sets
//! - [`file::FileBackend`] - one file per key, temp file + rename writes

pub mod backend;
pub mod codec;
pub mod file;
pub mod memory;
pub mod store;

pub use backend::KvBackend;
pub use file::FileBackend;
pub use memory::MemoryBackend;
pub use store::{CheckpointStore, LatestConsistency};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{Result, WrenError};

/// Alias key segment pointing at the most recent checkpoint
pub const LATEST: &str = "latest";

/// Separator between key segments
pub const KEY_SEPARATOR: char = ':';

/// Free-form annotations stored next to a checkpoint
pub type CheckpointMetadata = BTreeMap<String, serde_json::Value>;

/// Snapshot handed to the store
///
/// The payload is opaque to the store; only its encoded bytes are kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Checkpoint id; the store assigns one when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub payload: serde_json::Value,
}

impl Checkpoint {
    pub fn new(payload: serde_json::Value) -> Self {
        Self { id: None, payload }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

/// Fully resolved location of a checkpoint
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CheckpointAddress {
    pub namespace: String,
    pub session_id: String,
    #[serde(default)]
    pub checkpoint_ns: String,
    /// `None` addresses the `latest` alias
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkpoint_id: Option<String>,
}

impl CheckpointAddress {
    pub fn new(
        namespace: impl Into<String>,
        session_id: impl Into<String>,
        checkpoint_ns: impl Into<String>,
        checkpoint_id: Option<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            session_id: session_id.into(),
            checkpoint_ns: checkpoint_ns.into(),
            checkpoint_id,
        }
    }

    /// Same session scope, pointing at the `latest` alias
    pub fn latest(&self) -> Self {
        Self {
            checkpoint_id: None,
            ..self.clone()
        }
    }

    pub fn is_latest(&self) -> bool {
        self.checkpoint_id.is_none()
    }

    /// Key prefix shared by every checkpoint of this session scope,
    /// including the trailing separator
    pub fn scope_prefix(&self) -> String {
        let mut prefix = format!("{}{}{}", self.namespace, KEY_SEPARATOR, self.session_id);
        if !self.checkpoint_ns.is_empty() {
            prefix.push(KEY_SEPARATOR);
            prefix.push_str(&self.checkpoint_ns);
        }
        prefix.push(KEY_SEPARATOR);
        prefix
    }

    /// Backend key for this address
    pub fn key(&self) -> String {
        let mut key = self.scope_prefix();
        key.push_str(self.checkpoint_id.as_deref().unwrap_or(LATEST));
        key
    }
}

impl std::fmt::Display for CheckpointAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// A checkpoint read back from the store
#[derive(Debug, Clone, PartialEq)]
pub struct StoredCheckpoint {
    /// Address of the concrete checkpoint (never the alias)
    pub address: CheckpointAddress,
    pub checkpoint: Checkpoint,
    pub metadata: CheckpointMetadata,
}

impl StoredCheckpoint {
    pub fn id(&self) -> &str {
        self.address.checkpoint_id.as_deref().unwrap_or(LATEST)
    }

    /// Decode the opaque payload into a concrete type
    pub fn payload_as<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.checkpoint.payload.clone())
            .map_err(|e| WrenError::serialization(&self.address.session_id, self.id(), e))
    }
}

/// Check a single key segment supplied by a caller
pub(crate) fn validate_segment(value: &str, allow_empty: bool) -> bool {
    (allow_empty || !value.is_empty()) && !value.contains(KEY_SEPARATOR)
}

//! Checkpoint store
//!
//! Writes every checkpoint under its own id and under the session's
//! `latest` alias in one backend call, resolves reads against either, and
//! lists a session's history without the alias.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::backend::KvBackend;
use super::codec::{self, CheckpointRecord, RecordConfig};
use super::{
    validate_segment, Checkpoint, CheckpointAddress, CheckpointMetadata, StoredCheckpoint,
    KEY_SEPARATOR, LATEST,
};
use crate::config::CheckpointConfig;
use crate::error::{Result, WrenError};

/// Relationship between a session's `latest` alias and its newest checkpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LatestConsistency {
    /// Nothing stored for the session
    Empty,
    /// Alias points at the newest checkpoint
    Consistent { id: String },
    /// Checkpoints exist but the alias is missing
    MissingAlias { newest: String },
    /// Alias points at an older checkpoint than the newest one
    Stale { latest: String, newest: String },
}

/// Namespaced, TTL-bounded checkpoint storage over a [`KvBackend`]
pub struct CheckpointStore {
    backend: Arc<dyn KvBackend>,
    namespace: String,
    ttl: Duration,
    last_id_micros: AtomicU64,
}

impl CheckpointStore {
    pub fn new(backend: Arc<dyn KvBackend>, namespace: impl Into<String>, ttl: Duration) -> Self {
        Self {
            backend,
            namespace: namespace.into(),
            ttl,
            last_id_micros: AtomicU64::new(0),
        }
    }

    pub fn from_config(backend: Arc<dyn KvBackend>, config: &CheckpointConfig) -> Self {
        Self::new(backend, config.namespace.clone(), Duration::from_secs(config.ttl_secs))
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Build a validated address
    pub fn address(
        &self,
        session_id: &str,
        checkpoint_ns: &str,
        checkpoint_id: Option<&str>,
    ) -> Result<CheckpointAddress> {
        if !validate_segment(session_id, false) {
            return Err(WrenError::InvalidSessionId {
                session_id: session_id.to_string(),
            });
        }
        if !validate_segment(checkpoint_ns, true) {
            return Err(WrenError::InvalidConfig {
                message: format!("checkpoint namespace {:?} must not contain ':'", checkpoint_ns),
            });
        }
        if let Some(id) = checkpoint_id {
            if !validate_segment(id, false) || id == LATEST {
                return Err(WrenError::InvalidConfig {
                    message: format!("invalid checkpoint id {:?}", id),
                });
            }
        }

        Ok(CheckpointAddress::new(
            self.namespace.clone(),
            session_id,
            checkpoint_ns,
            checkpoint_id.map(str::to_string),
        ))
    }

    /// Time-ordered id: zero-padded microseconds plus a short random suffix
    ///
    /// Microseconds are forced strictly increasing within this store so ids
    /// sort in write order even for back-to-back puts.
    fn next_checkpoint_id(&self) -> String {
        let now = chrono::Utc::now().timestamp_micros().max(0) as u64;
        let mut prev = self.last_id_micros.load(Ordering::Relaxed);
        let micros = loop {
            let next = now.max(prev + 1);
            match self.last_id_micros.compare_exchange_weak(
                prev,
                next,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break next,
                Err(actual) => prev = actual,
            }
        };
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        format!("{:020}-{}", micros, &suffix[..8])
    }

    /// Persist a checkpoint and move the session's `latest` alias onto it
    ///
    /// Both keys are written in a single backend call with the configured
    /// TTL. An error means the write must be treated as not committed.
    pub async fn put(
        &self,
        session_id: &str,
        checkpoint_ns: &str,
        mut checkpoint: Checkpoint,
        metadata: CheckpointMetadata,
    ) -> Result<CheckpointAddress> {
        let checkpoint_id = match checkpoint.id.clone() {
            Some(id) => id,
            None => self.next_checkpoint_id(),
        };
        let address = self.address(session_id, checkpoint_ns, Some(&checkpoint_id))?;
        checkpoint.id = Some(checkpoint_id.clone());

        let record = CheckpointRecord::new(
            checkpoint,
            metadata,
            RecordConfig {
                session_id: session_id.to_string(),
                checkpoint_ns: checkpoint_ns.to_string(),
                checkpoint_id: checkpoint_id.clone(),
            },
        );
        let bytes = codec::encode(&record)?;
        let size = bytes.len();

        let entries = vec![(address.key(), bytes.clone()), (address.latest().key(), bytes)];
        self.backend.set_many_ex(entries, self.ttl).await?;

        info!(
            "[CheckpointStore] Saved checkpoint {} for session {} ({} bytes)",
            checkpoint_id, session_id, size
        );
        Ok(address)
    }

    /// Load a checkpoint; `checkpoint_id = None` resolves the `latest` alias
    ///
    /// Returns `Ok(None)` when nothing is stored or the entry expired.
    pub async fn get(
        &self,
        session_id: &str,
        checkpoint_ns: &str,
        checkpoint_id: Option<&str>,
    ) -> Result<Option<StoredCheckpoint>> {
        let address = self.address(session_id, checkpoint_ns, checkpoint_id)?;
        let checkpoint_ref = checkpoint_id.unwrap_or(LATEST);
        let bytes = self
            .backend
            .get(&address.key())
            .await
            .map_err(|e| with_checkpoint_context(e, session_id, checkpoint_ref))?;
        let Some(bytes) = bytes else {
            debug!("[CheckpointStore] No checkpoint at {}", address);
            return Ok(None);
        };

        let record = codec::decode(&bytes, session_id, checkpoint_ref)?;
        Ok(Some(self.into_stored(&address, record)))
    }

    /// Every checkpoint of a session except the `latest` alias
    ///
    /// Sorted by key, which is write order for store-assigned ids. A record
    /// that fails to decode is returned as an `Err` item without affecting
    /// the others.
    pub async fn list(
        &self,
        session_id: &str,
        checkpoint_ns: &str,
        limit: Option<usize>,
    ) -> Result<Vec<Result<StoredCheckpoint>>> {
        let ids = self.checkpoint_ids(session_id, checkpoint_ns).await?;
        let take = limit.unwrap_or(usize::MAX);

        let mut results = Vec::new();
        for id in ids.into_iter().take(take) {
            let address = self.address(session_id, checkpoint_ns, Some(&id))?;
            match self.backend.get(&address.key()).await {
                Ok(Some(bytes)) => {
                    let item = codec::decode(&bytes, session_id, &id)
                        .map(|record| self.into_stored(&address, record));
                    if let Err(e) = &item {
                        warn!(
                            "[CheckpointStore] Skipping unreadable checkpoint {}: {}",
                            address, e
                        );
                    }
                    results.push(item);
                }
                // Expired between enumeration and read
                Ok(None) => {}
                Err(e) => {
                    warn!("[CheckpointStore] Failed to read checkpoint {}: {}", address, e);
                    results.push(Err(with_checkpoint_context(e, session_id, &id)));
                }
            }
        }

        Ok(results)
    }

    /// Extension point for staged writes; intentionally stores nothing
    pub async fn put_writes(
        &self,
        session_id: &str,
        checkpoint_ns: &str,
        task_id: &str,
        writes: &[(String, serde_json::Value)],
    ) -> Result<()> {
        debug!(
            "[CheckpointStore] Ignoring {} pending writes from task {} for {}:{}",
            writes.len(),
            task_id,
            session_id,
            checkpoint_ns
        );
        Ok(())
    }

    /// Remove every key of a session scope, the alias included
    pub async fn delete_session(&self, session_id: &str, checkpoint_ns: &str) -> Result<usize> {
        let mut keys: Vec<String> = self
            .checkpoint_ids(session_id, checkpoint_ns)
            .await?
            .into_iter()
            .map(|id| {
                self.address(session_id, checkpoint_ns, Some(&id))
                    .map(|a| a.key())
            })
            .collect::<Result<_>>()?;
        keys.push(self.address(session_id, checkpoint_ns, None)?.key());

        let mut removed = 0;
        for key in keys {
            if self.backend.delete(&key).await? {
                removed += 1;
            }
        }

        info!("[CheckpointStore] Deleted {} keys for session {}", removed, session_id);
        Ok(removed)
    }

    /// Detect a `latest` alias left behind by an interrupted two-key write
    pub async fn check_latest(
        &self,
        session_id: &str,
        checkpoint_ns: &str,
    ) -> Result<LatestConsistency> {
        let newest = self.checkpoint_ids(session_id, checkpoint_ns).await?.pop();
        let latest = self.get(session_id, checkpoint_ns, None).await?;

        let state = match (latest, newest) {
            (None, None) => LatestConsistency::Empty,
            (None, Some(newest)) => LatestConsistency::MissingAlias { newest },
            (Some(latest), None) => LatestConsistency::Consistent {
                id: latest.id().to_string(),
            },
            (Some(latest), Some(newest)) if latest.id() == newest => {
                LatestConsistency::Consistent { id: newest }
            }
            (Some(latest), Some(newest)) => LatestConsistency::Stale {
                latest: latest.id().to_string(),
                newest,
            },
        };

        if !matches!(state, LatestConsistency::Empty | LatestConsistency::Consistent { .. }) {
            warn!("[CheckpointStore] Inconsistent latest alias for {}: {:?}", session_id, state);
        }
        Ok(state)
    }

    /// Close the backend handle
    pub async fn close(&self) -> Result<()> {
        self.backend.close().await
    }

    /// Sorted checkpoint ids of exactly this session scope
    async fn checkpoint_ids(&self, session_id: &str, checkpoint_ns: &str) -> Result<Vec<String>> {
        let prefix = self.address(session_id, checkpoint_ns, None)?.scope_prefix();
        let mut ids: Vec<String> = self
            .backend
            .keys(&prefix)
            .await?
            .into_iter()
            .filter_map(|key| {
                let rest = key.strip_prefix(&prefix)?;
                // Nested checkpoint namespaces carry another separator
                if rest.is_empty() || rest == LATEST || rest.contains(KEY_SEPARATOR) {
                    None
                } else {
                    Some(rest.to_string())
                }
            })
            .collect();
        ids.sort();
        Ok(ids)
    }

    fn into_stored(
        &self,
        requested: &CheckpointAddress,
        record: CheckpointRecord,
    ) -> StoredCheckpoint {
        let mut address = requested.clone();
        address.checkpoint_id = Some(record.config.checkpoint_id.clone());
        let mut checkpoint = record.checkpoint;
        if checkpoint.id.is_none() {
            checkpoint.id = Some(record.config.checkpoint_id);
        }
        StoredCheckpoint {
            address,
            checkpoint,
            metadata: record.metadata,
        }
    }
}

/// Undecodable backend entries are reported like undecodable records
fn with_checkpoint_context(err: WrenError, session_id: &str, checkpoint_id: &str) -> WrenError {
    match err {
        WrenError::CorruptEntry { key, message } => {
            WrenError::serialization(session_id, checkpoint_id, format!("{}: {}", key, message))
        }
        other => other,
    }
}

//! In-process key/value backend
//!
//! Keys are spread over shards by their session scope (everything before
//! the last `:`), so a checkpoint key and its `latest` alias always share a
//! shard and different sessions rarely contend on the same lock. Reads and
//! enumeration only take shared locks and skip expired entries; expired
//! entries are dropped by the writes that already hold a shard's write lock,
//! and by a `get` that finds its own key expired.

use parking_lot::RwLock;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use super::backend::KvBackend;
use super::KEY_SEPARATOR;
use crate::error::{Result, WrenError};

const DEFAULT_SHARDS: usize = 16;

#[derive(Debug, Clone)]
struct Entry {
    value: Vec<u8>,
    /// `None` when the TTL reaches past what `Instant` can represent
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// Sharded in-memory backend with TTL expiry
pub struct MemoryBackend {
    shards: Vec<RwLock<HashMap<String, Entry>>>,
    closed: AtomicBool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::with_shards(DEFAULT_SHARDS)
    }

    pub fn with_shards(count: usize) -> Self {
        let count = count.max(1);
        Self {
            shards: (0..count).map(|_| RwLock::new(HashMap::new())).collect(),
            closed: AtomicBool::new(false),
        }
    }

    /// Number of stored entries, expired ones included
    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.read().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn shard_index(&self, key: &str) -> usize {
        let scope = key.rsplit_once(KEY_SEPARATOR).map(|(scope, _)| scope).unwrap_or(key);
        let mut hasher = DefaultHasher::new();
        scope.hash(&mut hasher);
        (hasher.finish() as usize) % self.shards.len()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(WrenError::StoreClosed);
        }
        Ok(())
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl KvBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn atomic_multi_set(&self) -> bool {
        true
    }

    async fn set_ex(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()> {
        self.set_many_ex(vec![(key.to_string(), value)], ttl).await
    }

    async fn set_many_ex(&self, entries: Vec<(String, Vec<u8>)>, ttl: Duration) -> Result<()> {
        self.ensure_open()?;
        let now = Instant::now();
        let expires_at = now.checked_add(ttl);

        let mut indices: Vec<usize> = entries.iter().map(|(k, _)| self.shard_index(k)).collect();
        indices.sort_unstable();
        indices.dedup();

        // Lock every touched shard in index order, then apply all entries
        let mut guards: Vec<_> = indices.iter().map(|&i| (i, self.shards[i].write())).collect();
        for (_, guard) in guards.iter_mut() {
            guard.retain(|_, entry| !entry.is_expired(now));
        }
        for (key, value) in entries {
            let idx = self.shard_index(&key);
            if let Some((_, guard)) = guards.iter_mut().find(|(i, _)| *i == idx) {
                guard.insert(key, Entry { value, expires_at });
            }
        }

        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.ensure_open()?;
        let shard = &self.shards[self.shard_index(key)];
        let now = Instant::now();

        {
            let guard = shard.read();
            match guard.get(key) {
                None => return Ok(None),
                Some(entry) if !entry.is_expired(now) => return Ok(Some(entry.value.clone())),
                Some(_) => {}
            }
        }

        let mut guard = shard.write();
        if guard.get(key).is_some_and(|e| e.is_expired(now)) {
            guard.remove(key);
        }
        Ok(None)
    }

    async fn keys(&self, prefix: &str) -> Result<Vec<String>> {
        self.ensure_open()?;
        let now = Instant::now();
        let mut keys = Vec::new();

        for shard in &self.shards {
            let guard = shard.read();
            keys.extend(
                guard
                    .iter()
                    .filter(|(k, entry)| k.starts_with(prefix) && !entry.is_expired(now))
                    .map(|(k, _)| k.clone()),
            );
        }

        Ok(keys)
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        self.ensure_open()?;
        let removed = self.shards[self.shard_index(key)].write().remove(key);
        Ok(removed.is_some_and(|e| !e.is_expired(Instant::now())))
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        for shard in &self.shards {
            shard.write().clear();
        }
        Ok(())
    }
}

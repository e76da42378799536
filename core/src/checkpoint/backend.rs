//! Key/value backend seam for the checkpoint store

use std::time::Duration;

use crate::error::Result;

/// Minimal key/value service the checkpoint store is built on
///
/// Implementations must be safe to share across sessions; the store never
/// holds a lock of its own around backend calls.
#[async_trait::async_trait]
pub trait KvBackend: Send + Sync {
    /// Short backend name for logs
    fn name(&self) -> &'static str;

    /// Whether [`KvBackend::set_many_ex`] applies all entries atomically
    fn atomic_multi_set(&self) -> bool {
        false
    }

    /// Set `key` to `value`, expiring after `ttl`
    async fn set_ex(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()>;

    /// Set several keys with the same expiry
    ///
    /// The default writes entries one after another in the given order. A
    /// crash in between leaves the earlier entries written and the later
    /// ones untouched.
    async fn set_many_ex(&self, entries: Vec<(String, Vec<u8>)>, ttl: Duration) -> Result<()> {
        for (key, value) in entries {
            self.set_ex(&key, value, ttl).await?;
        }
        Ok(())
    }

    /// Value for `key`, `None` when missing or expired
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Every live key starting with `prefix`, in no particular order
    async fn keys(&self, prefix: &str) -> Result<Vec<String>>;

    /// Remove `key`; returns whether it existed
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Release the backend; later calls fail with `StoreClosed`
    async fn close(&self) -> Result<()>;
}

//! Directory-backed key/value backend
//!
//! Each key is one file named after the hex SHA-256 digest of the key, so
//! file names stay the same length however long the session id is. Files
//! hold a small JSON envelope with the full key, the expiry time and the
//! base64 value:
//!
//! ```json
//! {"key":"wren:checkpoint:cli_1:latest","expires_at":"2026-01-01T00:00:00Z","value":"..."}
//! ```
//!
//! Writes go to a unique temp file that is renamed over the target, so a
//! reader sees either the old file or the new one. There are no multi-key
//! transactions: `set_many_ex` renames entries one at a time, in order.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

use super::backend::KvBackend;
use crate::error::{Result, WrenError};

const ENTRY_EXT: &str = "ckpt";
const TEMP_EXT: &str = "tmp";

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    key: String,
    expires_at: DateTime<Utc>,
    value: String,
}

impl Envelope {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// File-per-key backend rooted at a directory
pub struct FileBackend {
    dir: PathBuf,
    closed: AtomicBool,
}

impl FileBackend {
    /// Open (and create if needed) the backend directory
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| io_unavailable(&dir, e))?;
        debug!("[FileBackend] Opened {}", dir.display());
        Ok(Self {
            dir,
            closed: AtomicBool::new(false),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_stem(key: &str) -> String {
        hex::encode(Sha256::digest(key.as_bytes()))
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", Self::entry_stem(key), ENTRY_EXT))
    }

    fn is_entry_file(path: &Path) -> bool {
        path.extension().and_then(|e| e.to_str()) == Some(ENTRY_EXT)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(WrenError::StoreClosed);
        }
        Ok(())
    }

    /// Read an envelope; `None` when the file does not exist
    async fn read_envelope(&self, path: &Path) -> Result<Option<Envelope>> {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_unavailable(path, e)),
        };

        let envelope = serde_json::from_slice(&bytes)
            .map_err(|e| WrenError::corrupt_entry(path.display().to_string(), e))?;
        Ok(Some(envelope))
    }

    /// Write to a unique temp file, then rename over the target
    async fn write_atomic(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()> {
        let expires_at = expiry_after(Utc::now(), ttl);
        let envelope = Envelope {
            key: key.to_string(),
            expires_at,
            value: BASE64.encode(value),
        };
        let json = serde_json::to_vec(&envelope)?;

        let final_path = self.entry_path(key);
        let temp_path = self.dir.join(format!(
            "{}.{}.{}",
            Self::entry_stem(key),
            uuid::Uuid::new_v4().simple(),
            TEMP_EXT
        ));

        tokio::fs::write(&temp_path, json)
            .await
            .map_err(|e| io_unavailable(&temp_path, e))?;

        if let Err(e) = tokio::fs::rename(&temp_path, &final_path).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(io_unavailable(&final_path, e));
        }

        Ok(())
    }

    async fn remove_if_present(&self, path: &Path) -> Result<bool> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(io_unavailable(path, e)),
        }
    }
}

#[async_trait::async_trait]
impl KvBackend for FileBackend {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn set_ex(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()> {
        self.ensure_open()?;
        self.write_atomic(key, &value, ttl).await
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.ensure_open()?;
        let path = self.entry_path(key);

        let envelope = self.read_envelope(&path).await.map_err(|e| match e {
            WrenError::CorruptEntry { message, .. } => WrenError::corrupt_entry(key, message),
            other => other,
        })?;
        let Some(envelope) = envelope else {
            return Ok(None);
        };

        if envelope.is_expired(Utc::now()) {
            self.remove_if_present(&path).await?;
            return Ok(None);
        }

        if envelope.key != key {
            return Err(WrenError::corrupt_entry(
                key,
                format!("file {} holds key {}", path.display(), envelope.key),
            ));
        }

        let value = BASE64
            .decode(envelope.value.as_bytes())
            .map_err(|e| WrenError::corrupt_entry(key, e))?;
        Ok(Some(value))
    }

    async fn keys(&self, prefix: &str) -> Result<Vec<String>> {
        self.ensure_open()?;
        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .map_err(|e| io_unavailable(&self.dir, e))?;

        let now = Utc::now();
        let mut keys = Vec::new();

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| io_unavailable(&self.dir, e))?
        {
            let path = entry.path();
            if !Self::is_entry_file(&path) {
                continue;
            }

            match self.read_envelope(&path).await {
                Ok(Some(envelope)) if !envelope.key.starts_with(prefix) => {}
                Ok(Some(envelope)) if envelope.is_expired(now) => {
                    self.remove_if_present(&path).await?;
                }
                Ok(Some(envelope)) => keys.push(envelope.key),
                Ok(None) => {}
                // The key lives inside the file, so an unreadable one cannot be attributed
                Err(e) => {
                    warn!("[FileBackend] Skipping unreadable entry {}: {}", path.display(), e);
                }
            }
        }

        Ok(keys)
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        self.ensure_open()?;
        self.remove_if_present(&self.entry_path(key)).await
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        debug!("[FileBackend] Closed {}", self.dir.display());
        Ok(())
    }
}

/// Expiry for a write at `now`; out-of-range TTLs are capped at a century
fn expiry_after(now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|ttl| now.checked_add_signed(ttl))
        .unwrap_or_else(|| now + chrono::Duration::days(36_500))
}

/// Transient IO failures stay retryable; the rest keep their `io::Error`
fn io_unavailable(path: &Path, err: std::io::Error) -> WrenError {
    match err.kind() {
        std::io::ErrorKind::InvalidInput | std::io::ErrorKind::PermissionDenied => WrenError::Io(
            std::io::Error::new(err.kind(), format!("{}: {}", path.display(), err)),
        ),
        _ => WrenError::unavailable(format!("{}: {}", path.display(), err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const TTL: Duration = Duration::from_secs(60);

    #[tokio::test]
    async fn test_roundtrip_and_delete() {
        let dir = TempDir::new().unwrap();
        let backend = FileBackend::open(dir.path()).await.unwrap();

        backend.set_ex("ns:s1:a", b"payload".to_vec(), TTL).await.unwrap();
        assert_eq!(backend.get("ns:s1:a").await.unwrap(), Some(b"payload".to_vec()));

        assert!(backend.delete("ns:s1:a").await.unwrap());
        assert!(!backend.delete("ns:s1:a").await.unwrap());
        assert_eq!(backend.get("ns:s1:a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_overwrite_leaves_no_temp_files() {
        let dir = TempDir::new().unwrap();
        let backend = FileBackend::open(dir.path()).await.unwrap();

        backend.set_ex("ns:s1:latest", b"one".to_vec(), TTL).await.unwrap();
        backend.set_ex("ns:s1:latest", b"two".to_vec(), TTL).await.unwrap();
        assert_eq!(backend.get("ns:s1:latest").await.unwrap(), Some(b"two".to_vec()));

        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names.len(), 1);
        assert!(names[0].ends_with(".ckpt"));
    }

    #[tokio::test]
    async fn test_keys_ignore_foreign_files() {
        let dir = TempDir::new().unwrap();
        let backend = FileBackend::open(dir.path()).await.unwrap();

        backend.set_ex("ns:s1:a", vec![1], TTL).await.unwrap();
        backend.set_ex("ns:s2:a", vec![2], TTL).await.unwrap();
        std::fs::write(dir.path().join("README.txt"), "hello").unwrap();
        std::fs::write(dir.path().join("zz.ckpt"), "not hex").unwrap();

        assert_eq!(backend.keys("ns:s1:").await.unwrap(), vec!["ns:s1:a"]);
    }

    #[tokio::test]
    async fn test_expired_file_is_removed() {
        let dir = TempDir::new().unwrap();
        let backend = FileBackend::open(dir.path()).await.unwrap();

        backend.set_ex("ns:s1:a", vec![1], Duration::from_millis(10)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(backend.keys("ns:").await.unwrap().is_empty());
        assert_eq!(backend.get("ns:s1:a").await.unwrap(), None);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_corrupt_file_surfaces_as_error() {
        let dir = TempDir::new().unwrap();
        let backend = FileBackend::open(dir.path()).await.unwrap();

        let path = backend.entry_path("ns:s1:a");
        std::fs::write(&path, "{broken").unwrap();

        let err = backend.get("ns:s1:a").await.unwrap_err();
        assert!(matches!(&err, WrenError::CorruptEntry { key, .. } if key == "ns:s1:a"));
        assert!(!err.is_retryable());
        assert!(backend.keys("ns:s1:").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_bad_base64_is_listed_and_reported() {
        let dir = TempDir::new().unwrap();
        let backend = FileBackend::open(dir.path()).await.unwrap();

        let envelope = Envelope {
            key: "ns:s1:a".to_string(),
            expires_at: Utc::now() + chrono::Duration::hours(1),
            value: "***".to_string(),
        };
        std::fs::write(backend.entry_path("ns:s1:a"), serde_json::to_vec(&envelope).unwrap())
            .unwrap();

        assert_eq!(backend.keys("ns:s1:").await.unwrap(), vec!["ns:s1:a"]);
        let err = backend.get("ns:s1:a").await.unwrap_err();
        assert!(matches!(err, WrenError::CorruptEntry { .. }));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_long_keys_fit_in_file_names() {
        let dir = TempDir::new().unwrap();
        let backend = FileBackend::open(dir.path()).await.unwrap();

        let key = format!("wren:checkpoint:{}:latest", "a".repeat(200));
        backend.set_ex(&key, b"long".to_vec(), TTL).await.unwrap();

        assert_eq!(backend.get(&key).await.unwrap(), Some(b"long".to_vec()));
        assert_eq!(backend.keys("wren:checkpoint:").await.unwrap(), vec![key.clone()]);

        let name = std::fs::read_dir(dir.path())
            .unwrap()
            .next()
            .unwrap()
            .unwrap()
            .file_name();
        assert_eq!(name.len(), 64 + 1 + ENTRY_EXT.len());
    }

    #[tokio::test]
    async fn test_huge_ttl_does_not_overflow() {
        let dir = TempDir::new().unwrap();
        let backend = FileBackend::open(dir.path()).await.unwrap();

        let forever = Duration::from_secs(i64::MAX as u64);
        backend.set_ex("ns:s1:a", vec![7], forever).await.unwrap();
        backend.set_ex("ns:s1:b", vec![8], Duration::from_secs(10u64.pow(15))).await.unwrap();

        assert_eq!(backend.get("ns:s1:a").await.unwrap(), Some(vec![7]));
        assert_eq!(backend.get("ns:s1:b").await.unwrap(), Some(vec![8]));
    }

    #[tokio::test]
    async fn test_data_survives_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let backend = FileBackend::open(dir.path()).await.unwrap();
            backend.set_ex("ns:s1:a", b"kept".to_vec(), TTL).await.unwrap();
            backend.close().await.unwrap();
            assert!(matches!(backend.get("ns:s1:a").await, Err(WrenError::StoreClosed)));
        }

        let reopened = FileBackend::open(dir.path()).await.unwrap();
        assert_eq!(reopened.get("ns:s1:a").await.unwrap(), Some(b"kept".to_vec()));
    }
}

//! # fhirlink-auth-fs
//!
//! File-backed [`StorageBackend`] for the `fhirlink-auth` client.
//!
//! Browser hosts get cross-redirect persistence from the browser itself;
//! native hosts (CLIs driving a system-browser flow, desktop webviews) need
//! somewhere durable instead. This backend keeps one pretty-printed JSON
//! document per namespace under a configurable directory, defaulting to
//! `~/.fhirlink`.
//!
//! Every `set`/`remove` is a read-modify-write of the whole document. That
//! is deliberate: the client persists a single composite record per flow,
//! so the document stays tiny and whole-file writes keep it consistent.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use fhirlink_auth::storage::{StorageBackend, StorageError};

/// Storage backend over a JSON document on disk.
#[derive(Debug, Clone)]
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    /// Directory name used under the home directory by
    /// [`with_default_dir`](Self::with_default_dir).
    pub const DEFAULT_DIR_NAME: &'static str = ".fhirlink";

    /// Creates a backend storing `{dir}/{namespace}.json`, creating the
    /// directory if needed.
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] if the directory cannot be created.
    pub fn new(dir: impl AsRef<Path>, namespace: &str) -> Result<Self, StorageError> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)
            .map_err(|e| StorageError::unavailable(format!("create {}: {e}", dir.display())))?;
        Ok(Self {
            path: dir.join(format!("{namespace}.json")),
        })
    }

    /// Creates a backend under `~/.fhirlink`.
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] if the home directory cannot be
    /// determined or the directory cannot be created.
    pub fn with_default_dir(namespace: &str) -> Result<Self, StorageError> {
        let home = dirs::home_dir()
            .ok_or_else(|| StorageError::unavailable("cannot determine home directory"))?;
        Self::new(home.join(Self::DEFAULT_DIR_NAME), namespace)
    }

    /// Path of the backing document.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<BTreeMap<String, String>, StorageError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => serde_json::from_str(&content).map_err(|e| {
                StorageError::unavailable(format!(
                    "corrupt storage document {}: {e}",
                    self.path.display()
                ))
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(StorageError::unavailable(format!(
                "read {}: {e}",
                self.path.display()
            ))),
        }
    }

    async fn store(&self, entries: &BTreeMap<String, String>) -> Result<(), StorageError> {
        let content = serde_json::to_string_pretty(entries)
            .map_err(|e| StorageError::unavailable(format!("serialize storage document: {e}")))?;
        tokio::fs::write(&self.path, content).await.map_err(|e| {
            let message = format!("write {}: {e}", self.path.display());
            if e.kind() == ErrorKind::StorageFull {
                StorageError::quota_exceeded(message)
            } else {
                StorageError::unavailable(message)
            }
        })
    }
}

#[async_trait]
impl StorageBackend for FileStorage {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.load().await?.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut entries = self.load().await?;
        entries.insert(key.to_string(), value.to_string());
        self.store(&entries).await
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut entries = self.load().await?;
        if entries.remove(key).is_some() {
            self.store(&entries).await?;
        }
        Ok(())
    }
}

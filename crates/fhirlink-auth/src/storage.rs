//! Durable key-value storage for the pending authorization request.
//!
//! The redirect flow survives a full page navigation, so everything it needs
//! on the way back (the PKCE verifier, the anti-forgery state and the
//! pre-redirect URL) must be persisted before the browser leaves and read
//! back on the next load. This module defines the storage contract and an
//! in-memory backend; durable backends live in separate crates
//! (`fhirlink-auth-fs` for file-backed hosts).
//!
//! Both operations are async even when the underlying medium is synchronous,
//! so callers can be written uniformly regardless of backend latency. No
//! multi-key transaction is offered; the flow avoids needing one by
//! persisting a single composite record.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

/// Errors raised by a storage backend.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StorageError {
    /// The storage medium is unavailable or rejected the operation.
    #[error("Storage unavailable: {message}")]
    Unavailable {
        /// Description of the failure.
        message: String,
    },

    /// The storage medium is out of space.
    #[error("Storage quota exceeded: {message}")]
    QuotaExceeded {
        /// Description of the failure.
        message: String,
    },
}

impl StorageError {
    /// Creates a new `Unavailable` error.
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    /// Creates a new `QuotaExceeded` error.
    #[must_use]
    pub fn quota_exceeded(message: impl Into<String>) -> Self {
        Self::QuotaExceeded {
            message: message.into(),
        }
    }
}

/// Storage contract for flow state that must survive a redirect.
///
/// Implementations map keys to UTF-8 string values. Values written with
/// [`set`](StorageBackend::set) must be read back byte-for-byte identical by
/// [`get`](StorageBackend::get); the flow aborts if the pending request does
/// not round-trip exactly.
///
/// # Implementations
///
/// - [`MemoryStorage`] (this crate), for tests and short-lived hosts
/// - `fhirlink_auth_fs::FileStorage`, a JSON document on disk
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Reads the value stored under `key`, or `None` if absent.
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] if the medium cannot be read.
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Writes `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] on quota or availability failure.
    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Deletes the value stored under `key`. Deleting an absent key is not
    /// an error.
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] if the medium cannot be written.
    async fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// Storage key namespace for one client instance.
///
/// Keys are derived from a caller-supplied prefix so that multiple client
/// instances can share one storage medium without clobbering each other.
#[derive(Debug, Clone)]
pub struct StorageKeys {
    prefix: String,
}

impl StorageKeys {
    /// Default key prefix used when the caller does not supply one.
    pub const DEFAULT_PREFIX: &'static str = "fhirlink-auth";

    /// Creates a key namespace from a prefix.
    ///
    /// A trailing `-` on the prefix is tolerated and normalized away.
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        Self {
            prefix: prefix.trim_end_matches('-').to_string(),
        }
    }

    /// Key under which the composite pending-authorization record is stored.
    #[must_use]
    pub fn pending_request(&self) -> String {
        format!("{}-pending-request", self.prefix)
    }

    /// Key under which the most recently supplied issuer URL is stored.
    #[must_use]
    pub fn original_issuer(&self) -> String {
        format!("{}-original-issuer", self.prefix)
    }

    /// Key under which a completed token response is cached.
    #[must_use]
    pub fn cached_token(&self) -> String {
        format!("{}-token", self.prefix)
    }
}

impl Default for StorageKeys {
    fn default() -> Self {
        Self::new(Self::DEFAULT_PREFIX)
    }
}

/// In-memory storage backend.
///
/// State is lost when the process exits, so this backend cannot carry a flow
/// across a real page reload. It exists for tests and for hosts that keep
/// the process alive across the redirect (embedded webviews, system-browser
/// loopback flows).
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStorage {
    /// Creates an empty in-memory backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StorageBackend for MemoryStorage {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_storage_round_trip() {
        let storage = MemoryStorage::new();

        assert_eq!(storage.get("missing").await.unwrap(), None);

        storage.set("key", "value").await.unwrap();
        assert_eq!(storage.get("key").await.unwrap().as_deref(), Some("value"));

        storage.set("key", "replaced").await.unwrap();
        assert_eq!(
            storage.get("key").await.unwrap().as_deref(),
            Some("replaced")
        );

        storage.remove("key").await.unwrap();
        assert_eq!(storage.get("key").await.unwrap(), None);

        // Removing an absent key is not an error.
        storage.remove("key").await.unwrap();
    }

    #[test]
    fn test_storage_keys_derivation() {
        let keys = StorageKeys::new("myapp");
        assert_eq!(keys.pending_request(), "myapp-pending-request");
        assert_eq!(keys.original_issuer(), "myapp-original-issuer");
        assert_eq!(keys.cached_token(), "myapp-token");
    }

    #[test]
    fn test_storage_keys_trailing_separator_normalized() {
        let keys = StorageKeys::new("myapp-");
        assert_eq!(keys.pending_request(), "myapp-pending-request");
    }

    #[test]
    fn test_storage_keys_default_prefix() {
        let keys = StorageKeys::default();
        assert_eq!(keys.pending_request(), "fhirlink-auth-pending-request");
    }

    #[test]
    fn test_two_namespaces_do_not_collide() {
        let a = StorageKeys::new("app-a");
        let b = StorageKeys::new("app-b");
        assert_ne!(a.pending_request(), b.pending_request());
        assert_ne!(a.cached_token(), b.cached_token());
    }

    #[test]
    fn test_storage_error_display() {
        let err = StorageError::unavailable("medium offline");
        assert_eq!(err.to_string(), "Storage unavailable: medium offline");

        let err = StorageError::quota_exceeded("5 MB limit reached");
        assert_eq!(err.to_string(), "Storage quota exceeded: 5 MB limit reached");
    }
}

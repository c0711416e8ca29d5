//! Storage backend trait definition.

use async_trait::async_trait;

use crate::error::StorageError;

/// Storage backend trait for implementing different storage engines.
///
/// A missing key is not an error: `get` returns `Ok(None)`. Every `Err` is an
/// I/O level failure the caller may retry later.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Get a value by key.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Put a value with a key.
    ///
    /// The write must be atomic: a reader sees either nothing or the full value.
    async fn put(&self, key: &str, value: &[u8]) -> Result<(), StorageError>;

    /// List keys with a prefix.
    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError>;

    /// Check if a key exists.
    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.get(key).await?.is_some())
    }
}

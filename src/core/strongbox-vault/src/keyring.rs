//! DEK lifecycle: creation, persistence and resolution.
//!
//! Resolution goes cache, then storage, then the master keyring. A miss only
//! ever costs latency; the cache never changes an outcome.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use strongbox_crypto::{random, SymmetricKey};
use strongbox_storage::{StorageBackend, StorageError};

use crate::cache::KeyCache;
use crate::clock::Clock;
use crate::error::VaultError;
use crate::master_keys::MasterKeyring;
use crate::record::{keyring_prefix, storage_key, Algorithm, DekMetadata, DekRecord};

/// Prefix of generated DEK ids.
pub const DEK_ID_PREFIX: &str = "dek";

/// Longest accepted keyring name or key id.
pub const MAX_NAME_LEN: usize = 128;

/// Checks a keyring name: 1..=128 chars of `[A-Za-z0-9_.-]`.
pub fn validate_keyring(name: &str) -> Result<(), VaultError> {
    if name.is_empty() {
        return Err(VaultError::InvalidArgument(
            "keyring name cannot be empty".into(),
        ));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(VaultError::InvalidArgument(format!(
            "keyring name too long (max {MAX_NAME_LEN} chars)"
        )));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        return Err(VaultError::InvalidArgument(
            "keyring name can only contain alphanumeric, dash, underscore, dot".into(),
        ));
    }
    Ok(())
}

/// Checks a key id: 1..=128 chars of `[A-Za-z0-9_-]`.
pub fn validate_key_id(key_id: &str) -> Result<(), VaultError> {
    if key_id.is_empty() {
        return Err(VaultError::InvalidArgument("key id cannot be empty".into()));
    }
    if key_id.len() > MAX_NAME_LEN {
        return Err(VaultError::InvalidArgument(format!(
            "key id too long (max {MAX_NAME_LEN} chars)"
        )));
    }
    if !key_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_'))
    {
        return Err(VaultError::InvalidArgument(
            "key id can only contain alphanumeric, dash, underscore".into(),
        ));
    }
    Ok(())
}

/// Associated data a DEK is wrapped with, binding it to its record.
fn wrap_context(keyring: &str, key_id: &str) -> Vec<u8> {
    format!("strongbox-dek:v1:{keyring}:{key_id}").into_bytes()
}

/// Creates, persists and resolves DEKs.
pub struct KeyringService {
    storage: Arc<dyn StorageBackend>,
    master_keys: Arc<MasterKeyring>,
    cache: KeyCache,
    clock: Arc<dyn Clock>,
    storage_timeout: Option<Duration>,
}

impl KeyringService {
    /// Creates the service over its collaborators.
    pub fn new(
        storage: Arc<dyn StorageBackend>,
        master_keys: Arc<MasterKeyring>,
        cache: KeyCache,
        clock: Arc<dyn Clock>,
        storage_timeout: Option<Duration>,
    ) -> Self {
        Self {
            storage,
            master_keys,
            cache,
            clock,
            storage_timeout,
        }
    }

    /// Runs a storage call under the configured timeout.
    async fn storage_call<T>(
        &self,
        operation: &'static str,
        call: impl Future<Output = Result<T, StorageError>>,
    ) -> Result<T, VaultError> {
        let result = match self.storage_timeout {
            Some(limit) => tokio::time::timeout(limit, call).await.map_err(|_| {
                warn!(operation, timeout_ms = limit.as_millis() as u64, "Storage call timed out");
                VaultError::StorageUnavailable(format!("storage {operation} timed out"))
            })?,
            None => call.await,
        };

        result.map_err(|e| {
            warn!(operation, error = %e, "Storage call failed");
            VaultError::from(e)
        })
    }

    /// Generates a DEK, wraps it under the primary master key and stores it.
    ///
    /// Nothing is written until wrapping has succeeded, and the write is a
    /// single `put`; a call dropped before it completes leaves no record.
    pub async fn create_key(&self, keyring: &str) -> Result<DekMetadata, VaultError> {
        validate_keyring(keyring)?;

        let key_id = random::generate_id(DEK_ID_PREFIX);
        let key = SymmetricKey::generate();
        let wrapped = self
            .master_keys
            .wrap(&key, &wrap_context(keyring, &key_id))?;

        let record = DekRecord {
            id: key_id,
            keyring: keyring.to_string(),
            wrapped_key: wrapped.ciphertext,
            master_key_id: wrapped.master_key_id,
            algorithm: Algorithm::Aes256Gcm,
            created_at: self.clock.millis_since_epoch(),
        };

        let bytes = record.to_bytes().map_err(|e| {
            VaultError::StorageUnavailable(format!("failed to encode DEK record: {e}"))
        })?;

        self.storage_call("put", self.storage.put(&storage_key(keyring, &record.id), &bytes))
            .await?;

        info!(
            keyring = %keyring,
            key_id = %record.id,
            master_key_id = %record.master_key_id,
            "DEK created"
        );

        Ok(record.metadata())
    }

    /// Returns the unwrapped DEK `key_id` of `keyring`.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` for a malformed keyring name or key id
    /// - `KeyNotFound` if the DEK does not exist in this keyring, or its
    ///   master key is no longer configured
    /// - `DecryptionFailed` if the wrapped key fails authentication
    /// - `StorageUnavailable` if storage fails or times out
    pub async fn resolve(&self, keyring: &str, key_id: &str) -> Result<SymmetricKey, VaultError> {
        validate_keyring(keyring)?;
        validate_key_id(key_id)?;

        if let Some(key) = self.cache.get(keyring, key_id) {
            debug!(keyring = %keyring, key_id = %key_id, "DEK cache hit");
            return Ok(key);
        }

        let record = self.load(keyring, key_id).await?;
        let key = self
            .master_keys
            .unwrap(
                &record.wrapped_key,
                &record.master_key_id,
                &wrap_context(keyring, key_id),
            )
            .map_err(|e| {
                warn!(
                    keyring = %keyring,
                    key_id = %key_id,
                    master_key_id = %record.master_key_id,
                    kind = %e.kind(),
                    "Failed to unwrap DEK"
                );
                e
            })?;

        self.cache.put(keyring, key_id, key.clone());
        debug!(keyring = %keyring, key_id = %key_id, "DEK unwrapped and cached");

        Ok(key)
    }

    /// Returns the metadata of a DEK.
    pub async fn describe(&self, keyring: &str, key_id: &str) -> Result<DekMetadata, VaultError> {
        validate_keyring(keyring)?;
        validate_key_id(key_id)?;

        Ok(self.load(keyring, key_id).await?.metadata())
    }

    /// Lists the ids of every DEK in a keyring, sorted.
    pub async fn list(&self, keyring: &str) -> Result<Vec<String>, VaultError> {
        validate_keyring(keyring)?;

        let prefix = keyring_prefix(keyring);
        let keys = self.storage_call("list", self.storage.list(&prefix)).await?;

        let mut ids: Vec<String> = keys
            .iter()
            .filter_map(|k| k.strip_prefix(&prefix))
            .filter(|id| !id.contains('/'))
            .map(str::to_string)
            .collect();
        ids.sort();

        Ok(ids)
    }

    /// Fetches and checks the stored record of a DEK.
    async fn load(&self, keyring: &str, key_id: &str) -> Result<DekRecord, VaultError> {
        let bytes = self
            .storage_call("get", self.storage.get(&storage_key(keyring, key_id)))
            .await?
            .ok_or_else(|| VaultError::KeyNotFound(format!("{key_id} in keyring {keyring}")))?;

        let record = DekRecord::from_bytes(&bytes).map_err(|e| {
            warn!(keyring = %keyring, key_id = %key_id, error = %e, "Stored DEK record is corrupt");
            VaultError::DecryptionFailed
        })?;

        if record.keyring != keyring || record.id != key_id {
            warn!(
                keyring = %keyring,
                key_id = %key_id,
                "Stored DEK record belongs to another keyring"
            );
            return Err(VaultError::KeyNotFound(format!(
                "{key_id} in keyring {keyring}"
            )));
        }

        Ok(record)
    }

    /// Scrubs every cached DEK.
    pub fn clear_cache(&self) {
        self.cache.clear();
        debug!("DEK cache cleared");
    }

    /// Scrubs expired cached DEKs and returns how many were removed.
    pub fn evict_expired(&self) -> usize {
        self.cache.evict_expired()
    }

    /// Number of cached DEKs.
    pub fn cached_keys(&self) -> usize {
        self.cache.len()
    }
}

impl std::fmt::Debug for KeyringService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyringService")
            .field("master_keys", &self.master_keys)
            .field("cache", &self.cache)
            .field("storage_timeout", &self.storage_timeout)
            .finish_non_exhaustive()
    }
}

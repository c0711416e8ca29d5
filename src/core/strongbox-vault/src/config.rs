//! Vault configuration.
//!
//! [`VaultConfig`] bundles every collaborator the vault needs. It is checked
//! once by [`VaultService::new`](crate::VaultService::new), which refuses to
//! build a service from an invalid configuration.

use std::sync::Arc;
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use zeroize::Zeroizing;

use strongbox_crypto::MasterKey;
use strongbox_storage::StorageBackend;

use crate::clock::{Clock, SystemClock};
use crate::error::VaultError;

/// Default maximum number of cached DEKs.
pub const DEFAULT_CACHE_CAPACITY: usize = 10_000;

/// Default lifetime of a cached DEK.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(10 * 60);

/// Everything needed to build a [`VaultService`](crate::VaultService).
#[derive(Clone)]
pub struct VaultConfig {
    pub(crate) storage: Arc<dyn StorageBackend>,
    pub(crate) master_keys: Vec<MasterKey>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) cache_capacity: usize,
    pub(crate) cache_ttl: Duration,
    pub(crate) storage_timeout: Option<Duration>,
}

impl VaultConfig {
    /// Creates a configuration with default cache settings and the system clock.
    ///
    /// `master_keys` is ordered; the first key is the primary.
    pub fn new(storage: Arc<dyn StorageBackend>, master_keys: Vec<MasterKey>) -> Self {
        Self {
            storage,
            master_keys,
            clock: Arc::new(SystemClock),
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            cache_ttl: DEFAULT_CACHE_TTL,
            storage_timeout: None,
        }
    }

    /// Sets the time source.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Sets the maximum number of cached DEKs.
    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    /// Sets the lifetime of a cached DEK.
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Bounds every storage call; an expired call fails with `StorageUnavailable`.
    pub fn with_storage_timeout(mut self, timeout: Duration) -> Self {
        self.storage_timeout = Some(timeout);
        self
    }

    /// Checks the configuration.
    ///
    /// # Errors
    ///
    /// `ConfigurationError` if no master key is configured or a cache or
    /// timeout setting is zero. Duplicate master key ids are rejected when
    /// the keyring is built.
    pub fn validate(&self) -> Result<(), VaultError> {
        if self.master_keys.is_empty() {
            return Err(VaultError::ConfigurationError(
                "at least one master key is required".into(),
            ));
        }

        if self.cache_capacity == 0 {
            return Err(VaultError::ConfigurationError(
                "cache capacity must be greater than zero".into(),
            ));
        }

        if self.cache_ttl.is_zero() {
            return Err(VaultError::ConfigurationError(
                "cache ttl must be greater than zero".into(),
            ));
        }

        if self.storage_timeout.is_some_and(|t| t.is_zero()) {
            return Err(VaultError::ConfigurationError(
                "storage timeout must be greater than zero".into(),
            ));
        }

        Ok(())
    }
}

impl std::fmt::Debug for VaultConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultConfig")
            .field("master_keys", &self.master_keys)
            .field("cache_capacity", &self.cache_capacity)
            .field("cache_ttl", &self.cache_ttl)
            .field("storage_timeout", &self.storage_timeout)
            .finish_non_exhaustive()
    }
}

/// Builds master keys from raw byte strings, deriving each id from its key.
///
/// # Errors
///
/// `ConfigurationError` if the list is empty or an entry is not 32 bytes.
pub fn master_keys_from_bytes<K: AsRef<[u8]>>(keys: &[K]) -> Result<Vec<MasterKey>, VaultError> {
    if keys.is_empty() {
        return Err(VaultError::ConfigurationError(
            "at least one master key is required".into(),
        ));
    }

    keys.iter()
        .enumerate()
        .map(|(i, bytes)| {
            MasterKey::from_bytes(bytes.as_ref())
                .map_err(|e| VaultError::ConfigurationError(format!("master key #{i}: {e}")))
        })
        .collect()
}

/// Parses a master key list: comma-separated `base64` or `id:base64` entries.
///
/// The first entry is the primary. An entry without a label gets an id
/// derived from the key bytes.
///
/// # Errors
///
/// `ConfigurationError` for an empty list, an empty entry or label, invalid
/// base64, or a key that is not 32 bytes.
pub fn parse_master_keys(value: &str) -> Result<Vec<MasterKey>, VaultError> {
    if value.trim().is_empty() {
        return Err(VaultError::ConfigurationError(
            "at least one master key is required".into(),
        ));
    }

    value
        .split(',')
        .enumerate()
        .map(|(i, entry)| parse_entry(i, entry.trim()))
        .collect()
}

fn parse_entry(index: usize, entry: &str) -> Result<MasterKey, VaultError> {
    let invalid = |msg: String| VaultError::ConfigurationError(format!("master key #{index}: {msg}"));

    if entry.is_empty() {
        return Err(invalid("empty entry".into()));
    }

    let (label, encoded) = match entry.split_once(':') {
        Some((label, encoded)) => (Some(label.trim()), encoded.trim()),
        None => (None, entry),
    };

    let bytes = Zeroizing::new(
        BASE64
            .decode(encoded)
            .map_err(|_| invalid("invalid base64".into()))?,
    );

    match label {
        Some(label) => MasterKey::with_id(label, &bytes),
        None => MasterKey::from_bytes(&bytes),
    }
    .map_err(|e| invalid(e.to_string()))
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;
    use strongbox_storage::MemoryBackend;

    fn encoded(byte: u8) -> String {
        BASE64.encode([byte; 32])
    }

    fn config(keys: Vec<MasterKey>) -> VaultConfig {
        VaultConfig::new(Arc::new(MemoryBackend::new()), keys)
    }

    #[test]
    fn test_parse_single_key() {
        let keys = parse_master_keys(&encoded(1)).unwrap();

        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].as_bytes(), &[1u8; 32]);
        assert!(keys[0].id().starts_with("kek_"));
    }

    #[test]
    fn test_parse_labelled_and_ordered() {
        let value = format!("m2:{}, {}", encoded(2), encoded(1));
        let keys = parse_master_keys(&value).unwrap();

        assert_eq!(keys.len(), 2);
        assert_eq!(keys[0].id(), "m2");
        assert_eq!(keys[0].as_bytes(), &[2u8; 32]);
        assert_eq!(keys[1].as_bytes(), &[1u8; 32]);
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        let short = BASE64.encode([0u8; 16]);
        for bad in [
            String::new(),
            "   ".to_string(),
            "not base64!".to_string(),
            short,
            format!("{},", encoded(1)),
            format!(":{}", encoded(1)),
        ] {
            assert!(
                matches!(
                    parse_master_keys(&bad),
                    Err(VaultError::ConfigurationError(_))
                ),
                "{bad:?}"
            );
        }
    }

    #[test]
    fn test_parse_error_does_not_echo_key() {
        let value = "AAAA";
        let err = parse_master_keys(value).unwrap_err();
        assert!(!err.to_string().contains(value));
    }

    #[test]
    fn test_from_bytes() {
        let keys = master_keys_from_bytes(&[[1u8; 32], [2u8; 32]]).unwrap();
        assert_eq!(keys.len(), 2);

        let empty: [[u8; 32]; 0] = [];
        assert!(master_keys_from_bytes(&empty).is_err());

        let short = master_keys_from_bytes(&[vec![0u8; 31]]);
        assert!(matches!(short, Err(VaultError::ConfigurationError(_))));
    }

    #[test]
    fn test_defaults() {
        let config = config(master_keys_from_bytes(&[[1u8; 32]]).unwrap());

        assert_eq!(config.cache_capacity, DEFAULT_CACHE_CAPACITY);
        assert_eq!(config.cache_ttl, DEFAULT_CACHE_TTL);
        assert!(config.storage_timeout.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate() {
        let keys = || master_keys_from_bytes(&[[1u8; 32]]).unwrap();

        assert!(config(Vec::new()).validate().is_err());
        assert!(config(keys()).with_cache_capacity(0).validate().is_err());
        assert!(config(keys())
            .with_cache_ttl(Duration::ZERO)
            .validate()
            .is_err());
        assert!(config(keys())
            .with_storage_timeout(Duration::ZERO)
            .validate()
            .is_err());
    }

    #[test]
    fn test_debug_redacts_keys() {
        let config = config(master_keys_from_bytes(&[[0x42u8; 32]]).unwrap());
        let debug = format!("{config:?}");
        assert!(debug.contains("[REDACTED]"));
    }
}

//! Vault error types.

use serde::Serialize;
use thiserror::Error;

use strongbox_crypto::CryptoError;
use strongbox_storage::StorageError;

/// Errors returned by every vault operation.
///
/// Messages never include key material, plaintext, or wrapped key bytes.
#[derive(Debug, Error)]
pub enum VaultError {
    /// Malformed request: empty or invalid keyring name, unparseable envelope.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The referenced DEK or master key does not exist.
    #[error("key not found: {0}")]
    KeyNotFound(String),

    /// Authentication failed at the master-key or DEK tier.
    #[error("decryption failed")]
    DecryptionFailed,

    /// The storage backend failed or timed out. Safe for the caller to retry.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Invalid or missing master key configuration.
    #[error("configuration error: {0}")]
    ConfigurationError(String),
}

/// Discriminant of a [`VaultError`], for transport mapping and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// See [`VaultError::InvalidArgument`].
    InvalidArgument,
    /// See [`VaultError::KeyNotFound`].
    KeyNotFound,
    /// See [`VaultError::DecryptionFailed`].
    DecryptionFailed,
    /// See [`VaultError::StorageUnavailable`].
    StorageUnavailable,
    /// See [`VaultError::ConfigurationError`].
    ConfigurationError,
}

impl ErrorKind {
    /// Stable snake_case name of the kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidArgument => "invalid_argument",
            Self::KeyNotFound => "key_not_found",
            Self::DecryptionFailed => "decryption_failed",
            Self::StorageUnavailable => "storage_unavailable",
            Self::ConfigurationError => "configuration_error",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl VaultError {
    /// Returns the kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::KeyNotFound(_) => ErrorKind::KeyNotFound,
            Self::DecryptionFailed => ErrorKind::DecryptionFailed,
            Self::StorageUnavailable(_) => ErrorKind::StorageUnavailable,
            Self::ConfigurationError(_) => ErrorKind::ConfigurationError,
        }
    }

    /// Returns true if the caller may retry the same request unchanged.
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::StorageUnavailable(_))
    }
}

impl From<StorageError> for VaultError {
    fn from(e: StorageError) -> Self {
        VaultError::StorageUnavailable(e.to_string())
    }
}

impl From<CryptoError> for VaultError {
    fn from(e: CryptoError) -> Self {
        match e {
            CryptoError::DecryptionFailed => VaultError::DecryptionFailed,
            CryptoError::InvalidKey(msg) | CryptoError::KeyGenerationFailed(msg) => {
                VaultError::ConfigurationError(msg)
            },
            CryptoError::InvalidInput(msg) | CryptoError::EncryptionFailed(msg) => {
                VaultError::InvalidArgument(msg)
            },
        }
    }
}

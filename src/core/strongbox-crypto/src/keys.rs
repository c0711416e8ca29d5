//! Secure key types with automatic memory zeroization.
//!
//! All key types implement `Zeroize` and `ZeroizeOnDrop` to ensure
//! sensitive key material is securely erased from memory when no longer needed.

use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::aead::KEY_SIZE;
use crate::error::CryptoError;
use crate::kdf::key_fingerprint;
use crate::random::generate_key;

/// Prefix of derived master key identifiers.
pub const MASTER_KEY_ID_PREFIX: &str = "kek";

fn copy_key(bytes: &[u8]) -> Result<[u8; KEY_SIZE], CryptoError> {
    if bytes.len() != KEY_SIZE {
        return Err(CryptoError::InvalidKey(format!(
            "expected {} bytes, got {}",
            KEY_SIZE,
            bytes.len()
        )));
    }

    let mut key_bytes = [0u8; KEY_SIZE];
    key_bytes.copy_from_slice(bytes);
    Ok(key_bytes)
}

/// A 256-bit symmetric encryption key with automatic zeroization.
///
/// Used for data-encryption keys once they have been unwrapped.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SymmetricKey {
    bytes: [u8; KEY_SIZE],
}

impl SymmetricKey {
    /// Generates a new random symmetric key.
    pub fn generate() -> Self {
        let key = generate_key();
        Self { bytes: *key }
    }

    /// Creates a symmetric key from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is not exactly 32 bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        Ok(Self {
            bytes: copy_key(bytes)?,
        })
    }

    /// Returns the raw key bytes.
    ///
    /// Use with caution - the returned slice is not zeroized automatically.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl std::fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SymmetricKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// A master key (KEK) used only to wrap and unwrap data-encryption keys.
///
/// Every master key carries a stable identifier that is recorded next to each
/// key it wraps, so the matching key can be found again after rotation.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct MasterKey {
    #[zeroize(skip)]
    id: String,
    bytes: [u8; KEY_SIZE],
}

impl MasterKey {
    /// Generates a new random master key with a derived identifier.
    pub fn generate() -> Result<Self, CryptoError> {
        let key = generate_key();
        Self::from_bytes(&*key)
    }

    /// Creates a master key from raw bytes, deriving its identifier from the
    /// key content.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is not exactly 32 bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let bytes = copy_key(bytes)?;
        let id = key_fingerprint(MASTER_KEY_ID_PREFIX, &bytes)?;
        Ok(Self { id, bytes })
    }

    /// Creates a master key from raw bytes with an explicit label.
    ///
    /// # Errors
    ///
    /// Returns an error if the label is empty or the input is not exactly 32 bytes.
    pub fn with_id(id: impl Into<String>, bytes: &[u8]) -> Result<Self, CryptoError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(CryptoError::InvalidInput(
                "master key id cannot be empty".to_string(),
            ));
        }

        Ok(Self {
            id,
            bytes: copy_key(bytes)?,
        })
    }

    /// Returns the master key identifier.
    #[inline]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the raw key bytes.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MasterKey")
            .field("id", &self.id)
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;

    #[test]
    fn test_symmetric_key_from_bytes() {
        let bytes = [0x42u8; KEY_SIZE];
        let key = SymmetricKey::from_bytes(&bytes).unwrap();
        assert_eq!(key.as_bytes(), &bytes);
    }

    #[test]
    fn test_symmetric_key_invalid_length() {
        let result = SymmetricKey::from_bytes(&[0u8; 16]);
        assert!(matches!(result, Err(CryptoError::InvalidKey(_))));
    }

    #[test]
    fn test_symmetric_key_debug_redacted() {
        let key = SymmetricKey::from_bytes(&[0x42u8; KEY_SIZE]).unwrap();
        let debug_str = format!("{:?}", key);
        assert!(debug_str.contains("[REDACTED]"));
        assert!(!debug_str.contains("66"));
    }

    #[test]
    fn test_symmetric_key_zeroize() {
        let mut key = SymmetricKey::from_bytes(&[0x42u8; KEY_SIZE]).unwrap();
        key.zeroize();
        assert_eq!(key.as_bytes(), &[0u8; KEY_SIZE]);
    }

    #[test]
    fn test_master_key_derived_id_is_stable() {
        let bytes = [0x42u8; KEY_SIZE];
        let a = MasterKey::from_bytes(&bytes).unwrap();
        let b = MasterKey::from_bytes(&bytes).unwrap();

        assert!(a.id().starts_with("kek_"));
        assert_eq!(a.id(), b.id());
    }

    #[test]
    fn test_master_key_generate_unique() {
        let a = MasterKey::generate().unwrap();
        let b = MasterKey::generate().unwrap();
        assert_ne!(a.id(), b.id());
        assert_ne!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn test_master_key_with_id() {
        let key = MasterKey::with_id("primary-2024", &[7u8; KEY_SIZE]).unwrap();
        assert_eq!(key.id(), "primary-2024");

        let result = MasterKey::with_id("  ", &[7u8; KEY_SIZE]);
        assert!(matches!(result, Err(CryptoError::InvalidInput(_))));
    }

    #[test]
    fn test_master_key_invalid_length() {
        let result = MasterKey::from_bytes(&[0u8; 31]);
        assert!(matches!(result, Err(CryptoError::InvalidKey(_))));
    }

    #[test]
    fn test_master_key_debug_redacted() {
        let key = MasterKey::generate().unwrap();
        let debug_str = format!("{:?}", key);
        assert!(debug_str.contains("[REDACTED]"));
        assert!(debug_str.contains(key.id()));
    }
}

//! Master keyring (KEK tier).
//!
//! Holds the operator-supplied master keys. The first key is the primary and
//! is the only one used for new wraps; every configured key remains available
//! for unwrap, looked up by id.
//!
//! The key set is an immutable snapshot behind a single pointer. Rotation
//! builds a new snapshot and swaps it in, so a concurrent `wrap` sees either
//! the old or the new primary and never a partial update.

use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, info};

use strongbox_crypto::{aead, MasterKey, SymmetricKey};

use crate::error::VaultError;

/// A DEK sealed under a master key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrappedKey {
    /// `nonce || ciphertext || tag` of the DEK.
    pub ciphertext: Vec<u8>,
    /// Id of the master key that sealed it.
    pub master_key_id: String,
}

#[derive(Debug)]
struct Snapshot {
    keys: Vec<MasterKey>,
}

impl Snapshot {
    fn new(keys: Vec<MasterKey>) -> Result<Self, VaultError> {
        if keys.is_empty() {
            return Err(VaultError::ConfigurationError(
                "at least one master key is required".into(),
            ));
        }

        for (i, key) in keys.iter().enumerate() {
            if keys[..i].iter().any(|k| k.id() == key.id()) {
                return Err(VaultError::ConfigurationError(format!(
                    "duplicate master key id: {}",
                    key.id()
                )));
            }
        }

        Ok(Self { keys })
    }

    fn primary(&self) -> Option<&MasterKey> {
        self.keys.first()
    }

    fn find(&self, id: &str) -> Option<&MasterKey> {
        self.keys.iter().find(|k| k.id() == id)
    }
}

/// The set of configured master keys.
#[derive(Debug)]
pub struct MasterKeyring {
    current: RwLock<Arc<Snapshot>>,
}

impl MasterKeyring {
    /// Creates a keyring; the first key becomes the primary.
    ///
    /// # Errors
    ///
    /// `ConfigurationError` if `keys` is empty or two keys share an id.
    pub fn new(keys: Vec<MasterKey>) -> Result<Self, VaultError> {
        let snapshot = Snapshot::new(keys)?;

        info!(
            primary = snapshot.primary().map(MasterKey::id).unwrap_or_default(),
            count = snapshot.keys.len(),
            "Master keyring loaded"
        );

        Ok(Self {
            current: RwLock::new(Arc::new(snapshot)),
        })
    }

    fn snapshot(&self) -> Arc<Snapshot> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Returns the id of the current primary key.
    pub fn primary_id(&self) -> Option<String> {
        self.snapshot().primary().map(|k| k.id().to_string())
    }

    /// Returns the ids of all configured keys, primary first.
    pub fn key_ids(&self) -> Vec<String> {
        self.snapshot()
            .keys
            .iter()
            .map(|k| k.id().to_string())
            .collect()
    }

    /// Number of configured keys.
    pub fn len(&self) -> usize {
        self.snapshot().keys.len()
    }

    /// Always false: a keyring is never constructed empty.
    pub fn is_empty(&self) -> bool {
        self.snapshot().keys.is_empty()
    }

    /// Seals `key` under the primary master key with a fresh random nonce.
    ///
    /// `context` is bound as associated data and must be supplied again to
    /// [`unwrap`](Self::unwrap).
    pub fn wrap(&self, key: &SymmetricKey, context: &[u8]) -> Result<WrappedKey, VaultError> {
        let snapshot = self.snapshot();
        let primary = snapshot.primary().ok_or_else(|| {
            VaultError::ConfigurationError("no primary master key configured".into())
        })?;

        let ciphertext = aead::encrypt(primary.as_bytes(), key.as_bytes(), Some(context))?;

        Ok(WrappedKey {
            ciphertext,
            master_key_id: primary.id().to_string(),
        })
    }

    /// Opens a wrapped DEK with the master key named by `master_key_id`.
    ///
    /// # Errors
    ///
    /// - `KeyNotFound` if no configured master key has that id
    /// - `DecryptionFailed` if authentication fails
    pub fn unwrap(
        &self,
        wrapped: &[u8],
        master_key_id: &str,
        context: &[u8],
    ) -> Result<SymmetricKey, VaultError> {
        let snapshot = self.snapshot();
        let master = snapshot
            .find(master_key_id)
            .ok_or_else(|| VaultError::KeyNotFound(format!("master key {master_key_id}")))?;

        let plaintext = aead::decrypt(master.as_bytes(), wrapped, Some(context))?;

        SymmetricKey::from_bytes(&plaintext).map_err(|_| VaultError::DecryptionFailed)
    }

    /// Makes `new_primary` the primary key.
    ///
    /// A new id is prepended; a known id is promoted to the front. Every other
    /// key stays available for unwrap.
    ///
    /// # Errors
    ///
    /// `ConfigurationError` if the id is already configured with different bytes.
    pub fn rotate(&self, new_primary: MasterKey) -> Result<(), VaultError> {
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);

        if let Some(existing) = current.find(new_primary.id()) {
            if existing.as_bytes() != new_primary.as_bytes() {
                return Err(VaultError::ConfigurationError(format!(
                    "master key id {} is already configured with different key material",
                    new_primary.id()
                )));
            }
        }

        let new_id = new_primary.id().to_string();
        let mut keys = Vec::with_capacity(current.keys.len() + 1);
        keys.push(new_primary);
        keys.extend(current.keys.iter().filter(|k| k.id() != new_id).cloned());

        *current = Arc::new(Snapshot::new(keys)?);

        debug!(count = current.keys.len(), "Master keyring snapshot swapped");
        info!(primary = %new_id, "Master key rotated");

        Ok(())
    }
}

//! The vault service: the operations exposed to transports.

use std::sync::Arc;

use tracing::{debug, info, instrument};
use zeroize::Zeroizing;

use strongbox_crypto::{aead, random, MasterKey, SymmetricKey};

use crate::cache::KeyCache;
use crate::config::VaultConfig;
use crate::envelope::Envelope;
use crate::error::VaultError;
use crate::keyring::{validate_key_id, validate_keyring, KeyringService};
use crate::master_keys::MasterKeyring;
use crate::proto::{
    CreateDekRequest, CreateDekResponse, DecryptRequest, DecryptResponse, EncryptBulkRequest,
    EncryptBulkResponse, EncryptRequest, EncryptResponse, LivenessResponse, ReEncryptRequest,
    ReEncryptResponse,
};
use crate::record::DekMetadata;

/// Envelope-encryption vault.
///
/// Safe to share across tasks behind an `Arc`; every operation takes `&self`.
#[derive(Debug)]
pub struct VaultService {
    master_keys: Arc<MasterKeyring>,
    keyring: KeyringService,
}

impl VaultService {
    /// Builds a vault from a validated configuration.
    ///
    /// # Errors
    ///
    /// `ConfigurationError` if the configuration is invalid.
    pub fn new(config: VaultConfig) -> Result<Self, VaultError> {
        config.validate()?;

        let master_keys = Arc::new(MasterKeyring::new(config.master_keys)?);
        let cache = KeyCache::new(config.cache_capacity, config.cache_ttl, config.clock.clone());
        let keyring = KeyringService::new(
            config.storage,
            master_keys.clone(),
            cache,
            config.clock,
            config.storage_timeout,
        );

        info!(
            cache_capacity = config.cache_capacity,
            cache_ttl_secs = config.cache_ttl.as_secs(),
            "Vault service initialized"
        );

        Ok(Self {
            master_keys,
            keyring,
        })
    }

    // ========================================================================
    // DEK Operations
    // ========================================================================

    /// Creates a new DEK in a keyring and returns its id.
    ///
    /// Every call creates an independent key; there is no "current" DEK.
    #[instrument(skip_all, fields(keyring = %request.keyring))]
    pub async fn create_dek(
        &self,
        request: CreateDekRequest,
    ) -> Result<CreateDekResponse, VaultError> {
        let meta = self.keyring.create_key(&request.keyring).await?;
        Ok(CreateDekResponse { key_id: meta.id })
    }

    /// Returns the metadata of a DEK. Key material is never included.
    #[instrument(skip(self))]
    pub async fn describe_dek(&self, keyring: &str, key_id: &str) -> Result<DekMetadata, VaultError> {
        self.keyring.describe(keyring, key_id).await
    }

    /// Lists the DEK ids of a keyring.
    #[instrument(skip(self))]
    pub async fn list_deks(&self, keyring: &str) -> Result<Vec<String>, VaultError> {
        self.keyring.list(keyring).await
    }

    // ========================================================================
    // Encryption/Decryption Operations
    // ========================================================================

    /// Encrypts a payload under an explicitly chosen DEK.
    ///
    /// Two calls with the same input yield different envelopes.
    #[instrument(skip_all, fields(keyring = %request.keyring, key_id = %request.key_id))]
    pub async fn encrypt(&self, request: EncryptRequest) -> Result<EncryptResponse, VaultError> {
        let key = self.keyring.resolve(&request.keyring, &request.key_id).await?;
        let envelope = seal(
            &key,
            &request.keyring,
            &request.key_id,
            &request.plaintext,
            &request.associated_data,
        )?;

        Ok(EncryptResponse {
            envelope,
            key_id: request.key_id,
        })
    }

    /// Encrypts several payloads under one DEK, each with its own nonce.
    #[instrument(
        skip_all,
        fields(keyring = %request.keyring, key_id = %request.key_id, count = request.plaintexts.len())
    )]
    pub async fn encrypt_bulk(
        &self,
        request: EncryptBulkRequest,
    ) -> Result<EncryptBulkResponse, VaultError> {
        let key = self.keyring.resolve(&request.keyring, &request.key_id).await?;

        let envelopes = request
            .plaintexts
            .iter()
            .map(|plaintext| {
                seal(
                    &key,
                    &request.keyring,
                    &request.key_id,
                    plaintext,
                    &request.associated_data,
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(EncryptBulkResponse { envelopes })
    }

    /// Decrypts an envelope.
    ///
    /// Any tampering with the envelope, the keyring name or the associated
    /// data fails with `DecryptionFailed`; no partial plaintext is returned.
    #[instrument(skip_all, fields(keyring = %request.keyring))]
    pub async fn decrypt(&self, request: DecryptRequest) -> Result<DecryptResponse, VaultError> {
        validate_keyring(&request.keyring)?;
        let envelope = Envelope::parse(&request.envelope)?;
        debug!(key_id = %envelope.key_id(), "Envelope parsed");

        let key = self.keyring.resolve(&request.keyring, envelope.key_id()).await?;
        let plaintext = open(&key, &request.keyring, &envelope, &request.associated_data)?;

        Ok(DecryptResponse { plaintext })
    }

    /// Decrypts an envelope and encrypts its payload under `target_key_id`.
    ///
    /// The plaintext never leaves the service.
    #[instrument(
        skip_all,
        fields(keyring = %request.keyring, target_key_id = %request.target_key_id)
    )]
    pub async fn reencrypt(
        &self,
        request: ReEncryptRequest,
    ) -> Result<ReEncryptResponse, VaultError> {
        validate_keyring(&request.keyring)?;
        validate_key_id(&request.target_key_id)?;
        let envelope = Envelope::parse(&request.envelope)?;

        let source = self.keyring.resolve(&request.keyring, envelope.key_id()).await?;
        let plaintext = open(&source, &request.keyring, &envelope, &request.associated_data)?;

        let target = self
            .keyring
            .resolve(&request.keyring, &request.target_key_id)
            .await?;
        let envelope = seal(
            &target,
            &request.keyring,
            &request.target_key_id,
            &plaintext,
            &request.associated_data,
        )?;

        Ok(ReEncryptResponse {
            envelope,
            key_id: request.target_key_id,
        })
    }

    // ========================================================================
    // Operational
    // ========================================================================

    /// Makes `key` the primary master key for new DEKs.
    ///
    /// Existing DEKs keep unwrapping with the master key that wrapped them.
    pub fn rotate_master_key(&self, key: MasterKey) -> Result<(), VaultError> {
        self.master_keys.rotate(key)
    }

    /// Cheap health probe.
    pub fn liveness(&self) -> LivenessResponse {
        LivenessResponse {
            status: "ok",
            primary_master_key_id: self.master_keys.primary_id().unwrap_or_default(),
            master_key_count: self.master_keys.len(),
        }
    }

    /// Scrubs every cached DEK.
    pub fn clear_cache(&self) {
        self.keyring.clear_cache();
    }

    /// Scrubs expired cached DEKs and returns how many were removed.
    pub fn evict_expired(&self) -> usize {
        self.keyring.evict_expired()
    }

    /// Number of DEKs currently cached.
    pub fn cached_keys(&self) -> usize {
        self.keyring.cached_keys()
    }
}

fn seal(
    key: &SymmetricKey,
    keyring: &str,
    key_id: &str,
    plaintext: &[u8],
    associated_data: &[u8],
) -> Result<Vec<u8>, VaultError> {
    let nonce = random::generate_nonce();
    let aad = Envelope::associated_data(key_id, keyring, associated_data)?;
    let ciphertext = aead::seal(key.as_bytes(), &nonce, plaintext, Some(&aad))?;

    Ok(Envelope::new(key_id, nonce, ciphertext)?.encode())
}

fn open(
    key: &SymmetricKey,
    keyring: &str,
    envelope: &Envelope,
    associated_data: &[u8],
) -> Result<Zeroizing<Vec<u8>>, VaultError> {
    let aad = Envelope::associated_data(envelope.key_id(), keyring, associated_data)?;

    aead::open(key.as_bytes(), envelope.nonce(), envelope.ciphertext(), Some(&aad))
        .map_err(|_| VaultError::DecryptionFailed)
}

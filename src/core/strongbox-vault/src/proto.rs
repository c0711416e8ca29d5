//! Request and response types of the vault service, version 1.
//!
//! These are the transport-agnostic data-transfer types at the service
//! boundary. Wire encoding (JSON, base64 for bytes) belongs to the transport.

use zeroize::Zeroizing;

/// Create a new DEK in a keyring.
#[derive(Debug, Clone)]
pub struct CreateDekRequest {
    /// Keyring name.
    pub keyring: String,
}

/// Result of [`CreateDekRequest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateDekResponse {
    /// Id of the new DEK. Key material is never returned.
    pub key_id: String,
}

/// Encrypt one payload under an existing DEK.
#[derive(Debug, Clone)]
pub struct EncryptRequest {
    /// Keyring name.
    pub keyring: String,
    /// DEK to encrypt with.
    pub key_id: String,
    /// Data to encrypt.
    pub plaintext: Vec<u8>,
    /// Authenticated, unencrypted context. Must be repeated on decrypt.
    pub associated_data: Vec<u8>,
}

/// Result of [`EncryptRequest`].
#[derive(Debug, Clone)]
pub struct EncryptResponse {
    /// Self-describing ciphertext envelope.
    pub envelope: Vec<u8>,
    /// DEK the envelope was sealed with.
    pub key_id: String,
}

/// Encrypt several payloads under the same DEK.
#[derive(Debug, Clone)]
pub struct EncryptBulkRequest {
    /// Keyring name.
    pub keyring: String,
    /// DEK to encrypt with.
    pub key_id: String,
    /// Payloads, each sealed with its own nonce.
    pub plaintexts: Vec<Vec<u8>>,
    /// Associated data shared by every payload.
    pub associated_data: Vec<u8>,
}

/// Result of [`EncryptBulkRequest`].
#[derive(Debug, Clone)]
pub struct EncryptBulkResponse {
    /// Envelopes in request order.
    pub envelopes: Vec<Vec<u8>>,
}

/// Decrypt an envelope.
#[derive(Debug, Clone)]
pub struct DecryptRequest {
    /// Keyring the envelope's DEK belongs to.
    pub keyring: String,
    /// Envelope produced by encrypt.
    pub envelope: Vec<u8>,
    /// Associated data given at encryption time.
    pub associated_data: Vec<u8>,
}

/// Result of [`DecryptRequest`].
#[derive(Debug, Clone)]
pub struct DecryptResponse {
    /// Recovered plaintext, zeroized on drop.
    pub plaintext: Zeroizing<Vec<u8>>,
}

/// Decrypt an envelope and encrypt the payload again under another DEK.
#[derive(Debug, Clone)]
pub struct ReEncryptRequest {
    /// Keyring of both DEKs.
    pub keyring: String,
    /// Envelope to re-encrypt.
    pub envelope: Vec<u8>,
    /// Associated data, kept for the new envelope.
    pub associated_data: Vec<u8>,
    /// DEK to encrypt with.
    pub target_key_id: String,
}

/// Result of [`ReEncryptRequest`].
#[derive(Debug, Clone)]
pub struct ReEncryptResponse {
    /// New envelope.
    pub envelope: Vec<u8>,
    /// DEK the new envelope was sealed with.
    pub key_id: String,
}

/// Health information.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct LivenessResponse {
    /// Always `"ok"` when the service answers.
    pub status: &'static str,
    /// Id of the master key used for new wraps.
    pub primary_master_key_id: String,
    /// Number of master keys available for unwrap.
    pub master_key_count: usize,
}

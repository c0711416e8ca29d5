//! AES-256-GCM authenticated encryption.
//!
//! Provides authenticated encryption with associated data (AEAD) using AES-256-GCM.
//! It is used at both tiers of the vault: master keys wrap data-encryption keys,
//! and data-encryption keys seal caller plaintext.

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};
use zeroize::Zeroizing;

use crate::error::CryptoError;
use crate::random::generate_nonce;

/// Size of an AES-256 key in bytes.
pub const KEY_SIZE: usize = 32;

/// Size of a GCM nonce in bytes.
pub const NONCE_SIZE: usize = 12;

/// Size of a GCM authentication tag in bytes.
pub const TAG_SIZE: usize = 16;

fn cipher(key: &[u8]) -> Result<Aes256Gcm, CryptoError> {
    if key.len() != KEY_SIZE {
        return Err(CryptoError::InvalidKey(format!(
            "expected {} bytes, got {}",
            KEY_SIZE,
            key.len()
        )));
    }

    Aes256Gcm::new_from_slice(key).map_err(|e| CryptoError::InvalidKey(e.to_string()))
}

/// Encrypts plaintext using AES-256-GCM.
///
/// The nonce is automatically generated and prepended to the ciphertext.
/// Format: `nonce (12 bytes) || ciphertext || tag (16 bytes)`
///
/// # Arguments
///
/// * `key` - 32-byte encryption key
/// * `plaintext` - Data to encrypt
/// * `associated_data` - Optional additional data to authenticate (not encrypted)
///
/// # Returns
///
/// Ciphertext with prepended nonce and appended authentication tag.
pub fn encrypt(
    key: &[u8],
    plaintext: &[u8],
    associated_data: Option<&[u8]>,
) -> Result<Vec<u8>, CryptoError> {
    let nonce = generate_nonce();
    let sealed = seal(key, &nonce, plaintext, associated_data)?;

    let mut result = Vec::with_capacity(NONCE_SIZE + sealed.len());
    result.extend_from_slice(&nonce);
    result.extend_from_slice(&sealed);

    Ok(result)
}

/// Decrypts ciphertext using AES-256-GCM.
///
/// Expects the nonce to be prepended to the ciphertext (as produced by `encrypt`).
///
/// # Arguments
///
/// * `key` - 32-byte encryption key
/// * `ciphertext` - Data to decrypt (nonce || ciphertext || tag)
/// * `associated_data` - Optional additional data that was authenticated
///
/// # Returns
///
/// Decrypted plaintext wrapped in `Zeroizing` for automatic memory cleanup.
pub fn decrypt(
    key: &[u8],
    ciphertext: &[u8],
    associated_data: Option<&[u8]>,
) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    if ciphertext.len() < NONCE_SIZE + TAG_SIZE {
        return Err(CryptoError::DecryptionFailed);
    }

    let (nonce, sealed) = ciphertext.split_at(NONCE_SIZE);
    let mut nonce_bytes = [0u8; NONCE_SIZE];
    nonce_bytes.copy_from_slice(nonce);

    open(key, &nonce_bytes, sealed, associated_data)
}

/// Seals plaintext under a caller-supplied nonce.
///
/// Returns `ciphertext || tag`. The nonce must never be reused with the same key.
pub fn seal(
    key: &[u8],
    nonce: &[u8; NONCE_SIZE],
    plaintext: &[u8],
    associated_data: Option<&[u8]>,
) -> Result<Vec<u8>, CryptoError> {
    let cipher = cipher(key)?;

    cipher
        .encrypt(
            Nonce::from_slice(nonce),
            Payload {
                msg: plaintext,
                aad: associated_data.unwrap_or_default(),
            },
        )
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))
}

/// Opens `ciphertext || tag` sealed under `nonce`.
///
/// Any tag mismatch yields [`CryptoError::DecryptionFailed`]; no partial
/// plaintext is ever returned.
pub fn open(
    key: &[u8],
    nonce: &[u8; NONCE_SIZE],
    ciphertext: &[u8],
    associated_data: Option<&[u8]>,
) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    let cipher = cipher(key)?;

    if ciphertext.len() < TAG_SIZE {
        return Err(CryptoError::DecryptionFailed);
    }

    let plaintext = cipher
        .decrypt(
            Nonce::from_slice(nonce),
            Payload {
                msg: ciphertext,
                aad: associated_data.unwrap_or_default(),
            },
        )
        .map_err(|_| CryptoError::DecryptionFailed)?;

    Ok(Zeroizing::new(plaintext))
}

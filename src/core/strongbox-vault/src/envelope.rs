//! Ciphertext envelope framing.
//!
//! ```text
//! +---------+------------+----------------+-----------+---------------------+
//! | version | key id len |     key id     |   nonce   |  ciphertext || tag  |
//! | 1 byte  |   1 byte   | 1..=255 bytes  | 12 bytes  |     >= 16 bytes     |
//! +---------+------------+----------------+-----------+---------------------+
//! ```
//!
//! The envelope is self-describing: decryption needs nothing beyond it, the
//! keyring name and the caller's associated data. The header, the keyring
//! name and the caller's associated data are all authenticated.

use strongbox_crypto::aead::{NONCE_SIZE, TAG_SIZE};

use crate::error::VaultError;

/// Envelope format version 1: AES-256-GCM under a DEK.
pub const ENVELOPE_V1: u8 = 0x01;

/// Longest key id an envelope can carry.
pub const MAX_KEY_ID_LEN: usize = u8::MAX as usize;

/// A parsed ciphertext envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    key_id: String,
    nonce: [u8; NONCE_SIZE],
    ciphertext: Vec<u8>,
}

impl Envelope {
    /// Builds an envelope from its parts.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if the key id is empty or longer than 255 bytes.
    pub fn new(
        key_id: impl Into<String>,
        nonce: [u8; NONCE_SIZE],
        ciphertext: Vec<u8>,
    ) -> Result<Self, VaultError> {
        let key_id = key_id.into();
        check_key_id(&key_id)?;

        Ok(Self {
            key_id,
            nonce,
            ciphertext,
        })
    }

    /// Id of the DEK that sealed the payload.
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// Nonce used for the payload.
    pub fn nonce(&self) -> &[u8; NONCE_SIZE] {
        &self.nonce
    }

    /// `ciphertext || tag`.
    pub fn ciphertext(&self) -> &[u8] {
        &self.ciphertext
    }

    /// The authenticated header: version, key id length, key id.
    fn header(key_id: &str) -> Vec<u8> {
        let mut header = Vec::with_capacity(2 + key_id.len());
        header.push(ENVELOPE_V1);
        header.push(key_id.len() as u8);
        header.extend_from_slice(key_id.as_bytes());
        header
    }

    /// Serializes the envelope.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Self::header(&self.key_id);
        out.reserve(NONCE_SIZE + self.ciphertext.len());
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&self.ciphertext);
        out
    }

    /// Parses an envelope.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` for an empty input, unknown version, bad key id or
    ///   missing nonce
    /// - `DecryptionFailed` if the payload is shorter than an authentication tag
    pub fn parse(bytes: &[u8]) -> Result<Self, VaultError> {
        let (&version, rest) = bytes
            .split_first()
            .ok_or_else(|| VaultError::InvalidArgument("empty envelope".into()))?;

        if version != ENVELOPE_V1 {
            return Err(VaultError::InvalidArgument(format!(
                "unsupported envelope version {version}"
            )));
        }

        let (&key_id_len, rest) = rest
            .split_first()
            .ok_or_else(|| VaultError::InvalidArgument("truncated envelope header".into()))?;
        let key_id_len = key_id_len as usize;

        if key_id_len == 0 || rest.len() < key_id_len + NONCE_SIZE {
            return Err(VaultError::InvalidArgument(
                "truncated envelope header".into(),
            ));
        }

        let (key_id, rest) = rest.split_at(key_id_len);
        let key_id = std::str::from_utf8(key_id)
            .map_err(|_| VaultError::InvalidArgument("envelope key id is not UTF-8".into()))?;

        let (nonce, ciphertext) = rest.split_at(NONCE_SIZE);
        if ciphertext.len() < TAG_SIZE {
            return Err(VaultError::DecryptionFailed);
        }

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        nonce_bytes.copy_from_slice(nonce);

        Self::new(key_id, nonce_bytes, ciphertext.to_vec())
    }

    /// Associated data the payload is sealed with.
    ///
    /// Each part is length-prefixed so distinct `(keyring, aad)` pairs can
    /// never encode to the same bytes.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if the key id is empty or longer than 255 bytes.
    pub(crate) fn associated_data(
        key_id: &str,
        keyring: &str,
        caller_aad: &[u8],
    ) -> Result<Vec<u8>, VaultError> {
        check_key_id(key_id)?;
        let header = Self::header(key_id);
        let parts: [&[u8]; 3] = [&header, keyring.as_bytes(), caller_aad];

        let mut out = Vec::with_capacity(parts.iter().map(|p| 4 + p.len()).sum());
        for part in parts {
            out.extend_from_slice(&(part.len() as u32).to_be_bytes());
            out.extend_from_slice(part);
        }
        Ok(out)
    }
}

fn check_key_id(key_id: &str) -> Result<(), VaultError> {
    if key_id.is_empty() || key_id.len() > MAX_KEY_ID_LEN {
        return Err(VaultError::InvalidArgument(
            "key id must be 1..=255 bytes".into(),
        ));
    }
    Ok(())
}

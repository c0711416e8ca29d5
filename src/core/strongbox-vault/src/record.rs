//! Persisted DEK records.
//!
//! A record is written once by `create_dek` and never modified. It holds the
//! DEK only in wrapped form, together with the id of the master key that
//! wrapped it.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Prefix of every DEK storage key.
const KEYRING_PREFIX: &str = "keyring";

/// Content encryption algorithm of a DEK.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Algorithm {
    /// AES-256-GCM with 96-bit random nonces.
    #[default]
    #[serde(rename = "aes256-gcm")]
    Aes256Gcm,
}

impl std::fmt::Display for Algorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Aes256Gcm => write!(f, "aes256-gcm"),
        }
    }
}

/// A wrapped DEK as stored in the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DekRecord {
    /// Key id (`dek_` + 128 random bits in hex).
    pub id: String,
    /// Keyring the DEK belongs to.
    pub keyring: String,
    /// DEK sealed under the master key.
    #[serde(serialize_with = "to_base64", deserialize_with = "from_base64")]
    pub wrapped_key: Vec<u8>,
    /// Id of the master key used for wrapping.
    pub master_key_id: String,
    /// Algorithm the DEK is used with.
    pub algorithm: Algorithm,
    /// Creation time, milliseconds since the UNIX epoch.
    pub created_at: u64,
}

impl DekRecord {
    /// Serializes the record for storage.
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Parses a stored record.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    /// Returns the record's public metadata.
    pub fn metadata(&self) -> DekMetadata {
        DekMetadata {
            id: self.id.clone(),
            keyring: self.keyring.clone(),
            master_key_id: self.master_key_id.clone(),
            algorithm: self.algorithm,
            created_at: self.created_at,
        }
    }
}

/// Everything about a DEK except key material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DekMetadata {
    /// Key id.
    pub id: String,
    /// Owning keyring.
    pub keyring: String,
    /// Master key that wrapped the DEK.
    pub master_key_id: String,
    /// Content encryption algorithm.
    pub algorithm: Algorithm,
    /// Creation time, milliseconds since the UNIX epoch.
    pub created_at: u64,
}

/// Storage key of a DEK record: `keyring/{keyring}/{key_id}`.
pub fn storage_key(keyring: &str, key_id: &str) -> String {
    format!("{}{}", keyring_prefix(keyring), key_id)
}

/// Storage prefix of every DEK in a keyring.
pub fn keyring_prefix(keyring: &str) -> String {
    format!("{KEYRING_PREFIX}/{keyring}/")
}

fn to_base64<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&BASE64.encode(bytes))
}

fn from_base64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
    let encoded = String::deserialize(deserializer)?;
    BASE64.decode(encoded).map_err(serde::de::Error::custom)
}

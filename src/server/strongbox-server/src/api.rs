//! HTTP JSON API, version 1.
//!
//! Byte fields (plaintexts, envelopes, associated data) cross the wire as
//! standard base64. Associated data may be omitted and defaults to empty.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::Json;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};

use strongbox_vault::proto::{
    CreateDekRequest, DecryptRequest, EncryptBulkRequest, EncryptRequest, LivenessResponse,
    ReEncryptRequest,
};
use strongbox_vault::{DekMetadata, VaultError, VaultService};

use crate::error::ApiError;

/// Shared handler state.
pub type AppState = Arc<VaultService>;

// ============================================================================
// Wire Types
// ============================================================================

/// `POST /v1/vault/create-dek` body.
#[derive(Debug, Serialize, Deserialize)]
pub struct CreateDekBody {
    /// Keyring name.
    pub keyring: String,
}

/// `POST /v1/vault/create-dek` response.
#[derive(Debug, Serialize, Deserialize)]
pub struct CreateDekReply {
    /// Id of the new DEK.
    pub key_id: String,
}

/// `POST /v1/vault/encrypt` body.
#[derive(Debug, Serialize, Deserialize)]
pub struct EncryptBody {
    /// Keyring name.
    pub keyring: String,
    /// DEK to encrypt with.
    pub key_id: String,
    /// Base64 plaintext.
    pub plaintext: String,
    /// Base64 associated data.
    #[serde(default)]
    pub associated_data: String,
}

/// `POST /v1/vault/encrypt` response.
#[derive(Debug, Serialize, Deserialize)]
pub struct EncryptReply {
    /// Base64 envelope.
    pub envelope: String,
    /// DEK the envelope was sealed with.
    pub key_id: String,
}

/// `POST /v1/vault/encrypt-bulk` body.
#[derive(Debug, Serialize, Deserialize)]
pub struct EncryptBulkBody {
    /// Keyring name.
    pub keyring: String,
    /// DEK to encrypt with.
    pub key_id: String,
    /// Base64 plaintexts.
    pub plaintexts: Vec<String>,
    /// Base64 associated data shared by every item.
    #[serde(default)]
    pub associated_data: String,
}

/// `POST /v1/vault/encrypt-bulk` response.
#[derive(Debug, Serialize, Deserialize)]
pub struct EncryptBulkReply {
    /// Base64 envelopes, in request order.
    pub envelopes: Vec<String>,
}

/// `POST /v1/vault/decrypt` body.
#[derive(Debug, Serialize, Deserialize)]
pub struct DecryptBody {
    /// Keyring name.
    pub keyring: String,
    /// Base64 envelope.
    pub envelope: String,
    /// Base64 associated data.
    #[serde(default)]
    pub associated_data: String,
}

/// `POST /v1/vault/decrypt` response.
#[derive(Debug, Serialize, Deserialize)]
pub struct DecryptReply {
    /// Base64 plaintext.
    pub plaintext: String,
}

/// `POST /v1/vault/reencrypt` body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ReEncryptBody {
    /// Keyring name.
    pub keyring: String,
    /// Base64 envelope.
    pub envelope: String,
    /// Base64 associated data.
    #[serde(default)]
    pub associated_data: String,
    /// DEK to re-encrypt under.
    pub target_key_id: String,
}

/// `POST /v1/vault/reencrypt` response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ReEncryptReply {
    /// Base64 envelope.
    pub envelope: String,
    /// DEK the envelope was sealed with.
    pub key_id: String,
}

/// `GET /v1/vault/keyrings/{keyring}/deks` response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ListDeksReply {
    /// DEK ids, sorted.
    pub key_ids: Vec<String>,
}

/// `GET /v1/vault/liveness` response.
#[derive(Debug, Serialize, Deserialize)]
pub struct LivenessReply {
    /// `"ok"`.
    pub status: String,
    /// Server version.
    pub version: String,
    /// Id of the primary master key.
    pub primary_master_key_id: String,
    /// Number of configured master keys.
    pub master_key_count: usize,
}

impl From<LivenessResponse> for LivenessReply {
    fn from(live: LivenessResponse) -> Self {
        Self {
            status: live.status.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            primary_master_key_id: live.primary_master_key_id,
            master_key_count: live.master_key_count,
        }
    }
}

fn decode(field: &str, value: &str) -> Result<Vec<u8>, ApiError> {
    BASE64
        .decode(value)
        .map_err(|_| VaultError::InvalidArgument(format!("{field} is not valid base64")).into())
}

// ============================================================================
// Handlers
// ============================================================================

/// Health probe.
pub async fn liveness(State(vault): State<AppState>) -> Json<LivenessReply> {
    Json(vault.liveness().into())
}

/// Creates a DEK.
pub async fn create_dek(
    State(vault): State<AppState>,
    body: Result<Json<CreateDekBody>, JsonRejection>,
) -> Result<Json<CreateDekReply>, ApiError> {
    let Json(body) = body?;

    let response = vault
        .create_dek(CreateDekRequest {
            keyring: body.keyring,
        })
        .await?;

    Ok(Json(CreateDekReply {
        key_id: response.key_id,
    }))
}

/// Encrypts one payload.
pub async fn encrypt(
    State(vault): State<AppState>,
    body: Result<Json<EncryptBody>, JsonRejection>,
) -> Result<Json<EncryptReply>, ApiError> {
    let Json(body) = body?;

    let response = vault
        .encrypt(EncryptRequest {
            keyring: body.keyring,
            key_id: body.key_id,
            plaintext: decode("plaintext", &body.plaintext)?,
            associated_data: decode("associated_data", &body.associated_data)?,
        })
        .await?;

    Ok(Json(EncryptReply {
        envelope: BASE64.encode(&response.envelope),
        key_id: response.key_id,
    }))
}

/// Encrypts several payloads under one DEK.
pub async fn encrypt_bulk(
    State(vault): State<AppState>,
    body: Result<Json<EncryptBulkBody>, JsonRejection>,
) -> Result<Json<EncryptBulkReply>, ApiError> {
    let Json(body) = body?;

    let plaintexts = body
        .plaintexts
        .iter()
        .enumerate()
        .map(|(i, p)| decode(&format!("plaintexts[{i}]"), p))
        .collect::<Result<Vec<_>, _>>()?;

    let response = vault
        .encrypt_bulk(EncryptBulkRequest {
            keyring: body.keyring,
            key_id: body.key_id,
            plaintexts,
            associated_data: decode("associated_data", &body.associated_data)?,
        })
        .await?;

    Ok(Json(EncryptBulkReply {
        envelopes: response
            .envelopes
            .iter()
            .map(|e| BASE64.encode(e))
            .collect(),
    }))
}

/// Decrypts an envelope.
pub async fn decrypt(
    State(vault): State<AppState>,
    body: Result<Json<DecryptBody>, JsonRejection>,
) -> Result<Json<DecryptReply>, ApiError> {
    let Json(body) = body?;

    let response = vault
        .decrypt(DecryptRequest {
            keyring: body.keyring,
            envelope: decode("envelope", &body.envelope)?,
            associated_data: decode("associated_data", &body.associated_data)?,
        })
        .await?;

    Ok(Json(DecryptReply {
        plaintext: BASE64.encode(&*response.plaintext),
    }))
}

/// Re-encrypts an envelope under another DEK.
pub async fn reencrypt(
    State(vault): State<AppState>,
    body: Result<Json<ReEncryptBody>, JsonRejection>,
) -> Result<Json<ReEncryptReply>, ApiError> {
    let Json(body) = body?;

    let response = vault
        .reencrypt(ReEncryptRequest {
            keyring: body.keyring,
            envelope: decode("envelope", &body.envelope)?,
            associated_data: decode("associated_data", &body.associated_data)?,
            target_key_id: body.target_key_id,
        })
        .await?;

    Ok(Json(ReEncryptReply {
        envelope: BASE64.encode(&response.envelope),
        key_id: response.key_id,
    }))
}

/// Lists the DEK ids of a keyring.
pub async fn list_deks(
    State(vault): State<AppState>,
    Path(keyring): Path<String>,
) -> Result<Json<ListDeksReply>, ApiError> {
    let key_ids = vault.list_deks(&keyring).await?;
    Ok(Json(ListDeksReply { key_ids }))
}

/// Returns the metadata of a DEK.
pub async fn describe_dek(
    State(vault): State<AppState>,
    Path((keyring, key_id)): Path<(String, String)>,
) -> Result<Json<DekMetadata>, ApiError> {
    Ok(Json(vault.describe_dek(&keyring, &key_id).await?))
}

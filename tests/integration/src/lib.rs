//! Integration tests for Strongbox server.
//!
//! These tests drive the HTTP API end to end: router, vault, cache and storage.

// Allow unwrap() in tests - panics are acceptable for test assertions
#![allow(clippy::disallowed_methods)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use strongbox_crypto::MasterKey;
use strongbox_server::api::{
    CreateDekBody, CreateDekReply, DecryptBody, DecryptReply, EncryptBody, EncryptBulkBody,
    EncryptBulkReply, EncryptReply, ListDeksReply, LivenessReply, ReEncryptBody, ReEncryptReply,
};
use strongbox_server::error::ErrorBody;
use strongbox_server::router;
use strongbox_storage::{MemoryBackend, StorageBackend};
use strongbox_storage_sqlite::SqliteBackend;
use strongbox_vault::{VaultConfig, VaultService};

// ============================================================================
// Vault Fixtures
// ============================================================================

/// A master key with fixed bytes, so restarts can reuse it.
pub fn master_key(byte: u8) -> MasterKey {
    MasterKey::from_bytes(&[byte; 32]).unwrap()
}

/// A vault over in-memory storage.
pub fn memory_vault(keys: Vec<MasterKey>) -> VaultService {
    vault_over(Arc::new(MemoryBackend::new()), keys)
}

/// A vault over SQLite storage in `dir`.
pub async fn sqlite_vault(dir: &Path, keys: Vec<MasterKey>) -> VaultService {
    let storage = SqliteBackend::open(dir, "vault").await.unwrap();
    vault_over(Arc::new(storage), keys)
}

/// A vault over any storage backend.
pub fn vault_over(storage: Arc<dyn StorageBackend>, keys: Vec<MasterKey>) -> VaultService {
    VaultService::new(VaultConfig::new(storage, keys)).unwrap()
}

// ============================================================================
// Test Server
// ============================================================================

/// An in-process server listening on an ephemeral local port.
pub struct TestServer {
    pub base_url: String,
    pub vault: Arc<VaultService>,
    handle: JoinHandle<()>,
}

impl TestServer {
    /// Serve `vault` on 127.0.0.1 with an OS-assigned port.
    pub async fn start(vault: VaultService) -> Result<Self> {
        let vault = Arc::new(vault);
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .context("Failed to bind test listener")?;
        let addr = listener.local_addr()?;

        let app = router(vault.clone());
        let handle = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        let server = Self {
            base_url: format!("http://{}", addr),
            vault,
            handle,
        };

        server.wait_for_ready().await?;

        Ok(server)
    }

    /// Serve a fresh in-memory vault with one master key.
    pub async fn dev() -> Result<Self> {
        Self::start(memory_vault(vec![master_key(1)])).await
    }

    /// Wait for the server to be ready to accept connections.
    async fn wait_for_ready(&self) -> Result<()> {
        let client = self.client();

        for _ in 0..50 {
            match client.liveness().await {
                Ok(_) => return Ok(()),
                Err(_) => tokio::time::sleep(Duration::from_millis(20)).await,
            }
        }

        bail!("Server failed to start within 1 second")
    }

    /// Get an HTTP client for this server.
    pub fn client(&self) -> StrongboxClient {
        StrongboxClient::new(&self.base_url)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

// ============================================================================
// Test Client
// ============================================================================

/// HTTP client for testing the Strongbox API.
pub struct StrongboxClient {
    client: Client,
    base_url: String,
}

impl StrongboxClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .expect("Failed to create HTTP client"),
            base_url: base_url.to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// POST a JSON body and return the status code and the raw JSON reply.
    pub async fn post_raw<B: Serialize>(&self, path: &str, body: &B) -> Result<(u16, Value)> {
        let resp = self.client.post(self.url(path)).json(body).send().await?;
        let status = resp.status().as_u16();
        Ok((status, resp.json().await?))
    }

    async fn post<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        let resp = self.client.post(self.url(path)).json(body).send().await?;
        if !resp.status().is_success() {
            let error: ErrorBody = resp.json().await?;
            bail!("{} failed: {} ({})", path, error.error, error.message);
        }
        Ok(resp.json().await?)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let resp = self.client.get(self.url(path)).send().await?;
        if !resp.status().is_success() {
            let error: ErrorBody = resp.json().await?;
            bail!("{} failed: {} ({})", path, error.error, error.message);
        }
        Ok(resp.json().await?)
    }

    pub async fn liveness(&self) -> Result<LivenessReply> {
        self.get("/v1/vault/liveness").await
    }

    pub async fn create_dek(&self, keyring: &str) -> Result<String> {
        let reply: CreateDekReply = self
            .post(
                "/v1/vault/create-dek",
                &CreateDekBody {
                    keyring: keyring.to_string(),
                },
            )
            .await?;
        Ok(reply.key_id)
    }

    pub async fn encrypt(
        &self,
        keyring: &str,
        key_id: &str,
        plaintext: &[u8],
        aad: &[u8],
    ) -> Result<String> {
        let reply: EncryptReply = self
            .post("/v1/vault/encrypt", &encrypt_body(keyring, key_id, plaintext, aad))
            .await?;
        Ok(reply.envelope)
    }

    pub async fn encrypt_bulk(
        &self,
        keyring: &str,
        key_id: &str,
        plaintexts: &[&[u8]],
        aad: &[u8],
    ) -> Result<Vec<String>> {
        let body = EncryptBulkBody {
            keyring: keyring.to_string(),
            key_id: key_id.to_string(),
            plaintexts: plaintexts.iter().map(|p| BASE64.encode(p)).collect(),
            associated_data: BASE64.encode(aad),
        };
        let reply: EncryptBulkReply = self.post("/v1/vault/encrypt-bulk", &body).await?;
        Ok(reply.envelopes)
    }

    pub async fn decrypt(&self, keyring: &str, envelope: &str, aad: &[u8]) -> Result<Vec<u8>> {
        let reply: DecryptReply = self
            .post("/v1/vault/decrypt", &decrypt_body(keyring, envelope, aad))
            .await?;
        Ok(BASE64.decode(reply.plaintext)?)
    }

    pub async fn reencrypt(
        &self,
        keyring: &str,
        envelope: &str,
        aad: &[u8],
        target_key_id: &str,
    ) -> Result<ReEncryptReply> {
        let body = ReEncryptBody {
            keyring: keyring.to_string(),
            envelope: envelope.to_string(),
            associated_data: BASE64.encode(aad),
            target_key_id: target_key_id.to_string(),
        };
        self.post("/v1/vault/reencrypt", &body).await
    }

    pub async fn list_deks(&self, keyring: &str) -> Result<Vec<String>> {
        let reply: ListDeksReply = self
            .get(&format!("/v1/vault/keyrings/{}/deks", keyring))
            .await?;
        Ok(reply.key_ids)
    }

    pub async fn describe_dek(&self, keyring: &str, key_id: &str) -> Result<Value> {
        self.get(&format!("/v1/vault/keyrings/{}/deks/{}", keyring, key_id))
            .await
    }
}

pub fn encrypt_body(keyring: &str, key_id: &str, plaintext: &[u8], aad: &[u8]) -> EncryptBody {
    EncryptBody {
        keyring: keyring.to_string(),
        key_id: key_id.to_string(),
        plaintext: BASE64.encode(plaintext),
        associated_data: BASE64.encode(aad),
    }
}

pub fn decrypt_body(keyring: &str, envelope: &str, aad: &[u8]) -> DecryptBody {
    DecryptBody {
        keyring: keyring.to_string(),
        envelope: envelope.to_string(),
        associated_data: BASE64.encode(aad),
    }
}

/// Flip one bit of a base64 envelope.
pub fn flip_bit(envelope: &str, index: usize, mask: u8) -> String {
    let mut bytes = BASE64.decode(envelope).unwrap();
    bytes[index] ^= mask;
    BASE64.encode(bytes)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashSet;

    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use strongbox_storage::StorageError;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_liveness() {
        let server = TestServer::dev().await.unwrap();

        let live = server.client().liveness().await.unwrap();

        assert_eq!(live.status, "ok");
        assert_eq!(live.primary_master_key_id, master_key(1).id());
        assert_eq!(live.master_key_count, 1);
        assert!(!live.version.is_empty());
    }

    #[tokio::test]
    async fn test_create_encrypt_decrypt() {
        let server = TestServer::dev().await.unwrap();
        let client = server.client();

        let key_id = client.create_dek("tenant-a").await.unwrap();
        assert!(key_id.starts_with("dek_"));

        let envelope = client
            .encrypt("tenant-a", &key_id, b"hello world", b"")
            .await
            .unwrap();
        let plaintext = client.decrypt("tenant-a", &envelope, b"").await.unwrap();

        assert_eq!(plaintext, b"hello world");
    }

    #[tokio::test]
    async fn test_associated_data_is_bound() {
        let server = TestServer::dev().await.unwrap();
        let client = server.client();
        let key_id = client.create_dek("tenant-a").await.unwrap();

        let envelope = client
            .encrypt("tenant-a", &key_id, b"api-key-material", b"workspace:42")
            .await
            .unwrap();

        assert_eq!(
            client
                .decrypt("tenant-a", &envelope, b"workspace:42")
                .await
                .unwrap(),
            b"api-key-material"
        );

        let (status, body) = client
            .post_raw(
                "/v1/vault/decrypt",
                &decrypt_body("tenant-a", &envelope, b"workspace:43"),
            )
            .await
            .unwrap();
        assert_eq!(status, 422);
        assert_eq!(body["error"], "decryption_failed");
    }

    #[tokio::test]
    async fn test_flipped_last_byte_is_rejected() {
        let server = TestServer::dev().await.unwrap();
        let client = server.client();
        let key_id = client.create_dek("tenant-a").await.unwrap();
        let envelope = client
            .encrypt("tenant-a", &key_id, b"hello world", b"")
            .await
            .unwrap();

        let len = BASE64.decode(&envelope).unwrap().len();
        let tampered = flip_bit(&envelope, len - 1, 0xFF);

        let (status, body) = client
            .post_raw("/v1/vault/decrypt", &decrypt_body("tenant-a", &tampered, b""))
            .await
            .unwrap();

        assert_eq!(status, 422);
        assert_eq!(body["error"], "decryption_failed");
        assert_eq!(body["message"], "decryption failed");
    }

    #[tokio::test]
    async fn test_unknown_key_is_not_found() {
        let server = TestServer::dev().await.unwrap();
        let client = server.client();

        let (status, body) = client
            .post_raw(
                "/v1/vault/encrypt",
                &encrypt_body("tenant-a", "k999", b"x", b""),
            )
            .await
            .unwrap();
        assert_eq!(status, 404);
        assert_eq!(body["error"], "key_not_found");

        // Envelope naming a DEK that never existed.
        let mut forged = vec![0x01, 4];
        forged.extend_from_slice(b"k999");
        forged.extend_from_slice(&[0u8; 12 + 16]);
        let (status, body) = client
            .post_raw(
                "/v1/vault/decrypt",
                &decrypt_body("tenant-a", &BASE64.encode(forged), b""),
            )
            .await
            .unwrap();
        assert_eq!(status, 404);
        assert_eq!(body["error"], "key_not_found");
    }

    #[tokio::test]
    async fn test_keyring_mismatch_is_not_found() {
        let server = TestServer::dev().await.unwrap();
        let client = server.client();
        let key_id = client.create_dek("tenant-a").await.unwrap();
        let envelope = client.encrypt("tenant-a", &key_id, b"x", b"").await.unwrap();

        let (status, body) = client
            .post_raw("/v1/vault/decrypt", &decrypt_body("tenant-b", &envelope, b""))
            .await
            .unwrap();

        assert_eq!(status, 404);
        assert_eq!(body["error"], "key_not_found");
    }

    #[tokio::test]
    async fn test_empty_keyring_is_invalid() {
        let server = TestServer::dev().await.unwrap();
        let client = server.client();

        let (status, body) = client
            .post_raw(
                "/v1/vault/create-dek",
                &CreateDekBody {
                    keyring: String::new(),
                },
            )
            .await
            .unwrap();

        assert_eq!(status, 400);
        assert_eq!(body["error"], "invalid_argument");
    }

    #[tokio::test]
    async fn test_bad_base64_and_garbage_envelope() {
        let server = TestServer::dev().await.unwrap();
        let client = server.client();

        let body = DecryptBody {
            keyring: "tenant-a".into(),
            envelope: "not base64!".into(),
            associated_data: String::new(),
        };
        let (status, reply) = client.post_raw("/v1/vault/decrypt", &body).await.unwrap();
        assert_eq!(status, 400);
        assert_eq!(reply["error"], "invalid_argument");

        let (status, reply) = client
            .post_raw(
                "/v1/vault/decrypt",
                &decrypt_body("tenant-a", &BASE64.encode(b"garbage"), b""),
            )
            .await
            .unwrap();
        assert_eq!(status, 400);
        assert_eq!(reply["error"], "invalid_argument");
    }

    #[tokio::test]
    async fn test_concurrent_create_dek() {
        let server = TestServer::dev().await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..20 {
            let client = server.client();
            handles.push(tokio::spawn(async move {
                client.create_dek("tenant-a").await.unwrap()
            }));
        }

        let mut ids = HashSet::new();
        for handle in handles {
            ids.insert(handle.await.unwrap());
        }

        assert_eq!(ids.len(), 20);

        let listed: HashSet<String> = server
            .client()
            .list_deks("tenant-a")
            .await
            .unwrap()
            .into_iter()
            .collect();
        assert_eq!(listed, ids);
    }

    #[tokio::test]
    async fn test_bulk_and_reencrypt() {
        let server = TestServer::dev().await.unwrap();
        let client = server.client();
        let k1 = client.create_dek("tenant-a").await.unwrap();
        let k2 = client.create_dek("tenant-a").await.unwrap();

        let items: [&[u8]; 3] = [b"one", b"two", b""];
        let envelopes = client
            .encrypt_bulk("tenant-a", &k1, &items, b"batch")
            .await
            .unwrap();
        assert_eq!(envelopes.len(), 3);

        for (envelope, item) in envelopes.iter().zip(items) {
            let moved = client
                .reencrypt("tenant-a", envelope, b"batch", &k2)
                .await
                .unwrap();
            assert_eq!(moved.key_id, k2);
            assert_eq!(
                client
                    .decrypt("tenant-a", &moved.envelope, b"batch")
                    .await
                    .unwrap(),
                item
            );
        }
    }

    #[tokio::test]
    async fn test_describe_dek() {
        let server = TestServer::dev().await.unwrap();
        let client = server.client();
        let key_id = client.create_dek("tenant-a").await.unwrap();

        let meta = client.describe_dek("tenant-a", &key_id).await.unwrap();

        assert_eq!(meta["id"], key_id.as_str());
        assert_eq!(meta["keyring"], "tenant-a");
        assert_eq!(meta["master_key_id"], master_key(1).id());
        assert_eq!(meta["algorithm"], "aes256-gcm");
        assert!(meta.get("wrapped_key").is_none());

        assert!(client.describe_dek("tenant-b", &key_id).await.is_err());
    }

    #[tokio::test]
    async fn test_cache_transparency_over_http() {
        let server = TestServer::dev().await.unwrap();
        let client = server.client();
        let key_id = client.create_dek("tenant-a").await.unwrap();
        let envelope = client.encrypt("tenant-a", &key_id, b"same", b"").await.unwrap();

        let warm = client.decrypt("tenant-a", &envelope, b"").await.unwrap();
        server.vault.clear_cache();
        assert_eq!(server.vault.cached_keys(), 0);
        let cold = client.decrypt("tenant-a", &envelope, b"").await.unwrap();

        assert_eq!(warm, cold);
    }

    #[tokio::test]
    async fn test_rotation_across_restart() {
        let dir = tempfile::tempdir().unwrap();

        // 1. Start with [M1] and encrypt under d1.
        let server = TestServer::start(sqlite_vault(dir.path(), vec![master_key(1)]).await)
            .await
            .unwrap();
        let client = server.client();
        let d1 = client.create_dek("tenant-a").await.unwrap();
        let e1 = client.encrypt("tenant-a", &d1, b"first", b"").await.unwrap();
        drop(server);

        // 2. Restart with [M2, M1]; new DEKs are wrapped by M2.
        let server = TestServer::start(
            sqlite_vault(dir.path(), vec![master_key(2), master_key(1)]).await,
        )
        .await
        .unwrap();
        let client = server.client();

        let live = client.liveness().await.unwrap();
        assert_eq!(live.primary_master_key_id, master_key(2).id());
        assert_eq!(live.master_key_count, 2);

        let d2 = client.create_dek("tenant-a").await.unwrap();
        let meta = client.describe_dek("tenant-a", &d2).await.unwrap();
        assert_eq!(meta["master_key_id"], master_key(2).id());

        // 3. Both DEKs work without re-wrapping.
        assert_eq!(client.decrypt("tenant-a", &e1, b"").await.unwrap(), b"first");
        for key_id in [&d1, &d2] {
            let envelope = client.encrypt("tenant-a", key_id, b"again", b"").await.unwrap();
            assert_eq!(
                client.decrypt("tenant-a", &envelope, b"").await.unwrap(),
                b"again"
            );
        }
    }

    #[tokio::test]
    async fn test_live_rotation() {
        let server = TestServer::dev().await.unwrap();
        let client = server.client();
        let d1 = client.create_dek("tenant-a").await.unwrap();
        let e1 = client.encrypt("tenant-a", &d1, b"before", b"").await.unwrap();

        server.vault.rotate_master_key(master_key(2)).unwrap();
        server.vault.clear_cache();

        let d2 = client.create_dek("tenant-a").await.unwrap();
        let meta = client.describe_dek("tenant-a", &d2).await.unwrap();
        assert_eq!(meta["master_key_id"], master_key(2).id());
        assert_eq!(client.decrypt("tenant-a", &e1, b"").await.unwrap(), b"before");
    }

    // ------------------------------------------------------------------------
    // In-process requests
    // ------------------------------------------------------------------------

    struct DownBackend;

    #[async_trait]
    impl StorageBackend for DownBackend {
        async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, StorageError> {
            Err(StorageError::ConnectionFailed("connection refused".into()))
        }

        async fn put(&self, _key: &str, _value: &[u8]) -> Result<(), StorageError> {
            Err(StorageError::ConnectionFailed("connection refused".into()))
        }

        async fn list(&self, _prefix: &str) -> Result<Vec<String>, StorageError> {
            Err(StorageError::ConnectionFailed("connection refused".into()))
        }
    }

    async fn send(app: axum::Router, method: &str, uri: &str, body: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);

        (status, value)
    }

    #[tokio::test]
    async fn test_storage_outage_is_service_unavailable() {
        let app = router(Arc::new(vault_over(Arc::new(DownBackend), vec![master_key(1)])));

        let (status, body) = send(
            app,
            "POST",
            "/v1/vault/create-dek",
            r#"{"keyring":"tenant-a"}"#,
        )
        .await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"], "storage_unavailable");
    }

    #[tokio::test]
    async fn test_malformed_json_is_invalid_argument() {
        let app = router(Arc::new(memory_vault(vec![master_key(1)])));

        let (status, body) = send(app.clone(), "POST", "/v1/vault/encrypt", "{not json").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid_argument");

        let (status, body) = send(app, "POST", "/v1/vault/encrypt", r#"{"keyring":"a"}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid_argument");
    }

    #[tokio::test]
    async fn test_oneshot_roundtrip_with_default_aad() {
        let app = router(Arc::new(memory_vault(vec![master_key(1)])));

        let (status, body) = send(
            app.clone(),
            "POST",
            "/v1/vault/create-dek",
            r#"{"keyring":"tenant-a"}"#,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let key_id = body["key_id"].as_str().unwrap().to_string();

        let request = serde_json::json!({
            "keyring": "tenant-a",
            "key_id": key_id,
            "plaintext": BASE64.encode(b"no aad"),
        });
        let (status, body) = send(
            app.clone(),
            "POST",
            "/v1/vault/encrypt",
            &request.to_string(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let envelope = body["envelope"].as_str().unwrap().to_string();

        let request = serde_json::json!({ "keyring": "tenant-a", "envelope": envelope });
        let (status, body) = send(app, "POST", "/v1/vault/decrypt", &request.to_string()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["plaintext"], BASE64.encode(b"no aad"));
    }
}

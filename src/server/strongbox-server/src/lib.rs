//! # Strongbox Server
//!
//! HTTP transport over the Strongbox vault.
//!
//! ## Endpoints
//!
//! - `GET  /v1/vault/liveness` - Health probe
//! - `POST /v1/vault/create-dek` - Create a DEK in a keyring
//! - `POST /v1/vault/encrypt` - Encrypt one payload
//! - `POST /v1/vault/encrypt-bulk` - Encrypt several payloads under one DEK
//! - `POST /v1/vault/decrypt` - Decrypt an envelope
//! - `POST /v1/vault/reencrypt` - Move an envelope to another DEK
//! - `GET  /v1/vault/keyrings/{keyring}/deks` - List DEK ids
//! - `GET  /v1/vault/keyrings/{keyring}/deks/{key_id}` - DEK metadata

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod api;
pub mod config;
pub mod error;

use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::debug;

use strongbox_vault::VaultService;

pub use config::ServerConfig;

/// Builds the HTTP router over a vault.
pub fn router(vault: Arc<VaultService>) -> Router {
    Router::new()
        .route("/v1/vault/liveness", get(api::liveness))
        .route("/v1/vault/create-dek", post(api::create_dek))
        .route("/v1/vault/encrypt", post(api::encrypt))
        .route("/v1/vault/encrypt-bulk", post(api::encrypt_bulk))
        .route("/v1/vault/decrypt", post(api::decrypt))
        .route("/v1/vault/reencrypt", post(api::reencrypt))
        .route("/v1/vault/keyrings/{keyring}/deks", get(api::list_deks))
        .route(
            "/v1/vault/keyrings/{keyring}/deks/{key_id}",
            get(api::describe_dek),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(vault)
}

/// Periodically scrubs expired DEKs from the vault cache.
///
/// Expired entries are also dropped lazily on lookup; the sweeper bounds how
/// long unused key material stays in memory.
pub fn spawn_cache_sweeper(vault: Arc<VaultService>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period.max(Duration::from_secs(1)));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            let evicted = vault.evict_expired();
            if evicted > 0 {
                debug!(evicted, "Cache sweep");
            }
        }
    })
}

//! # Strongbox Vault
//!
//! Envelope encryption for small secrets.
//!
//! Caller data is sealed with AES-256-GCM under a data-encryption key (DEK);
//! each DEK is itself wrapped under a master key (KEK) and persisted through a
//! [`StorageBackend`](strongbox_storage::StorageBackend). Unwrapped DEKs are
//! kept in a bounded, time-limited cache that scrubs keys on eviction.
//!
//! ## Key hierarchy
//!
//! ```text
//! master keys (config, memory only)
//!   └── wrap ──> DEK records (storage, keyring/{keyring}/{key_id})
//!                  └── seal ──> envelopes (returned to callers)
//! ```
//!
//! New DEKs are always wrapped with the primary master key. Every configured
//! master key stays available for unwrap, so rotating the primary never
//! requires re-wrapping existing DEKs.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use strongbox_crypto::MasterKey;
//! use strongbox_storage::MemoryBackend;
//! use strongbox_vault::proto::{CreateDekRequest, DecryptRequest, EncryptRequest};
//! use strongbox_vault::{VaultConfig, VaultService};
//!
//! # async fn run() -> Result<(), strongbox_vault::VaultError> {
//! let config = VaultConfig::new(Arc::new(MemoryBackend::new()), vec![MasterKey::generate()?]);
//! let vault = VaultService::new(config)?;
//!
//! let key_id = vault
//!     .create_dek(CreateDekRequest { keyring: "tenant-a".into() })
//!     .await?
//!     .key_id;
//!
//! let envelope = vault
//!     .encrypt(EncryptRequest {
//!         keyring: "tenant-a".into(),
//!         key_id,
//!         plaintext: b"hello world".to_vec(),
//!         associated_data: Vec::new(),
//!     })
//!     .await?
//!     .envelope;
//!
//! let plaintext = vault
//!     .decrypt(DecryptRequest {
//!         keyring: "tenant-a".into(),
//!         envelope,
//!         associated_data: Vec::new(),
//!     })
//!     .await?
//!     .plaintext;
//! assert_eq!(&plaintext[..], b"hello world");
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cache;
pub mod clock;
pub mod config;
pub mod envelope;
pub mod error;
pub mod keyring;
pub mod master_keys;
pub mod proto;
pub mod record;
pub mod service;

pub use clock::{Clock, SystemClock, TestClock};
pub use config::{parse_master_keys, VaultConfig};
pub use error::{ErrorKind, VaultError};
pub use record::DekMetadata;
pub use service::VaultService;

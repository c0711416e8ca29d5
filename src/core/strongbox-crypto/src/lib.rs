//! # Strongbox Crypto
//!
//! Core cryptographic primitives for the Strongbox vault.
//!
//! This crate provides the low-level operations the vault is built from:
//! - Symmetric authenticated encryption (AES-256-GCM)
//! - Zeroizing key types for master keys and data-encryption keys
//! - Key fingerprints (HKDF-SHA256)
//! - Secure random generation

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod aead;
pub mod error;
pub mod kdf;
pub mod keys;
pub mod random;

pub use error::CryptoError;
pub use keys::{MasterKey, SymmetricKey};

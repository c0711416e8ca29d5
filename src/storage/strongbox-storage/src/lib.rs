//! # Strongbox Storage
//!
//! Storage abstraction layer for Strongbox backends.
//!
//! Provides the [`StorageBackend`] contract the vault persists wrapped
//! data-encryption keys through, plus an in-memory backend for tests and
//! development mode.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod backend;
pub mod error;
pub mod memory;

pub use backend::StorageBackend;
pub use error::StorageError;
pub use memory::MemoryBackend;

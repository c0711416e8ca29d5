//! Key derivation functions.
//!
//! Provides HKDF (HMAC-based Key Derivation Function) as specified in RFC 5869.
//! The vault uses it to derive stable, non-reversible identifiers for master keys.

use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::error::CryptoError;
use crate::random::hex_encode;

/// HKDF info string for master key fingerprints.
const FINGERPRINT_INFO: &[u8] = b"strongbox-kek-id-v1";

/// Number of fingerprint bytes rendered into an identifier.
const FINGERPRINT_LEN: usize = 8;

/// Derives a key using HKDF-SHA256.
///
/// # Arguments
///
/// * `ikm` - Input key material (the secret to derive from)
/// * `salt` - Optional salt value
/// * `info` - Context and application-specific information
/// * `length` - Desired output key length in bytes
///
/// # Returns
///
/// Derived key wrapped in `Zeroizing` for automatic memory cleanup.
pub fn derive_key(
    ikm: &[u8],
    salt: Option<&[u8]>,
    info: &[u8],
    length: usize,
) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    if length == 0 {
        return Err(CryptoError::InvalidInput(
            "output length must be > 0".to_string(),
        ));
    }

    if length > 255 * 32 {
        return Err(CryptoError::InvalidInput(
            "output length too large for HKDF-SHA256".to_string(),
        ));
    }

    let hkdf = Hkdf::<Sha256>::new(salt, ikm);

    let mut okm = Zeroizing::new(vec![0u8; length]);
    hkdf.expand(info, &mut okm)
        .map_err(|_| CryptoError::KeyGenerationFailed("HKDF expansion failed".to_string()))?;

    Ok(okm)
}

/// Computes a stable public fingerprint for a key, e.g. `kek_1a2b3c4d5e6f7a8b`.
///
/// The fingerprint is an HKDF output, so it identifies the key without
/// revealing any of its bytes.
pub fn key_fingerprint(prefix: &str, key: &[u8]) -> Result<String, CryptoError> {
    let okm = derive_key(key, None, FINGERPRINT_INFO, FINGERPRINT_LEN)?;
    Ok(format!("{}_{}", prefix, hex_encode(&okm)))
}

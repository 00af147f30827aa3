//! Shared AES-256-GCM primitive (spec.md §4.1).
//!
//! One nonce-prepended ciphertext layout is used everywhere a 32-byte key
//! encrypts a plaintext blob: KEK wrapping a DEK, the Key Manager
//! encrypting a PAN with the current DEK, and legacy single-key mode.
//! No associated data is used anywhere this primitive is called.

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use rand::RngCore;

use crate::error::CryptoError;

const NONCE_LEN: usize = 12;

/// Encrypt `plaintext` under `key`, returning `nonce || ciphertext_with_tag`.
///
/// # Errors
///
/// Returns [`CryptoError::InvalidKeyLength`] if `key` is not 32 bytes.
pub fn seal(key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let cipher = cipher_from_key(key)?;

    let mut nonce_bytes = [0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|_| CryptoError::DecryptionFailure)?;

    let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Decrypt a `nonce || ciphertext_with_tag` blob produced by [`seal`].
///
/// # Errors
///
/// Returns [`CryptoError::InvalidKeyLength`] if `key` is not 32 bytes, or
/// [`CryptoError::DecryptionFailure`] if the blob is too short or the GCM
/// tag fails to authenticate.
pub fn open(key: &[u8], blob: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let cipher = cipher_from_key(key)?;

    if blob.len() < NONCE_LEN {
        return Err(CryptoError::DecryptionFailure);
    }
    let (nonce_bytes, ciphertext) = blob.split_at(NONCE_LEN);
    let nonce = Nonce::from_slice(nonce_bytes);

    cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| CryptoError::DecryptionFailure)
}

fn cipher_from_key(key: &[u8]) -> Result<Aes256Gcm, CryptoError> {
    if key.len() != 32 {
        return Err(CryptoError::InvalidKeyLength {
            expected: 32,
            actual: key.len(),
        });
    }
    Aes256Gcm::new_from_slice(key).map_err(|_| CryptoError::InvalidKeyLength {
        expected: 32,
        actual: key.len(),
    })
}

//! Encryption façade (spec.md §4.2).
//!
//! Selects between legacy single-key encryption and KEK/DEK envelope
//! encryption once at startup. An enum of two variants, not a trait
//! object — the Key Manager is the only real collaborator behind
//! `KekDek`, and legacy mode is a single key, so dynamic dispatch buys
//! nothing here.

use std::sync::Arc;

use crate::aead;
use crate::error::CryptoError;
use crate::key_manager::KeyManager;

/// Encrypts and decrypts PANs under either a single legacy key or the
/// KEK/DEK hierarchy, disambiguated per-record by an optional `key_id`.
pub enum EncryptionFacade {
    /// Single 32-byte process-wide key; ciphertexts carry no `key_id`.
    Legacy {
        /// The process-wide symmetric key.
        key: [u8; 32],
    },
    /// Envelope encryption delegating to the Key Manager.
    Envelope {
        /// Shared Key Manager instance.
        key_manager: Arc<KeyManager>,
    },
}

impl EncryptionFacade {
    /// Build a facade in legacy mode.
    #[must_use]
    pub fn legacy(key: [u8; 32]) -> Self {
        Self::Legacy { key }
    }

    /// Build a facade delegating to `key_manager`.
    #[must_use]
    pub fn envelope(key_manager: Arc<KeyManager>) -> Self {
        Self::Envelope { key_manager }
    }

    /// Encrypt `plaintext`, returning the ciphertext and (in envelope
    /// mode) the DEK identifier that must be stored alongside it.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError`] if the underlying cipher fails.
    pub async fn encrypt(&self, plaintext: &[u8]) -> Result<(Vec<u8>, Option<String>), CryptoError> {
        match self {
            Self::Legacy { key } => {
                let ciphertext = aead::seal(key, plaintext)?;
                Ok((ciphertext, None))
            }
            Self::Envelope { key_manager } => {
                let (ciphertext, dek_id) = key_manager.encrypt_with_current_dek(plaintext).await?;
                Ok((ciphertext, Some(dek_id)))
            }
        }
    }

    /// Decrypt `ciphertext`. `key_id` must be `Some` for envelope-mode
    /// ciphertexts and is ignored in legacy mode.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::DecryptionFailure`] on tag mismatch, or
    /// [`CryptoError::KeyUnavailable`] if envelope mode is active but
    /// `key_id` is `None` or names no key record.
    pub async fn decrypt(&self, ciphertext: &[u8], key_id: Option<&str>) -> Result<Vec<u8>, CryptoError> {
        match self {
            Self::Legacy { key } => aead::open(key, ciphertext),
            Self::Envelope { key_manager } => {
                let dek_id = key_id
                    .ok_or_else(|| CryptoError::KeyUnavailable("no key_id for envelope-mode ciphertext".to_string()))?;
                key_manager.decrypt_with(ciphertext, dek_id).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;

    #[tokio::test]
    async fn test_legacy_round_trip() {
        let facade = EncryptionFacade::legacy([3u8; 32]);
        let (ciphertext, key_id) = facade.encrypt(b"4532015112830366").await.unwrap();
        assert!(key_id.is_none());
        let plaintext = facade.decrypt(&ciphertext, None).await.unwrap();
        assert_eq!(plaintext, b"4532015112830366");
    }

    #[tokio::test]
    async fn test_envelope_round_trip() {
        let store: Arc<dyn crate::store::Store> = Arc::new(InMemoryStore::new());
        let key_manager = Arc::new(KeyManager::initialize(store).await.unwrap());
        let facade = EncryptionFacade::envelope(key_manager);

        let (ciphertext, key_id) = facade.encrypt(b"4532015112830366").await.unwrap();
        assert!(key_id.is_some());
        let plaintext = facade.decrypt(&ciphertext, key_id.as_deref()).await.unwrap();
        assert_eq!(plaintext, b"4532015112830366");
    }

    #[tokio::test]
    async fn test_envelope_ciphertext_not_interchangeable_with_legacy() {
        let legacy = EncryptionFacade::legacy([3u8; 32]);
        let (ciphertext, _) = legacy.encrypt(b"4532015112830366").await.unwrap();

        let store: Arc<dyn crate::store::Store> = Arc::new(InMemoryStore::new());
        let key_manager = Arc::new(KeyManager::initialize(store).await.unwrap());
        let envelope = EncryptionFacade::envelope(key_manager);

        assert!(envelope.decrypt(&ciphertext, None).await.is_err());
    }
}

//! Envelope-encryption key hierarchy (spec.md §4.1).
//!
//! Owns the KEK/DEK cache exclusively. `kek_cache` and `dek_cache` are
//! guarded by a shared/exclusive discipline (many concurrent readers during
//! encrypt/decrypt, exclusive writer only while inserting newly-loaded
//! material); `current_dek_id` is read far more often than it changes, so
//! it lives in an `ArcSwap` instead, following
//! `auth-edge::crypto::key_manager::KeyManager`'s split between the two
//! primitives.

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use chrono::Utc;
use rand::RngCore;
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::aead;
use crate::error::{CryptoError, StoreError};
use crate::store::{KeyRecord, KeyStatus, KeyType, Store};

type KeyCache = RwLock<HashMap<String, Zeroizing<[u8; 32]>>>;

/// Owns the KEK/DEK hierarchy against a [`Store`] and caches unwrapped
/// key material in memory.
pub struct KeyManager {
    store: Arc<dyn Store>,
    kek_cache: KeyCache,
    dek_cache: KeyCache,
    current_kek_id: ArcSwap<Option<String>>,
    current_dek_id: ArcSwap<Option<String>>,
}

impl KeyManager {
    /// Run the startup contract: load or generate the active KEK, then
    /// load or generate the active DEK. Both failures are fatal — callers
    /// should treat an `Err` here as a reason to abort the process.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError`] if the store is unreachable or a duplicate
    /// `key_id` is generated (a bug; key ids are random and never reused).
    pub async fn initialize(store: Arc<dyn Store>) -> Result<Self, CryptoError> {
        let manager = Self {
            store,
            kek_cache: RwLock::new(HashMap::new()),
            dek_cache: RwLock::new(HashMap::new()),
            current_kek_id: ArcSwap::new(Arc::new(None)),
            current_dek_id: ArcSwap::new(Arc::new(None)),
        };

        manager.load_or_generate_kek().await?;
        manager.load_or_generate_dek().await?;
        Ok(manager)
    }

    /// Encrypt `plaintext` with the currently active DEK.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError`] if no DEK is active or the cipher fails.
    pub async fn encrypt_with_current_dek(
        &self,
        plaintext: &[u8],
    ) -> Result<(Vec<u8>, String), CryptoError> {
        let dek_id = (**self.current_dek_id.load())
            .clone()
            .ok_or_else(|| CryptoError::KeyUnavailable("no active DEK".to_string()))?;

        let dek_bytes = self.dek_bytes(&dek_id).await?;
        let ciphertext = aead::seal(&dek_bytes, plaintext)?;
        Ok((ciphertext, dek_id))
    }

    /// Decrypt `ciphertext` with the DEK named by `dek_id`, loading and
    /// caching it first if it is not already cached (e.g. a retired DEK
    /// used only for historical decryption).
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::DecryptionFailure`] on tag mismatch, or
    /// [`CryptoError::KeyUnavailable`] if `dek_id` names no key record.
    pub async fn decrypt_with(&self, ciphertext: &[u8], dek_id: &str) -> Result<Vec<u8>, CryptoError> {
        let dek_bytes = self.dek_bytes(dek_id).await?;
        aead::open(&dek_bytes, ciphertext)
    }

    async fn load_or_generate_kek(&self) -> Result<(), CryptoError> {
        let record = match self.store.get_active_key(KeyType::Kek).await? {
            Some(record) => record,
            None => {
                info!("no active KEK found, generating one");
                let mut material = [0u8; 32];
                rand::thread_rng().fill_bytes(&mut material);
                let now = Utc::now();
                let record = KeyRecord {
                    key_id: format!("kek_{}", Uuid::new_v4()),
                    key_type: KeyType::Kek,
                    version: 1,
                    wrapped_material: material.to_vec(),
                    status: KeyStatus::Active,
                    metadata: serde_json::json!({}),
                    created_at: now,
                    activated_at: now,
                };
                self.store
                    .insert_key(record.clone())
                    .await
                    .map_err(map_insert_err)?;
                record
            }
        };

        let material = material_array(&record.wrapped_material)?;
        self.kek_cache
            .write()
            .await
            .insert(record.key_id.clone(), Zeroizing::new(material));
        self.current_kek_id.store(Arc::new(Some(record.key_id)));
        Ok(())
    }

    async fn load_or_generate_dek(&self) -> Result<(), CryptoError> {
        match self.store.get_active_key(KeyType::Dek).await? {
            Some(record) => {
                let key_id = record.key_id.clone();
                self.ensure_dek_cached(&record).await?;
                self.current_dek_id.store(Arc::new(Some(key_id)));
            }
            None => {
                info!("no active DEK found, generating one");
                let kek_id = (**self.current_kek_id.load())
                    .clone()
                    .ok_or_else(|| CryptoError::KeyUnavailable("no active KEK".to_string()))?;
                let kek_bytes = self.kek_bytes(&kek_id).await?;

                let mut material = [0u8; 32];
                rand::thread_rng().fill_bytes(&mut material);
                let wrapped = aead::seal(&kek_bytes, &material)?;

                let next_version = self.store.max_key_version(KeyType::Dek).await? + 1;
                let now = Utc::now();
                let key_id = format!("dek_{}", Uuid::new_v4());
                let record = KeyRecord {
                    key_id: key_id.clone(),
                    key_type: KeyType::Dek,
                    version: next_version,
                    wrapped_material: wrapped,
                    status: KeyStatus::Active,
                    metadata: serde_json::json!({ "kek_id": kek_id }),
                    created_at: now,
                    activated_at: now,
                };
                self.store
                    .insert_key(record)
                    .await
                    .map_err(map_insert_err)?;

                self.dek_cache
                    .write()
                    .await
                    .insert(key_id.clone(), Zeroizing::new(material));
                self.current_dek_id.store(Arc::new(Some(key_id)));
            }
        }
        Ok(())
    }

    /// Unwrapped bytes for `kek_id`, loading and caching on miss.
    async fn kek_bytes(&self, kek_id: &str) -> Result<[u8; 32], CryptoError> {
        if let Some(bytes) = self.kek_cache.read().await.get(kek_id) {
            return Ok(**bytes);
        }

        let record = self
            .store
            .get_key(kek_id)
            .await?
            .ok_or_else(|| CryptoError::KeyUnavailable(kek_id.to_string()))?;
        let material = material_array(&record.wrapped_material)?;

        self.kek_cache
            .write()
            .await
            .insert(kek_id.to_string(), Zeroizing::new(material));
        Ok(material)
    }

    /// Unwrapped bytes for `dek_id`, loading and caching on miss. Lazy
    /// loading per spec.md §4.1: the cache is additive, retired DEKs stay
    /// usable for historical decryption once loaded once.
    async fn dek_bytes(&self, dek_id: &str) -> Result<[u8; 32], CryptoError> {
        if let Some(bytes) = self.dek_cache.read().await.get(dek_id) {
            return Ok(**bytes);
        }

        let record = self
            .store
            .get_key(dek_id)
            .await?
            .ok_or_else(|| CryptoError::KeyUnavailable(dek_id.to_string()))?;
        self.ensure_dek_cached(&record).await.map(|z| *z)
    }

    /// Unwrap `record` with the KEK named in its metadata and insert the
    /// result into the DEK cache. The KEK unwrap happens before any lock
    /// on `dek_cache` is taken, so no I/O occurs under the write lock.
    async fn ensure_dek_cached(&self, record: &KeyRecord) -> Result<Zeroizing<[u8; 32]>, CryptoError> {
        if let Some(bytes) = self.dek_cache.read().await.get(&record.key_id) {
            return Ok(bytes.clone());
        }

        let kek_id = record
            .wrapping_kek_id()
            .ok_or_else(|| CryptoError::KeyUnavailable(record.key_id.clone()))?;
        let kek_bytes = self.kek_bytes(kek_id).await?;
        let material = aead::open(&kek_bytes, &record.wrapped_material)?;
        let material = material_array(&material)?;

        let wrapped = Zeroizing::new(material);
        self.dek_cache
            .write()
            .await
            .insert(record.key_id.clone(), wrapped.clone());
        Ok(wrapped)
    }
}

fn material_array(bytes: &[u8]) -> Result<[u8; 32], CryptoError> {
    bytes.try_into().map_err(|_| CryptoError::InvalidKeyLength {
        expected: 32,
        actual: bytes.len(),
    })
}

fn map_insert_err(e: StoreError) -> CryptoError {
    match e {
        StoreError::Duplicate(id) => {
            warn!(key_id = %id, "duplicate key_id on insert");
            CryptoError::DuplicateKeyId(id)
        }
        other => CryptoError::Store(other),
    }
}

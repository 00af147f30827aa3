//! Property-based tests for the Key Manager's encrypt/decrypt contract.

use std::sync::Arc;

use proptest::prelude::*;
use tokenshield::key_manager::KeyManager;
use tokenshield::store::{InMemoryStore, Store};

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_encrypt_decrypt_round_trip(plaintext in prop::collection::vec(any::<u8>(), 0..256)) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
            let manager = KeyManager::initialize(store).await.unwrap();

            let (ciphertext, dek_id) = manager.encrypt_with_current_dek(&plaintext).await.unwrap();
            let recovered = manager.decrypt_with(&ciphertext, &dek_id).await.unwrap();
            prop_assert_eq!(recovered, plaintext);
            Ok(())
        })?;
    }

    #[test]
    fn prop_tampering_any_single_byte_breaks_decryption(
        plaintext in prop::collection::vec(any::<u8>(), 1..128),
        flip_index in 0usize..128,
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
            let manager = KeyManager::initialize(store).await.unwrap();

            let (mut ciphertext, dek_id) = manager.encrypt_with_current_dek(&plaintext).await.unwrap();
            let index = flip_index % ciphertext.len();
            ciphertext[index] ^= 0x01;

            prop_assert!(manager.decrypt_with(&ciphertext, &dek_id).await.is_err());
            Ok(())
        })?;
    }

    #[test]
    fn prop_ciphertext_never_contains_plaintext_verbatim(
        plaintext in "[0-9]{16,19}",
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
            let manager = KeyManager::initialize(store).await.unwrap();

            let (ciphertext, _) = manager.encrypt_with_current_dek(plaintext.as_bytes()).await.unwrap();
            let ciphertext_text = String::from_utf8_lossy(&ciphertext);
            prop_assert!(!ciphertext_text.contains(&plaintext));
            Ok(())
        })?;
    }
}

//! In-memory [`Store`] implementation for tests and database-free local runs.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use super::models::{KeyRecord, KeyStatus, KeyType, RequestEvent, TokenRecord};
use super::Store;
use crate::error::StoreError;

#[derive(Default)]
struct Inner {
    tokens: HashMap<String, TokenRecord>,
    keys: HashMap<String, KeyRecord>,
}

/// `Mutex`-guarded `HashMap` pair standing in for Postgres in tests.
///
/// Mirrors the same uniqueness and active-only semantics `PostgresStore`
/// enforces via SQL, so tests against `InMemoryStore` exercise the same
/// contract callers see in production.
#[derive(Default)]
pub struct InMemoryStore {
    inner: Mutex<Inner>,
}

impl InMemoryStore {
    /// Build an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn insert_token(&self, record: TokenRecord) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().expect("lock poisoned");
        if inner.tokens.contains_key(&record.token) {
            return Err(StoreError::Duplicate(record.token));
        }
        inner.tokens.insert(record.token.clone(), record);
        Ok(())
    }

    async fn get_active_token(&self, token: &str) -> Result<Option<TokenRecord>, StoreError> {
        let inner = self.inner.lock().expect("lock poisoned");
        Ok(inner
            .tokens
            .get(token)
            .filter(|r| r.is_active)
            .cloned())
    }

    async fn revoke_token(&self, token: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().expect("lock poisoned");
        if let Some(record) = inner.tokens.get_mut(token) {
            record.is_active = false;
        }
        Ok(())
    }

    async fn get_active_key(&self, key_type: KeyType) -> Result<Option<KeyRecord>, StoreError> {
        let inner = self.inner.lock().expect("lock poisoned");
        Ok(inner
            .keys
            .values()
            .filter(|k| k.key_type == key_type && k.status == KeyStatus::Active)
            .max_by_key(|k| k.version)
            .cloned())
    }

    async fn get_key(&self, key_id: &str) -> Result<Option<KeyRecord>, StoreError> {
        let inner = self.inner.lock().expect("lock poisoned");
        Ok(inner.keys.get(key_id).cloned())
    }

    async fn max_key_version(&self, key_type: KeyType) -> Result<i32, StoreError> {
        let inner = self.inner.lock().expect("lock poisoned");
        Ok(inner
            .keys
            .values()
            .filter(|k| k.key_type == key_type)
            .map(|k| k.version)
            .max()
            .unwrap_or(0))
    }

    async fn insert_key(&self, record: KeyRecord) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().expect("lock poisoned");
        if inner.keys.contains_key(&record.key_id) {
            return Err(StoreError::Duplicate(record.key_id));
        }
        inner.keys.insert(record.key_id.clone(), record);
        Ok(())
    }

    async fn record_event(&self, _event: RequestEvent) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample_token(token: &str) -> TokenRecord {
        TokenRecord {
            token: token.to_string(),
            encrypted_pan: vec![1, 2, 3],
            card_type: crate::card_type::CardType::Visa,
            first_six: "453201".to_string(),
            last_four: "0366".to_string(),
            key_id: Some("dek-1".to_string()),
            is_active: true,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_insert_and_get_active_token() {
        let store = InMemoryStore::new();
        store.insert_token(sample_token("tok_a")).await.unwrap();
        let found = store.get_active_token("tok_a").await.unwrap();
        assert!(found.is_some());
    }

    #[tokio::test]
    async fn test_duplicate_insert_rejected() {
        let store = InMemoryStore::new();
        store.insert_token(sample_token("tok_a")).await.unwrap();
        let err = store.insert_token(sample_token("tok_a")).await.unwrap_err();
        assert!(err.is_duplicate());
    }

    #[tokio::test]
    async fn test_revoked_token_not_returned_as_active() {
        let store = InMemoryStore::new();
        store.insert_token(sample_token("tok_a")).await.unwrap();
        store.revoke_token("tok_a").await.unwrap();
        assert!(store.get_active_token("tok_a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_missing_token_is_none() {
        let store = InMemoryStore::new();
        assert!(store.get_active_token("nope").await.unwrap().is_none());
    }
}

//! Persistent store abstraction (spec.md §3, component #1).
//!
//! A thin async trait over the two tables the core depends on
//! (`credit_cards`, `encryption_keys`) plus the append-only
//! `request_events` log, implemented once against Postgres via `sqlx`
//! ([`postgres::PostgresStore`]) and once in memory for tests and local
//! development without a database ([`memory::InMemoryStore`]).

pub mod memory;
pub mod models;
pub mod postgres;

pub use memory::InMemoryStore;
pub use models::{KeyRecord, KeyStatus, KeyType, RequestEvent, RequestType, TokenRecord};
pub use postgres::PostgresStore;

use async_trait::async_trait;

use crate::error::StoreError;

/// Persistence contract the Key Manager and Token Engine depend on.
#[async_trait]
pub trait Store: Send + Sync {
    /// Insert a new token record. Returns [`StoreError::Duplicate`] if
    /// `token` already exists so callers can regenerate and retry.
    async fn insert_token(&self, record: TokenRecord) -> Result<(), StoreError>;

    /// Look up a token record. Per spec.md §4.3, only `is_active = true`
    /// records are returned — callers treat a miss as "not found", never
    /// distinguishing "absent" from "revoked".
    async fn get_active_token(&self, token: &str) -> Result<Option<TokenRecord>, StoreError>;

    /// Flip a token record's `is_active` to `false`. Idempotent.
    async fn revoke_token(&self, token: &str) -> Result<(), StoreError>;

    /// The currently active key record for `key_type`, if any.
    async fn get_active_key(&self, key_type: KeyType) -> Result<Option<KeyRecord>, StoreError>;

    /// Look up any key record (active or retired) by id.
    async fn get_key(&self, key_id: &str) -> Result<Option<KeyRecord>, StoreError>;

    /// Highest existing `version` for `key_type`, or 0 if none exist.
    async fn max_key_version(&self, key_type: KeyType) -> Result<i32, StoreError>;

    /// Insert a new key record. Returns [`StoreError::Duplicate`] if
    /// `key_id` already exists — per spec.md §4.1 this is a bug and MUST
    /// abort the caller, never retry.
    async fn insert_key(&self, record: KeyRecord) -> Result<(), StoreError>;

    /// Append one request event. The table is append-only.
    async fn record_event(&self, event: RequestEvent) -> Result<(), StoreError>;
}

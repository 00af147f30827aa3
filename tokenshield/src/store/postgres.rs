//! Postgres-backed [`Store`] implementation.
//!
//! Plain `sqlx` query code, no ORM layer — matching the teacher stack's
//! preference for explicit queries elsewhere (`database-layer` in the
//! wider example pack follows the same shape). Pool sizing follows
//! spec.md §5's reference numbers (open=25, idle=5, max-lifetime=5m),
//! set by [`PostgresStore::connect`] from [`crate::config::Config`].

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use std::time::Duration;

use super::models::{KeyRecord, KeyStatus, KeyType, RequestEvent, RequestType, TokenRecord};
use super::Store;
use crate::card_type::CardType;
use crate::config::Config;
use crate::error::StoreError;

/// Postgres-backed store over `credit_cards`, `encryption_keys`, and
/// `request_events`.
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Connect using the pool sizing from `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the pool cannot be established (fatal at
    /// startup, per spec.md §4.1's KEK-load failure semantics — the store
    /// must be reachable before the Key Manager can run).
    pub async fn connect(config: &Config) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.db_max_connections)
            .min_connections(config.db_min_connections)
            .max_lifetime(Some(config.db_max_lifetime))
            .acquire_timeout(Duration::from_secs(10))
            .connect(&config.database_url)
            .await?;

        Ok(Self { pool })
    }

    /// Build directly from an existing pool (used by tests against a
    /// disposable database).
    #[must_use]
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn key_type_from_str(s: &str) -> KeyType {
    match s {
        "DEK" => KeyType::Dek,
        _ => KeyType::Kek,
    }
}

fn key_status_from_str(s: &str) -> KeyStatus {
    match s {
        "rotating" => KeyStatus::Rotating,
        "retired" => KeyStatus::Retired,
        "compromised" => KeyStatus::Compromised,
        _ => KeyStatus::Active,
    }
}

fn request_type_to_str(rt: RequestType) -> &'static str {
    match rt {
        RequestType::Tokenize => "tokenize",
        RequestType::Detokenize => "detokenize",
        RequestType::Forward => "forward",
    }
}

#[async_trait]
impl Store for PostgresStore {
    async fn insert_token(&self, record: TokenRecord) -> Result<(), StoreError> {
        let result = sqlx::query(
            "INSERT INTO credit_cards \
             (token, encrypted_pan, card_type, first_six, last_four, key_id, is_active, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(&record.token)
        .bind(&record.encrypted_pan)
        .bind(record.card_type.as_str())
        .bind(&record.first_six)
        .bind(&record.last_four)
        .bind(&record.key_id)
        .bind(record.is_active)
        .bind(record.created_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Err(StoreError::Duplicate(record.token))
            }
            Err(e) => Err(StoreError::Database(e)),
        }
    }

    async fn get_active_token(&self, token: &str) -> Result<Option<TokenRecord>, StoreError> {
        let row = sqlx::query(
            "SELECT token, encrypted_pan, card_type, first_six, last_four, key_id, is_active, created_at \
             FROM credit_cards WHERE token = $1 AND is_active = true",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| TokenRecord {
            token: r.get("token"),
            encrypted_pan: r.get("encrypted_pan"),
            card_type: CardType::from_str(r.get::<String, _>("card_type").as_str()),
            first_six: r.get("first_six"),
            last_four: r.get("last_four"),
            key_id: r.get("key_id"),
            is_active: r.get("is_active"),
            created_at: r.get("created_at"),
        }))
    }

    async fn revoke_token(&self, token: &str) -> Result<(), StoreError> {
        sqlx::query("UPDATE credit_cards SET is_active = false WHERE token = $1")
            .bind(token)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_active_key(&self, key_type: KeyType) -> Result<Option<KeyRecord>, StoreError> {
        let row = sqlx::query(
            "SELECT key_id, key_type, version, wrapped_material, status, metadata, created_at, activated_at \
             FROM encryption_keys WHERE key_type = $1 AND status = 'active' \
             ORDER BY version DESC LIMIT 1",
        )
        .bind(key_type.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(row_to_key_record))
    }

    async fn get_key(&self, key_id: &str) -> Result<Option<KeyRecord>, StoreError> {
        let row = sqlx::query(
            "SELECT key_id, key_type, version, wrapped_material, status, metadata, created_at, activated_at \
             FROM encryption_keys WHERE key_id = $1",
        )
        .bind(key_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(row_to_key_record))
    }

    async fn max_key_version(&self, key_type: KeyType) -> Result<i32, StoreError> {
        let row = sqlx::query(
            "SELECT COALESCE(MAX(version), 0) AS max_version FROM encryption_keys WHERE key_type = $1",
        )
        .bind(key_type.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get("max_version"))
    }

    async fn insert_key(&self, record: KeyRecord) -> Result<(), StoreError> {
        let result = sqlx::query(
            "INSERT INTO encryption_keys \
             (key_id, key_type, version, wrapped_material, status, metadata, created_at, activated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(&record.key_id)
        .bind(record.key_type.as_str())
        .bind(record.version)
        .bind(&record.wrapped_material)
        .bind(record.status.as_str())
        .bind(&record.metadata)
        .bind(record.created_at)
        .bind(record.activated_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Err(StoreError::Duplicate(record.key_id))
            }
            Err(e) => Err(StoreError::Database(e)),
        }
    }

    async fn record_event(&self, event: RequestEvent) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO request_events \
             (token, request_type, source_ip, destination_url, response_status, timestamp) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(&event.token)
        .bind(request_type_to_str(event.request_type))
        .bind(&event.source_ip)
        .bind(&event.destination_url)
        .bind(event.response_status.map(i32::from))
        .bind(event.timestamp)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn row_to_key_record(r: sqlx::postgres::PgRow) -> KeyRecord {
    KeyRecord {
        key_id: r.get("key_id"),
        key_type: key_type_from_str(r.get::<String, _>("key_type").as_str()),
        version: r.get("version"),
        wrapped_material: r.get("wrapped_material"),
        status: key_status_from_str(r.get::<String, _>("status").as_str()),
        metadata: r.get("metadata"),
        created_at: r.get("created_at"),
        activated_at: r.get("activated_at"),
    }
}

//! Row types for the persistent store (spec.md §3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::card_type::CardType;

/// One tokenized PAN (`credit_cards` table).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenRecord {
    /// Unique opaque token string; primary identifier.
    pub token: String,
    /// Ciphertext produced by the encryption facade.
    pub encrypted_pan: Vec<u8>,
    /// Card brand derived from the PAN prefix at tokenization time.
    pub card_type: CardType,
    /// First six digits, preserved in plaintext for search/display.
    pub first_six: String,
    /// Last four digits, preserved in plaintext for search/display.
    pub last_four: String,
    /// DEK identifier, present iff KEK/DEK mode produced the ciphertext.
    pub key_id: Option<String>,
    /// Whether this record is eligible for detokenization.
    pub is_active: bool,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// Which hierarchy level an encryption-key record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum KeyType {
    /// Key Encryption Key; long-lived, wraps DEKs.
    Kek,
    /// Data Encryption Key; rotated more frequently, encrypts PANs.
    Dek,
}

impl KeyType {
    /// Storage-column representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Kek => "KEK",
            Self::Dek => "DEK",
        }
    }
}

/// Lifecycle status of an encryption-key record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyStatus {
    /// Currently used for new operations (at most one per `key_type`).
    Active,
    /// Rotation in progress; still usable for historical decryption.
    Rotating,
    /// Fully retired; usable only for historical decryption.
    Retired,
    /// Marked compromised; never issued but retained for audit history.
    Compromised,
}

impl KeyStatus {
    /// Storage-column representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Rotating => "rotating",
            Self::Retired => "retired",
            Self::Compromised => "compromised",
        }
    }
}

/// One KEK or DEK version (`encryption_keys` table).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyRecord {
    /// Unique opaque key identifier.
    pub key_id: String,
    /// KEK or DEK.
    pub key_type: KeyType,
    /// Monotonically increasing version per `key_type`.
    pub version: i32,
    /// For DEKs: ciphertext under the KEK. For KEKs: the key itself
    /// (acknowledged placeholder for HSM-managed custody).
    pub wrapped_material: Vec<u8>,
    /// Lifecycle status.
    pub status: KeyStatus,
    /// Structured metadata; for DEKs, names the wrapping `kek_id`.
    pub metadata: serde_json::Value,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Activation timestamp.
    pub activated_at: DateTime<Utc>,
}

impl KeyRecord {
    /// The `kek_id` a DEK record's metadata names, if present.
    #[must_use]
    pub fn wrapping_kek_id(&self) -> Option<&str> {
        self.metadata.get("kek_id").and_then(|v| v.as_str())
    }
}

/// One tokenize/detokenize/forward operation (`request_events` table,
/// append-only).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestEvent {
    /// Token involved in the operation, if any.
    pub token: Option<String>,
    /// Kind of operation recorded.
    pub request_type: RequestType,
    /// Client source IP, when known.
    pub source_ip: Option<String>,
    /// Forwarded destination URL, when applicable.
    pub destination_url: Option<String>,
    /// Response status returned to the caller, when applicable.
    pub response_status: Option<u16>,
    /// When the event occurred.
    pub timestamp: DateTime<Utc>,
}

/// Kind of event recorded in `request_events`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestType {
    /// A PAN was tokenized.
    Tokenize,
    /// A token was resolved back to a PAN.
    Detokenize,
    /// A request was forwarded without a tokenize/detokenize outcome.
    Forward,
}

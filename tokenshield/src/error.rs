//! Error types for the TokenShield core.
//!
//! Three error families exist by design, mirroring spec.md's taxonomy:
//! [`TokenShieldError`] at the service boundary (retryability classified,
//! following `rust_common::PlatformError`), [`CryptoError`] for the key
//! manager and encryption facade (never carries plaintext, collapses to
//! "not found" at the rewriter), and [`RewriteError`] which the rewriter
//! itself never lets escape — it is always caught and converted to a
//! fail-open pass-through.

use thiserror::Error;

/// Errors surfaced at the service boundary (HTTP forwarder, ICAP, config).
#[derive(Error, Debug)]
pub enum TokenShieldError {
    /// The inbound request body could not be read.
    #[error("failed to read request body: {0}")]
    BodyRead(String),

    /// Dispatch to the downstream application failed.
    #[error("failed to reach application endpoint: {0}")]
    Dispatch(#[from] reqwest::Error),

    /// The circuit breaker guarding the application endpoint is open.
    #[error("circuit breaker open for application endpoint")]
    CircuitOpen,

    /// The downstream application's response could not be read.
    #[error("failed to read response body: {0}")]
    ResponseRead(String),

    /// A storage operation failed.
    #[error("storage error: {0}")]
    Storage(#[from] StoreError),

    /// Configuration was invalid or incomplete at startup.
    #[error("configuration error: {0}")]
    Config(String),

    /// Tokenization could not complete; the request MUST be rejected
    /// rather than forwarded, per spec.md's fail-closed tokenize policy.
    #[error("tokenization failed: {0}")]
    TokenizeFailed(String),
}

impl TokenShieldError {
    /// Whether the caller may reasonably retry the operation.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Dispatch(_) | Self::CircuitOpen => true,
            Self::Storage(e) => e.is_retryable(),
            Self::BodyRead(_) | Self::ResponseRead(_) | Self::Config(_) | Self::TokenizeFailed(_) => false,
        }
    }

    /// HTTP status code this error maps to at the forwarder boundary.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::BodyRead(_) => 400,
            Self::Dispatch(_) | Self::CircuitOpen => 502,
            Self::ResponseRead(_) => 500,
            Self::Storage(_) | Self::TokenizeFailed(_) | Self::Config(_) => 500,
        }
    }
}

/// Errors from the persistent store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The underlying database call failed.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A unique-key insertion collided (e.g. a regenerated token string
    /// that happened to already exist).
    #[error("unique constraint violated for {0}")]
    Duplicate(String),

    /// A record that callers expected to exist was not found.
    #[error("not found: {0}")]
    NotFound(String),
}

impl StoreError {
    /// Whether the underlying failure is transient (connection/timeout).
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Database(sqlx::Error::PoolTimedOut | sqlx::Error::Io(_)) => true,
            Self::Database(_) | Self::Duplicate(_) | Self::NotFound(_) => false,
        }
    }

    /// True if this error represents a unique-constraint collision on `token`.
    #[must_use]
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate(_))
    }
}

/// Errors from the Key Manager and encryption facade.
///
/// Deliberately does not implement `From<sqlx::Error>` with passthrough of
/// any plaintext-bearing context: every variant carries only enough
/// information to log and classify, never key material or plaintext.
#[derive(Error, Debug)]
pub enum CryptoError {
    /// AES-GCM authentication tag did not verify; the ciphertext is either
    /// corrupt or was encrypted under a different key.
    #[error("decryption failed: authentication tag mismatch")]
    DecryptionFailure,

    /// The DEK or KEK named by a record's metadata could not be loaded.
    #[error("key unavailable: {0}")]
    KeyUnavailable(String),

    /// A cryptographic key had an unexpected length.
    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength {
        /// Expected key length in bytes.
        expected: usize,
        /// Actual key length in bytes.
        actual: usize,
    },

    /// The store reported an error while loading or persisting key material.
    #[error("key store error: {0}")]
    Store(#[from] StoreError),

    /// Inserting a key record collided with an existing `key_id`; this is
    /// a bug (key IDs are generated, never reused) and must abort.
    #[error("duplicate key_id on insert: {0}")]
    DuplicateKeyId(String),
}

impl CryptoError {
    /// Whether this failure should be treated as fatal at startup.
    #[must_use]
    pub fn is_fatal_at_startup(&self) -> bool {
        !matches!(self, Self::DecryptionFailure)
    }
}

/// Errors the rewriter can encounter while walking a document.
///
/// Every call site catches this and falls back to the original bytes —
/// spec.md's fail-open policy for content rewriting.
#[derive(Error, Debug)]
pub enum RewriteError {
    /// The body was not valid JSON.
    #[error("invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// Tokenization or detokenization of a qualifying field failed.
    #[error("tokenize/detokenize failed: {0}")]
    EngineFailure(String),
}

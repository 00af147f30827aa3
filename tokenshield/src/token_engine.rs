//! Token generation, tokenize, and detokenize pipelines (spec.md §4.3).

use chrono::Utc;
use tracing::warn;

use crate::card_type::CardType;
use crate::config::TokenFormat;
use crate::encryption::EncryptionFacade;
use crate::error::TokenShieldError;
use crate::store::{RequestEvent, RequestType, Store, TokenRecord};
use crate::token_format;

/// Bounded retry count for token-collision regeneration. Not a
/// `rust_common::RetryPolicy` since the failure is a uniqueness
/// violation, not a transient timeout — no backoff delay is warranted
/// between attempts.
const MAX_TOKEN_ATTEMPTS: u32 = 3;

/// Tokenizes PANs and resolves tokens back to PANs.
pub struct TokenEngine {
    store: std::sync::Arc<dyn Store>,
    facade: EncryptionFacade,
    token_format: TokenFormat,
}

impl TokenEngine {
    /// Build an engine over `store`, encrypting with `facade` and
    /// generating tokens in `token_format`.
    #[must_use]
    pub fn new(store: std::sync::Arc<dyn Store>, facade: EncryptionFacade, token_format: TokenFormat) -> Self {
        Self {
            store,
            facade,
            token_format,
        }
    }

    /// Tokenize `pan`, persisting a new active token record and
    /// recording a `tokenize` event.
    ///
    /// # Errors
    ///
    /// Returns [`TokenShieldError::TokenizeFailed`] if encryption fails
    /// (the operation aborts without writing) or the collision-retry
    /// budget is exhausted. Propagates [`TokenShieldError::Storage`] for
    /// any other storage failure.
    pub async fn tokenize(&self, pan: &str, source_ip: Option<String>) -> Result<String, TokenShieldError> {
        let digits = digits_only(pan);
        let card_type = CardType::detect(pan);
        let first_six = prefix_digits(&digits, 6);
        let last_four = suffix_digits(&digits, 4);

        let (encrypted_pan, key_id) = self
            .facade
            .encrypt(pan.as_bytes())
            .await
            .map_err(|e| TokenShieldError::TokenizeFailed(format!("encryption failed: {e}")))?;

        let mut last_collision = None;
        let token = 'attempts: loop {
            for _ in 0..MAX_TOKEN_ATTEMPTS {
                let candidate = token_format::generate(self.token_format);
                let record = TokenRecord {
                    token: candidate.clone(),
                    encrypted_pan: encrypted_pan.clone(),
                    card_type,
                    first_six: first_six.clone(),
                    last_four: last_four.clone(),
                    key_id: key_id.clone(),
                    is_active: true,
                    created_at: Utc::now(),
                };

                match self.store.insert_token(record).await {
                    Ok(()) => break 'attempts candidate,
                    Err(e) if e.is_duplicate() => {
                        warn!(token = %candidate, "token collision, regenerating");
                        last_collision = Some(e);
                        continue;
                    }
                    Err(e) => return Err(TokenShieldError::Storage(e)),
                }
            }
            return Err(TokenShieldError::TokenizeFailed(format!(
                "exhausted {MAX_TOKEN_ATTEMPTS} token-collision retries: {}",
                last_collision.map(|e| e.to_string()).unwrap_or_default()
            )));
        };

        self.store
            .record_event(RequestEvent {
                token: Some(token.clone()),
                request_type: RequestType::Tokenize,
                source_ip,
                destination_url: None,
                response_status: None,
                timestamp: Utc::now(),
            })
            .await?;

        Ok(token)
    }

    /// Resolve `token` back to its plaintext PAN.
    ///
    /// Returns `Ok(None)` both when the token is unknown/inactive and
    /// when decryption fails — per spec.md §4.3 this never distinguishes
    /// the two to callers, and a decryption failure is logged rather than
    /// propagated as a plaintext leak.
    ///
    /// # Errors
    ///
    /// Propagates [`TokenShieldError::Storage`] for storage failures.
    pub async fn detokenize(&self, token: &str, source_ip: Option<String>) -> Result<Option<String>, TokenShieldError> {
        let Some(record) = self.store.get_active_token(token).await? else {
            return Ok(None);
        };

        let plaintext = match self.facade.decrypt(&record.encrypted_pan, record.key_id.as_deref()).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(token, error = %e, "detokenize decryption failed, treating as not found");
                return Ok(None);
            }
        };

        let pan = String::from_utf8(plaintext)
            .map_err(|_| TokenShieldError::TokenizeFailed("decrypted PAN was not valid UTF-8".to_string()))?;

        self.store
            .record_event(RequestEvent {
                token: Some(token.to_string()),
                request_type: RequestType::Detokenize,
                source_ip,
                destination_url: None,
                response_status: None,
                timestamp: Utc::now(),
            })
            .await?;

        Ok(Some(pan))
    }
}

fn digits_only(pan: &str) -> String {
    pan.chars().filter(|c| !matches!(c, ' ' | '-')).collect()
}

fn prefix_digits(digits: &str, n: usize) -> String {
    digits.chars().take(n).collect()
}

fn suffix_digits(digits: &str, n: usize) -> String {
    let len = digits.chars().count();
    digits.chars().skip(len.saturating_sub(n)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use std::sync::Arc;

    fn engine() -> TokenEngine {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let facade = EncryptionFacade::legacy([9u8; 32]);
        TokenEngine::new(store, facade, TokenFormat::Prefix)
    }

    #[tokio::test]
    async fn test_tokenize_then_detokenize_round_trip() {
        let engine = engine();
        let token = engine.tokenize("4532015112830366", None).await.unwrap();
        assert!(token.starts_with("tok_"));

        let pan = engine.detokenize(&token, None).await.unwrap();
        assert_eq!(pan.as_deref(), Some("4532015112830366"));
    }

    #[tokio::test]
    async fn test_detokenize_unknown_token_is_not_found() {
        let engine = engine();
        assert!(engine.detokenize("tok_does_not_exist", None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_revoked_token_is_not_found() {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let facade = EncryptionFacade::legacy([9u8; 32]);
        let engine = TokenEngine::new(store.clone(), facade, TokenFormat::Prefix);

        let token = engine.tokenize("4532015112830366", None).await.unwrap();
        store.revoke_token(&token).await.unwrap();

        assert!(engine.detokenize(&token, None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_first_six_last_four_derived_correctly() {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let facade = EncryptionFacade::legacy([9u8; 32]);
        let engine = TokenEngine::new(store.clone(), facade, TokenFormat::Prefix);

        let token = engine.tokenize("4532-0151-1283-0366", None).await.unwrap();
        let record = store.get_active_token(&token).await.unwrap().unwrap();
        assert_eq!(record.first_six, "453201");
        assert_eq!(record.last_four, "0366");
        assert_eq!(record.card_type, CardType::Visa);
    }

    #[tokio::test]
    async fn test_luhn_format_tokens_are_luhn_valid() {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let facade = EncryptionFacade::legacy([9u8; 32]);
        let engine = TokenEngine::new(store, facade, TokenFormat::Luhn);

        let token = engine.tokenize("4532015112830366", None).await.unwrap();
        assert!(token_format::passes_luhn(&token));
        assert!(token.starts_with(token_format::LUHN_SENTINEL));
    }
}

//! JSON tokenize/detokenize walks (spec.md §4.4).
//!
//! Operates directly on `serde_json::Value` rather than typed structs —
//! the rewriter has no fixed schema to target, it scopes itself purely by
//! field name, so a dynamic tree walk is the natural shape here.

use futures::future::BoxFuture;
use serde_json::Value;

use super::fields::is_qualifying_field;
use crate::config::TokenFormat;
use crate::error::RewriteError;
use crate::pan;
use crate::token_engine::TokenEngine;
use crate::token_format::{self, LUHN_SENTINEL};

/// Depth-first tokenize walk. Replaces every qualifying string field that
/// looks like a PAN with a freshly issued token. Returns whether anything
/// was modified — callers rely on this to skip re-serializing when
/// nothing changed.
///
/// # Errors
///
/// Returns [`RewriteError::EngineFailure`] if tokenization fails for a
/// matched value; the caller is expected to fall back to the original
/// bytes on error (spec.md's fail-open rewriter policy).
pub async fn tokenize_walk(
    value: &mut Value,
    engine: &TokenEngine,
    token_format: TokenFormat,
    source_ip: Option<&str>,
) -> Result<bool, RewriteError> {
    let mut modified = false;
    walk_tokenize(value, engine, token_format, source_ip, &mut modified).await?;
    Ok(modified)
}

fn walk_tokenize<'a>(
    value: &'a mut Value,
    engine: &'a TokenEngine,
    token_format: TokenFormat,
    source_ip: Option<&'a str>,
    modified: &'a mut bool,
) -> BoxFuture<'a, Result<(), RewriteError>> {
    Box::pin(async move {
        match value {
            Value::Object(map) => {
                for (key, entry) in map.iter_mut() {
                    if is_qualifying_field(key) {
                        if let Value::String(s) = entry {
                            let already_tokenized =
                                token_format == TokenFormat::Luhn && s.starts_with(LUHN_SENTINEL);
                            if pan::looks_like_pan(s) && !already_tokenized {
                                let token = engine
                                    .tokenize(s, source_ip.map(str::to_string))
                                    .await
                                    .map_err(|e| RewriteError::EngineFailure(e.to_string()))?;
                                *s = token;
                                *modified = true;
                                continue;
                            }
                        }
                    }
                    walk_tokenize(entry, engine, token_format, source_ip, modified).await?;
                }
            }
            Value::Array(items) => {
                for item in items.iter_mut() {
                    walk_tokenize(item, engine, token_format, source_ip, modified).await?;
                }
            }
            _ => {}
        }
        Ok(())
    })
}

/// Depth-first detokenize walk. Replaces every qualifying string field
/// that matches the token regex with its resolved PAN; misses are left
/// untouched. Returns whether anything was modified.
///
/// # Errors
///
/// Returns [`RewriteError::EngineFailure`] if the store cannot be reached;
/// a token simply not resolving is not an error (see [`Self::detokenize`]
/// semantics — treated as "leave as-is").
pub async fn detokenize_walk(
    value: &mut Value,
    engine: &TokenEngine,
    token_format: TokenFormat,
    source_ip: Option<&str>,
) -> Result<bool, RewriteError> {
    let mut modified = false;
    walk_detokenize(value, engine, token_format, source_ip, &mut modified).await?;
    Ok(modified)
}

fn walk_detokenize<'a>(
    value: &'a mut Value,
    engine: &'a TokenEngine,
    token_format: TokenFormat,
    source_ip: Option<&'a str>,
    modified: &'a mut bool,
) -> BoxFuture<'a, Result<(), RewriteError>> {
    Box::pin(async move {
        match value {
            Value::Object(map) => {
                for (key, entry) in map.iter_mut() {
                    if is_qualifying_field(key) {
                        if let Value::String(s) = entry {
                            if token_format::looks_like_token(s, token_format) {
                                let resolved = engine
                                    .detokenize(s, source_ip.map(str::to_string))
                                    .await
                                    .map_err(|e| RewriteError::EngineFailure(e.to_string()))?;
                                if let Some(pan) = resolved {
                                    *s = pan;
                                    *modified = true;
                                }
                                continue;
                            }
                        }
                    }
                    walk_detokenize(entry, engine, token_format, source_ip, modified).await?;
                }
            }
            Value::Array(items) => {
                for item in items.iter_mut() {
                    walk_detokenize(item, engine, token_format, source_ip, modified).await?;
                }
            }
            _ => {}
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encryption::EncryptionFacade;
    use crate::store::InMemoryStore;
    use serde_json::json;
    use std::sync::Arc;

    fn engine() -> TokenEngine {
        let store: Arc<dyn crate::store::Store> = Arc::new(InMemoryStore::new());
        TokenEngine::new(store, EncryptionFacade::legacy([5u8; 32]), TokenFormat::Prefix)
    }

    #[tokio::test]
    async fn test_tokenize_walk_replaces_qualifying_pan() {
        let engine = engine();
        let mut doc = json!({"card_number": "4532015112830366", "order_id": "4532015112830366"});

        let modified = tokenize_walk(&mut doc, &engine, TokenFormat::Prefix, None).await.unwrap();

        assert!(modified);
        assert!(doc["card_number"].as_str().unwrap().starts_with("tok_"));
        assert_eq!(doc["order_id"], "4532015112830366");
    }

    #[tokio::test]
    async fn test_tokenize_walk_leaves_cards_array_alone() {
        let engine = engine();
        let mut doc = json!({"cards": ["4532015112830366"]});

        let modified = tokenize_walk(&mut doc, &engine, TokenFormat::Prefix, None).await.unwrap();

        assert!(!modified);
        assert_eq!(doc["cards"][0], "4532015112830366");
    }

    #[tokio::test]
    async fn test_tokenize_then_detokenize_walk_round_trip() {
        let engine = engine();
        let mut doc = json!({"card": "4532015112830366"});
        tokenize_walk(&mut doc, &engine, TokenFormat::Prefix, None).await.unwrap();

        let modified = detokenize_walk(&mut doc, &engine, TokenFormat::Prefix, None).await.unwrap();
        assert!(modified);
        assert_eq!(doc["card"], "4532015112830366");
    }

    #[tokio::test]
    async fn test_no_match_is_byte_equal() {
        let engine = engine();
        let mut doc = json!({"amount": 42, "note": "nothing card-shaped here"});
        let before = doc.clone();

        let modified = tokenize_walk(&mut doc, &engine, TokenFormat::Prefix, None).await.unwrap();

        assert!(!modified);
        assert_eq!(doc, before);
    }

    #[tokio::test]
    async fn test_nested_objects_and_arrays_are_recursed() {
        let engine = engine();
        let mut doc = json!({"billing": {"account_number": "4532015112830366"}, "items": [{"pan": "340000000000009"}]});

        let modified = tokenize_walk(&mut doc, &engine, TokenFormat::Prefix, None).await.unwrap();

        assert!(modified);
        assert!(doc["billing"]["account_number"].as_str().unwrap().starts_with("tok_"));
        assert!(doc["items"][0]["pan"].as_str().unwrap().starts_with("tok_"));
    }
}

//! HTML detokenize fallback (spec.md §4.4).
//!
//! A textual pass over the raw response body: no HTML parsing, no
//! field-scope check. Every non-overlapping token-regex match is resolved
//! and substituted; a distinct token appearing many times in one page is
//! only looked up once.

use std::collections::HashMap;

use crate::config::TokenFormat;
use crate::error::RewriteError;
use crate::token_engine::TokenEngine;
use crate::token_format;

/// Replace every token-shaped substring of `body` with its resolved PAN.
/// Tokens that do not resolve are left exactly as they appeared.
///
/// # Errors
///
/// Returns [`RewriteError::EngineFailure`] if the store cannot be
/// reached; a token simply not resolving is not an error.
pub async fn detokenize_html(
    body: &str,
    engine: &TokenEngine,
    token_format: TokenFormat,
    source_ip: Option<&str>,
) -> Result<String, RewriteError> {
    let re = token_format::recognizer(token_format);
    let mut resolved_cache: HashMap<String, Option<String>> = HashMap::new();
    let mut out = String::with_capacity(body.len());
    let mut last_end = 0;

    for m in re.find_iter(body) {
        out.push_str(&body[last_end..m.start()]);
        let matched = m.as_str();

        if !resolved_cache.contains_key(matched) {
            let pan = engine
                .detokenize(matched, source_ip.map(str::to_string))
                .await
                .map_err(|e| RewriteError::EngineFailure(e.to_string()))?;
            resolved_cache.insert(matched.to_string(), pan);
        }

        match resolved_cache.get(matched).and_then(Option::as_ref) {
            Some(pan) => out.push_str(pan),
            None => out.push_str(matched),
        }
        last_end = m.end();
    }
    out.push_str(&body[last_end..]);

    Ok(out)
}

//! Token generation and recognition (spec.md §4.3).
//!
//! Two interchangeable formats are supported, selected once at startup.
//! Each format owns a paired recognition regex so the rewriter never has
//! to special-case which format is active beyond picking the right regex.

use once_cell::sync::Lazy;
use rand::RngCore;
use regex::Regex;

use crate::config::TokenFormat;

/// `tok_` followed by URL-safe base64 (with padding) of 32 random bytes.
pub static TOKEN_PREFIX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"tok_[A-Za-z0-9_\-]+=*").expect("fixed pattern"));

/// Word-bounded sixteen decimal digits beginning with the `9999` sentinel.
pub static TOKEN_LUHN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b9999[0-9]{12}\b").expect("fixed pattern"));

/// The unassigned-IIN sentinel prefix Luhn-format tokens always begin with.
pub const LUHN_SENTINEL: &str = "9999";

/// Generate a fresh token string in the given format.
#[must_use]
pub fn generate(format: TokenFormat) -> String {
    match format {
        TokenFormat::Prefix => generate_prefix(),
        TokenFormat::Luhn => generate_luhn(),
    }
}

/// Regex recognizing tokens in the given format.
#[must_use]
pub fn recognizer(format: TokenFormat) -> &'static Regex {
    match format {
        TokenFormat::Prefix => &TOKEN_PREFIX_RE,
        TokenFormat::Luhn => &TOKEN_LUHN_RE,
    }
}

/// True if `value` is shaped like a token in the given format.
#[must_use]
pub fn looks_like_token(value: &str, format: TokenFormat) -> bool {
    let re = recognizer(format);
    re.find(value).is_some_and(|m| m.start() == 0 && m.end() == value.len())
}

fn generate_prefix() -> String {
    use base64::Engine;
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    let encoded = base64::engine::general_purpose::URL_SAFE.encode(bytes);
    format!("tok_{encoded}")
}

fn generate_luhn() -> String {
    let mut rng = rand::thread_rng();
    let mut digits = String::with_capacity(16);
    digits.push_str(LUHN_SENTINEL);
    for _ in 0..11 {
        let d = (rng.next_u32() % 10) as u8;
        digits.push((b'0' + d) as char);
    }
    let check = luhn_check_digit(&digits);
    digits.push((b'0' + check) as char);
    debug_assert!(passes_luhn(&digits));
    digits
}

/// Compute the Luhn check digit that makes `body` (15 digits) pass when
/// appended as the 16th digit.
fn luhn_check_digit(body: &str) -> u8 {
    // Luhn over body+check==0 must sum to a multiple of 10; the check
    // digit occupies the rightmost (non-doubled) position once appended,
    // so doubling starts from the digit immediately left of it.
    let mut sum: u32 = 0;
    for (i, c) in body.chars().rev().enumerate() {
        let mut d = c.to_digit(10).expect("luhn body is all-digit");
        if i % 2 == 0 {
            d *= 2;
            if d > 9 {
                d -= 9;
            }
        }
        sum += d;
    }
    ((10 - (sum % 10)) % 10) as u8
}

/// Standard Luhn (mod-10) validity check over a digit string.
#[must_use]
pub fn passes_luhn(digits: &str) -> bool {
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }
    let mut sum: u32 = 0;
    for (i, c) in digits.chars().rev().enumerate() {
        let mut d = c.to_digit(10).unwrap();
        if i % 2 == 1 {
            d *= 2;
            if d > 9 {
                d -= 9;
            }
        }
        sum += d;
    }
    sum % 10 == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_prefix_generation_matches_recognizer() {
        for _ in 0..20 {
            let token = generate_prefix();
            assert!(looks_like_token(&token, TokenFormat::Prefix));
            assert!(token.starts_with("tok_"));
        }
    }

    #[test]
    fn test_luhn_generation_matches_recognizer() {
        for _ in 0..50 {
            let token = generate_luhn();
            assert_eq!(token.len(), 16);
            assert!(token.starts_with(LUHN_SENTINEL));
            assert!(passes_luhn(&token));
            assert!(looks_like_token(&token, TokenFormat::Luhn));
        }
    }

    #[test]
    fn test_known_luhn_vectors() {
        assert!(passes_luhn("4532015112830366"));
        assert!(!passes_luhn("4532015112830367"));
    }

    #[test]
    fn test_non_token_rejected() {
        assert!(!looks_like_token("4532015112830366", TokenFormat::Prefix));
        assert!(!looks_like_token("not-a-token-at-all", TokenFormat::Luhn));
    }

    proptest! {
        #[test]
        fn prop_generated_luhn_tokens_always_valid(_seed in any::<u8>()) {
            let token = generate_luhn();
            prop_assert!(passes_luhn(&token));
            prop_assert!(token.starts_with(LUHN_SENTINEL));
            prop_assert_eq!(token.len(), 16);
        }

        #[test]
        fn prop_generated_prefix_tokens_match_regex(_seed in any::<u8>()) {
            let token = generate_prefix();
            prop_assert!(TOKEN_PREFIX_RE.is_match(&token));
        }
    }
}

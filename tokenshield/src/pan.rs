//! PAN recognition (spec.md §4.3).
//!
//! A single regex matching the canonical issuer PAN shapes. No Luhn check
//! is performed on input — shape matching only. Compiled once at startup
//! (spec.md §5: "Regexes: compiled once at startup; immutable thereafter").

use once_cell::sync::Lazy;
use regex::Regex;

/// Matches Visa, Mastercard, Amex, Discover, Diners, and JCB PAN shapes.
pub static PAN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"(?x)",
        r"^(?:",
        r"4[0-9]{12}(?:[0-9]{3})?(?:[0-9]{3})?",              // Visa: 13, 16, 19
        r"|(?:5[1-5][0-9]{2}|222[1-9]|22[3-9][0-9]|2[3-6][0-9]{2}|27[01][0-9]|2720)[0-9]{12}", // Mastercard
        r"|3[47][0-9]{13}",                                    // Amex
        r"|6(?:011|5[0-9]{2})[0-9]{12}",                       // Discover 6011 / 65xx
        r"|64[4-9][0-9][0-9]{12}",                             // Discover 644-649
        r"|622(?:12[6-9]|1[3-9][0-9]|[2-8][0-9]{2}|91[0-9]|92[0-5])[0-9]{10}", // Discover 622126-622925
        r"|3(?:0[0-5]|[68][0-9])[0-9]{11}",                    // Diners Club
        r"|(?:2131|1800|35[0-9]{3})[0-9]{11}",                 // JCB
        r")$",
    ))
    .expect("PAN_RE is a fixed, hand-checked pattern")
});

/// True if `value` matches one of the canonical PAN shapes.
#[must_use]
pub fn looks_like_pan(value: &str) -> bool {
    PAN_RE.is_match(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_visa_matches() {
        assert!(looks_like_pan("4532015112830366"));
        assert!(looks_like_pan("4111111111111"));
    }

    #[test]
    fn test_mastercard_matches() {
        assert!(looks_like_pan("5105105105105100"));
        assert!(looks_like_pan("2221000000000009"));
    }

    #[test]
    fn test_amex_matches() {
        assert!(looks_like_pan("340000000000009"));
    }

    #[test]
    fn test_discover_matches() {
        assert!(looks_like_pan("6011000000000004"));
        assert!(looks_like_pan("6221260000000000"));
    }

    #[test]
    fn test_non_pan_rejected() {
        assert!(!looks_like_pan("not-a-card"));
        assert!(!looks_like_pan("99.99"));
        assert!(!looks_like_pan("12345"));
    }
}

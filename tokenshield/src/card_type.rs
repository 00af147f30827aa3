//! Card-brand detection from a PAN (spec.md §4.5).
//!
//! Pure function of the digit string after stripping spaces and dashes.
//! No Luhn check is performed — this is pattern matching only, by design
//! (spec.md's Non-goals explicitly exclude PAN validation beyond shape).

use serde::{Deserialize, Serialize};

/// Card issuer brand derived from a PAN's prefix and length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CardType {
    /// Visa: starts with `4`; length 13, 16, or 19.
    Visa,
    /// Mastercard: first two digits 51-55 or 22-27; length 16.
    Mastercard,
    /// American Express: first two digits 34 or 37; length 15.
    Amex,
    /// Discover: starts with 6011, 65, 644-649, or 622126-622925; length 16.
    Discover,
    /// Did not match any recognized issuer shape.
    Unknown,
}

impl CardType {
    /// Classify `pan` after removing spaces and dashes.
    ///
    /// Evaluation order matches spec.md §4.5 exactly: Visa, Mastercard,
    /// Amex, Discover, then `Unknown`.
    #[must_use]
    pub fn detect(pan: &str) -> Self {
        let digits: String = pan.chars().filter(|c| !matches!(c, ' ' | '-')).collect();

        if is_visa(&digits) {
            Self::Visa
        } else if is_mastercard(&digits) {
            Self::Mastercard
        } else if is_amex(&digits) {
            Self::Amex
        } else if is_discover(&digits) {
            Self::Discover
        } else {
            Self::Unknown
        }
    }

    /// Lowercase name, matching the `credit_cards.card_type` storage
    /// representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Visa => "visa",
            Self::Mastercard => "mastercard",
            Self::Amex => "amex",
            Self::Discover => "discover",
            Self::Unknown => "unknown",
        }
    }

    /// Parse back the storage representation produced by [`Self::as_str`].
    #[must_use]
    pub fn from_str(s: &str) -> Self {
        match s {
            "visa" => Self::Visa,
            "mastercard" => Self::Mastercard,
            "amex" => Self::Amex,
            "discover" => Self::Discover,
            _ => Self::Unknown,
        }
    }
}

fn is_visa(digits: &str) -> bool {
    digits.starts_with('4') && matches!(digits.len(), 13 | 16 | 19)
}

fn is_mastercard(digits: &str) -> bool {
    if digits.len() != 16 {
        return false;
    }
    let Ok(two) = digits[0..2].parse::<u32>() else {
        return false;
    };
    let Ok(four) = digits[0..4].parse::<u32>() else {
        return false;
    };
    (51..=55).contains(&two) || (2221..=2720).contains(&four)
}

fn is_amex(digits: &str) -> bool {
    digits.len() == 15 && (digits.starts_with("34") || digits.starts_with("37"))
}

fn is_discover(digits: &str) -> bool {
    if digits.len() != 16 {
        return false;
    }
    if digits.starts_with("6011") || digits.starts_with("65") {
        return true;
    }
    if digits.len() >= 4 && digits.starts_with("64") {
        if let Ok(three) = digits[0..3].parse::<u32>() {
            if (644..=649).contains(&three) {
                return true;
            }
        }
    }
    if let Ok(six) = digits[0..6].parse::<u32>() {
        return (622126..=622925).contains(&six);
    }
    false
}

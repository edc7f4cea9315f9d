//! Card number validation and brand detection.
//!
//! Pure functions over the digits of a PAN. Nothing here ever stores the
//! card number; callers keep only the derived brand/last4/expiry.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use strum::Display;
use utoipa::ToSchema;

use crate::errors::ServiceError;

/// Detected card brand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, ToSchema)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CardBrand {
    Visa,
    Mastercard,
    Amex,
    Discover,
    Diners,
    Jcb,
    Unionpay,
    Unknown,
}

static BRAND_PATTERNS: Lazy<Vec<(CardBrand, Regex)>> = Lazy::new(|| {
    vec![
        (CardBrand::Visa, Regex::new(r"^4").unwrap()),
        (CardBrand::Mastercard, Regex::new(r"^(5[1-5]|2[2-7])").unwrap()),
        (CardBrand::Amex, Regex::new(r"^3[47]").unwrap()),
        (CardBrand::Discover, Regex::new(r"^6(?:011|5)").unwrap()),
        (CardBrand::Diners, Regex::new(r"^3[0689]").unwrap()),
        (CardBrand::Jcb, Regex::new(r"^35").unwrap()),
        (CardBrand::Unionpay, Regex::new(r"^62").unwrap()),
    ]
});

/// Strip whitespace and verify the remainder is all digits.
pub fn normalize_card_number(raw: &str) -> Result<String, ServiceError> {
    let digits: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(ServiceError::InvalidInput(
            "invalid card number".to_string(),
        ));
    }
    Ok(digits)
}

/// Luhn checksum over a digit string.
pub fn luhn_valid(digits: &str) -> bool {
    let mut sum = 0u32;
    for (i, c) in digits.chars().rev().enumerate() {
        let Some(d) = c.to_digit(10) else {
            return false;
        };
        let d = if i % 2 == 1 {
            let doubled = d * 2;
            if doubled > 9 {
                doubled - 9
            } else {
                doubled
            }
        } else {
            d
        };
        sum += d;
    }
    sum % 10 == 0
}

/// Validate a raw card number: strip whitespace, require 13-19 digits, and
/// check the Luhn checksum.
pub fn validate_card_number(raw: &str) -> Result<String, ServiceError> {
    let digits = normalize_card_number(raw)?;
    if digits.len() < 13 || digits.len() > 19 || !luhn_valid(&digits) {
        return Err(ServiceError::InvalidInput(
            "invalid card number".to_string(),
        ));
    }
    Ok(digits)
}

/// Detect the brand from the leading digits. Patterns are checked in fixed
/// order; the first match wins.
pub fn detect_brand(digits: &str) -> CardBrand {
    for (brand, pattern) in BRAND_PATTERNS.iter() {
        if pattern.is_match(digits) {
            return *brand;
        }
    }
    CardBrand::Unknown
}

/// CVC is 3 digits, 4 for amex.
pub fn validate_cvc(cvc: &str, brand: CardBrand) -> Result<(), ServiceError> {
    let expected = if brand == CardBrand::Amex { 4 } else { 3 };
    if cvc.len() != expected || !cvc.chars().all(|c| c.is_ascii_digit()) {
        return Err(ServiceError::InvalidInput("invalid CVC".to_string()));
    }
    Ok(())
}

/// Expiry must not be in the past relative to (current_year, current_month).
pub fn validate_expiry(
    exp_month: i16,
    exp_year: i16,
    current_year: i16,
    current_month: i16,
) -> Result<(), ServiceError> {
    if !(1..=12).contains(&exp_month) {
        return Err(ServiceError::InvalidInput(
            "invalid expiration month".to_string(),
        ));
    }
    if exp_year < current_year || (exp_year == current_year && exp_month < current_month) {
        return Err(ServiceError::InvalidInput("card has expired".to_string()));
    }
    Ok(())
}

pub fn last4(digits: &str) -> String {
    let len = digits.len();
    digits[len.saturating_sub(4)..].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn luhn_accepts_the_standard_test_card() {
        assert!(validate_card_number("4242 4242 4242 4242").is_ok());
    }

    #[test]
    fn luhn_rejects_a_corrupted_number() {
        assert_matches!(
            validate_card_number("4242424242424241"),
            Err(ServiceError::InvalidInput(_))
        );
    }

    #[test]
    fn length_bounds_are_enforced() {
        // 12 digits, Luhn-valid
        assert!(validate_card_number("424242424240").is_err());
        // 20 digits
        assert!(validate_card_number("42424242424242424242").is_err());
    }

    #[test]
    fn non_digits_are_rejected() {
        assert!(validate_card_number("4242-4242-4242-4242").is_err());
        assert!(validate_card_number("").is_err());
    }

    #[test]
    fn brand_table_matches_known_prefixes() {
        assert_eq!(detect_brand("4242424242424242"), CardBrand::Visa);
        assert_eq!(detect_brand("5555555555554444"), CardBrand::Mastercard);
        assert_eq!(detect_brand("2223003122003222"), CardBrand::Mastercard);
        assert_eq!(detect_brand("378282246310005"), CardBrand::Amex);
        assert_eq!(detect_brand("6011111111111117"), CardBrand::Discover);
        assert_eq!(detect_brand("6511111111111111"), CardBrand::Discover);
        assert_eq!(detect_brand("30569309025904"), CardBrand::Diners);
        assert_eq!(detect_brand("3530111333300000"), CardBrand::Jcb);
        assert_eq!(detect_brand("6200000000000005"), CardBrand::Unionpay);
        assert_eq!(detect_brand("9999999999999999"), CardBrand::Unknown);
    }

    #[test]
    fn cvc_length_depends_on_brand() {
        assert!(validate_cvc("123", CardBrand::Visa).is_ok());
        assert!(validate_cvc("1234", CardBrand::Visa).is_err());
        assert!(validate_cvc("1234", CardBrand::Amex).is_ok());
        assert!(validate_cvc("123", CardBrand::Amex).is_err());
        assert!(validate_cvc("12a", CardBrand::Visa).is_err());
    }

    #[test]
    fn expiry_boundary_is_inclusive_of_the_current_month() {
        assert!(validate_expiry(6, 2030, 2026, 8).is_ok());
        assert!(validate_expiry(8, 2026, 2026, 8).is_ok());
        assert!(validate_expiry(7, 2026, 2026, 8).is_err());
        assert!(validate_expiry(12, 2025, 2026, 8).is_err());
        assert!(validate_expiry(13, 2030, 2026, 8).is_err());
    }

    #[test]
    fn brand_serializes_lowercase() {
        assert_eq!(CardBrand::Visa.to_string(), "visa");
        assert_eq!(CardBrand::Mastercard.to_string(), "mastercard");
        assert_eq!(CardBrand::Unionpay.to_string(), "unionpay");
    }
}

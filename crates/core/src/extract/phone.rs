use std::sync::OnceLock;

use regex::Regex;
use serde_json::{json, Value};

use crate::extract::{normalize_text, Extraction, Extractor, Validation};

/// Phone-number extraction: verbalized prefixes ("più"/"plus") and the
/// separators dictation leaves behind are normalized away before matching.
pub struct PhoneExtractor;

static PHONE: OnceLock<Regex> = OnceLock::new();
static VALID: OnceLock<Regex> = OnceLock::new();

fn phone_pattern() -> &'static Regex {
    PHONE.get_or_init(|| Regex::new(r"\+?\d{6,15}").expect("static regex"))
}

fn valid_pattern() -> &'static Regex {
    VALID.get_or_init(|| Regex::new(r"^\+?\d{6,15}$").expect("static regex"))
}

fn normalize_phone(text: &str) -> String {
    // normalize_text has already folded "più" to "piu".
    let mut out = normalize_text(text);
    for (spoken, symbol) in [("piu ", "+"), ("plus ", "+")] {
        out = out.replace(spoken, symbol);
    }
    out.chars().filter(|c| !matches!(c, ' ' | '.' | '-' | '/' | '(' | ')')).collect()
}

impl Extractor for PhoneExtractor {
    fn kind(&self) -> &'static str {
        "phone"
    }

    fn extract(&self, text: &str, _previous: Option<&Value>) -> Extraction {
        let normalized = normalize_phone(text);
        match phone_pattern().find(&normalized) {
            Some(found) => Extraction::hit(json!(found.as_str()), 0.85),
            None => Extraction::miss("no phone number recognized"),
        }
    }

    fn validate(&self, value: &Value) -> Validation {
        match value.as_str() {
            Some(number) if valid_pattern().is_match(number) => Validation::pass(),
            Some(number) => Validation::fail(format!("`{number}` is not a plausible phone number")),
            None => Validation::fail("phone value must be a string"),
        }
    }

    fn format(&self, value: &Value) -> String {
        value.as_str().unwrap_or_default().to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn separators_are_stripped() {
        let result = PhoneExtractor.extract("mi trovi allo 333 123.45-67", None);
        assert_eq!(result.value, Some(json!("3331234567")));
    }

    #[test]
    fn verbalized_plus_prefix_normalizes() {
        let result = PhoneExtractor.extract("più 39 333 1234567", None);
        assert_eq!(result.value, Some(json!("+393331234567")));
    }

    #[test]
    fn short_digit_runs_are_not_phone_numbers() {
        let result = PhoneExtractor.extract("ho 42 anni", None);
        assert!(result.value.is_none());
    }

    #[test]
    fn validate_requires_six_to_fifteen_digits() {
        assert!(PhoneExtractor.validate(&json!("+393331234567")).ok);
        assert!(!PhoneExtractor.validate(&json!("12345")).ok);
        assert!(!PhoneExtractor.validate(&json!("333 123")).ok);
    }
}

use serde_json::{json, Value};

use crate::extract::{Extraction, Extractor, Validation, CHECKSUM_FAILED_CONFIDENCE};

/// Italian VAT number (partita IVA): eleven digits where the last one is a
/// Luhn-like check digit. Even-position digits double, minus nine when the
/// double exceeds nine. Format-only matches fall to the low-confidence tier.
pub struct VatExtractor;

pub(crate) fn check_digit_holds(digits: &str) -> bool {
    if digits.len() != 11 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }
    let mut sum = 0u32;
    for (index, byte) in digits.bytes().take(10).enumerate() {
        let digit = (byte - b'0') as u32;
        if index % 2 == 0 {
            sum += digit;
        } else {
            let doubled = digit * 2;
            sum += if doubled > 9 { doubled - 9 } else { doubled };
        }
    }
    let expected = (10 - sum % 10) % 10;
    expected == (digits.as_bytes()[10] - b'0') as u32
}

/// Digit runs in the utterance. VAT numbers are usually dictated in groups,
/// so digits separated only by spaces, dots, or dashes merge into one run;
/// any word in between starts a new one.
fn digit_runs(text: &str) -> Vec<String> {
    let mut runs = Vec::new();
    let mut current = String::new();
    for c in text.chars() {
        if c.is_ascii_digit() {
            current.push(c);
        } else if matches!(c, ' ' | '.' | '-') {
            // tentative continuation of the current run
        } else if !current.is_empty() {
            runs.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        runs.push(current);
    }
    runs
}

impl Extractor for VatExtractor {
    fn kind(&self) -> &'static str {
        "vat"
    }

    fn extract(&self, text: &str, _previous: Option<&Value>) -> Extraction {
        let runs = digit_runs(text);
        let Some(candidate) = runs.iter().find(|run| run.len() == 11) else {
            return Extraction::miss("no 11-digit VAT number recognized");
        };
        if check_digit_holds(candidate) {
            Extraction::hit(json!(candidate), 0.95)
        } else {
            Extraction {
                value: Some(json!(candidate)),
                confidence: CHECKSUM_FAILED_CONFIDENCE,
                missing: Vec::new(),
                reasons: vec!["VAT format matched but check digit failed".to_owned()],
            }
        }
    }

    fn validate(&self, value: &Value) -> Validation {
        match value.as_str() {
            Some(digits) if check_digit_holds(digits) => Validation::pass(),
            Some(digits) => Validation::fail(format!("`{digits}` fails the VAT check digit")),
            None => Validation::fail("VAT value must be a string"),
        }
    }

    fn format(&self, value: &Value) -> String {
        value.as_str().unwrap_or_default().to_owned()
    }
}

use std::sync::OnceLock;

use regex::Regex;
use serde_json::{json, Value};

use crate::extract::{Extraction, Extractor, Validation, CHECKSUM_FAILED_CONFIDENCE};

/// Italian tax code (codice fiscale): sixteen characters whose last letter
/// is a control character computed over the first fifteen with distinct
/// odd/even position tables. Shape-only matches fall to the low tier.
pub struct TaxCodeExtractor;

static TAX_CODE: OnceLock<Regex> = OnceLock::new();

fn tax_code_pattern() -> &'static Regex {
    // Omocodia substitutions put letters in digit slots, so the numeric
    // groups accept letters too; the control character settles validity.
    TAX_CODE.get_or_init(|| {
        Regex::new(r"^[A-Z]{6}[A-Z0-9]{2}[A-Z][A-Z0-9]{2}[A-Z][A-Z0-9]{3}[A-Z]$")
            .expect("static regex")
    })
}

// Control-character contribution of a character in an odd (1-based)
// position, per the official table.
fn odd_weight(c: u8) -> u32 {
    const DIGITS: [u32; 10] = [1, 0, 5, 7, 9, 13, 15, 17, 19, 21];
    const LETTERS: [u32; 26] = [
        1, 0, 5, 7, 9, 13, 15, 17, 19, 21, 2, 4, 18, 20, 11, 3, 6, 8, 12, 14, 16, 10, 22, 25, 24,
        23,
    ];
    match c {
        b'0'..=b'9' => DIGITS[(c - b'0') as usize],
        _ => LETTERS[(c - b'A') as usize],
    }
}

fn even_weight(c: u8) -> u32 {
    match c {
        b'0'..=b'9' => (c - b'0') as u32,
        _ => (c - b'A') as u32,
    }
}

pub(crate) fn control_char_holds(code: &str) -> bool {
    if code.len() != 16 || !code.bytes().all(|b| b.is_ascii_alphanumeric()) {
        return false;
    }
    let sum: u32 = code
        .bytes()
        .take(15)
        .enumerate()
        .map(|(index, byte)| {
            if (index + 1) % 2 == 1 {
                odd_weight(byte)
            } else {
                even_weight(byte)
            }
        })
        .sum();
    let expected = b'A' + (sum % 26) as u8;
    code.as_bytes()[15] == expected
}

fn compact(text: &str) -> String {
    text.to_uppercase().chars().filter(char::is_ascii_alphanumeric).collect()
}

/// Slide a 16-character window over the compacted utterance. Dictation
/// glues surrounding words onto the code, so a single anchored scan would
/// miss codes spoken inside a sentence. The first window whose control
/// character holds wins; otherwise the first digit-bearing shape match
/// becomes the low-tier candidate (a plain 16-letter run is almost always
/// glued prose, not an omocodia code, and those still pass via the
/// checksum path).
fn find_candidate(compacted: &str) -> Option<(String, bool)> {
    let mut shaped: Option<&str> = None;
    for start in 0..=compacted.len().checked_sub(16)? {
        let window = &compacted[start..start + 16];
        if !tax_code_pattern().is_match(window) {
            continue;
        }
        if control_char_holds(window) {
            return Some((window.to_owned(), true));
        }
        if shaped.is_none() && window.bytes().any(|b| b.is_ascii_digit()) {
            shaped = Some(window);
        }
    }
    shaped.map(|window| (window.to_owned(), false))
}

impl Extractor for TaxCodeExtractor {
    fn kind(&self) -> &'static str {
        "taxCode"
    }

    fn extract(&self, text: &str, _previous: Option<&Value>) -> Extraction {
        let compacted = compact(text);
        let Some((candidate, checksum_ok)) = find_candidate(&compacted) else {
            return Extraction::miss("no tax-code-shaped token recognized");
        };
        if checksum_ok {
            Extraction::hit(json!(candidate), 0.95)
        } else {
            Extraction {
                value: Some(json!(candidate)),
                confidence: CHECKSUM_FAILED_CONFIDENCE,
                missing: Vec::new(),
                reasons: vec!["tax code format matched but control character failed".to_owned()],
            }
        }
    }

    fn validate(&self, value: &Value) -> Validation {
        match value.as_str() {
            Some(code) if tax_code_pattern().is_match(code) && control_char_holds(code) => {
                Validation::pass()
            }
            Some(code) => Validation::fail(format!("`{code}` fails the tax code control character")),
            None => Validation::fail("tax code value must be a string"),
        }
    }

    fn format(&self, value: &Value) -> String {
        value.as_str().unwrap_or_default().to_uppercase()
    }
}

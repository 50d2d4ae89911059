use std::sync::OnceLock;

use regex::Regex;
use serde_json::{json, Value};

use crate::extract::{Extraction, Extractor, Validation, CHECKSUM_FAILED_CONFIDENCE};

/// IBAN extraction with the real mod-97 check (ISO 13616), not just shape
/// matching. A value that looks like an IBAN but fails the checksum comes
/// back at the low-confidence tier with the failure named, so the dialogue
/// can show it instead of silently dropping it.
pub struct IbanExtractor;

static IBAN_SHAPE: OnceLock<Regex> = OnceLock::new();
static IBAN_LOOSE: OnceLock<Regex> = OnceLock::new();

fn iban_shape() -> &'static Regex {
    IBAN_SHAPE.get_or_init(|| Regex::new(r"^[A-Z]{2}\d{2}[A-Z0-9]{11,30}$").expect("static regex"))
}

// Unanchored: the utterance is compacted before searching, so surrounding
// words glue onto the candidate and word boundaries are useless here.
fn iban_loose() -> &'static Regex {
    IBAN_LOOSE.get_or_init(|| Regex::new(r"[A-Z]{2}\d{2}[A-Z0-9]{11,30}").expect("static regex"))
}

/// ISO 13616 mod-97: rotate the first four characters to the end, expand
/// letters to two-digit numbers, and the remainder of the whole number
/// modulo 97 must be 1.
pub(crate) fn mod97_checks_out(candidate: &str) -> bool {
    if candidate.len() < 15 {
        return false;
    }
    let rearranged = format!("{}{}", &candidate[4..], &candidate[..4]);
    let mut remainder: u32 = 0;
    for c in rearranged.chars() {
        let piece = match c {
            '0'..='9' => c as u32 - '0' as u32,
            'A'..='Z' => c as u32 - 'A' as u32 + 10,
            _ => return false,
        };
        remainder = if piece < 10 {
            (remainder * 10 + piece) % 97
        } else {
            (remainder * 100 + piece) % 97
        };
    }
    remainder == 1
}

fn compact(text: &str) -> String {
    text.to_uppercase().chars().filter(|c| c.is_ascii_alphanumeric()).collect()
}

impl Extractor for IbanExtractor {
    fn kind(&self) -> &'static str {
        "iban"
    }

    fn extract(&self, text: &str, _previous: Option<&Value>) -> Extraction {
        let compacted = compact(text);
        let Some(found) = iban_loose().find(&compacted) else {
            return Extraction::miss("no IBAN-shaped token recognized");
        };
        let candidate = found.as_str();
        if mod97_checks_out(candidate) {
            return Extraction::hit(json!(candidate), 0.95);
        }
        // The greedy match may have swallowed trailing words glued on by
        // compaction; retry every shorter prefix before giving up on the
        // checksum.
        for end in (15..candidate.len()).rev() {
            let prefix = &candidate[..end];
            if iban_shape().is_match(prefix) && mod97_checks_out(prefix) {
                return Extraction::hit(json!(prefix), 0.95);
            }
        }
        Extraction {
            value: Some(json!(candidate)),
            confidence: CHECKSUM_FAILED_CONFIDENCE,
            missing: Vec::new(),
            reasons: vec!["IBAN format matched but mod-97 checksum failed".to_owned()],
        }
    }

    fn validate(&self, value: &Value) -> Validation {
        match value.as_str() {
            Some(candidate) if iban_shape().is_match(candidate) && mod97_checks_out(candidate) => {
                Validation::pass()
            }
            Some(candidate) => Validation::fail(format!("`{candidate}` fails the IBAN checksum")),
            None => Validation::fail("IBAN value must be a string"),
        }
    }

    fn format(&self, value: &Value) -> String {
        // Grouped in fours for readability, the usual paper form.
        let compacted = compact(value.as_str().unwrap_or_default());
        compacted
            .as_bytes()
            .chunks(4)
            .map(|chunk| std::str::from_utf8(chunk).unwrap_or_default())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Well-known sample IBANs with valid checksums.
    const GOOD_IT: &str = "IT60X0542811101000000123456";
    const GOOD_DE: &str = "DE89370400440532013000";

    #[test]
    fn valid_iban_is_extracted_at_full_confidence() {
        let result = IbanExtractor.extract("il mio iban è IT60 X054 2811 1010 0000 0123 456", None);
        assert_eq!(result.value, Some(json!(GOOD_IT)));
        assert_eq!(result.confidence, 0.95);
    }

    #[test]
    fn checksum_failure_drops_to_the_low_tier_instead_of_rejecting() {
        // Same shape, last digit flipped.
        let result = IbanExtractor.extract("IT60X0542811101000000123457", None);
        assert!(result.value.is_some());
        assert_eq!(result.confidence, CHECKSUM_FAILED_CONFIDENCE);
        assert!(result.reasons[0].contains("checksum"));
    }

    #[test]
    fn validate_enforces_the_checksum() {
        assert!(IbanExtractor.validate(&json!(GOOD_DE)).ok);
        assert!(!IbanExtractor.validate(&json!("DE89370400440532013001")).ok);
    }

    #[test]
    fn format_groups_in_fours() {
        assert_eq!(IbanExtractor.format(&json!(GOOD_DE)), "DE89 3704 0044 0532 0130 00");
    }

    #[test]
    fn unrelated_text_is_a_miss() {
        assert!(IbanExtractor.extract("non ce l'ho sottomano", None).value.is_none());
    }
}

use std::sync::OnceLock;

use regex::Regex;
use serde_json::{json, Value};

use crate::extract::{normalize_text, Extraction, Extractor, Validation};

/// Integer extraction, the alias target for `age` and `quantity`.
/// Digits win; small spelled-out numbers (Italian and English) are a
/// slightly less confident fallback for dictated input.
pub struct NumberExtractor;

static DIGITS: OnceLock<Regex> = OnceLock::new();

fn digits() -> &'static Regex {
    DIGITS.get_or_init(|| Regex::new(r"\b\d+\b").expect("static regex"))
}

const SPELLED: [(&str, i64); 41] = [
    ("zero", 0),
    ("uno", 1),
    ("due", 2),
    ("tre", 3),
    ("quattro", 4),
    ("cinque", 5),
    ("sei", 6),
    ("sette", 7),
    ("otto", 8),
    ("nove", 9),
    ("dieci", 10),
    ("undici", 11),
    ("dodici", 12),
    ("tredici", 13),
    ("quattordici", 14),
    ("quindici", 15),
    ("sedici", 16),
    ("diciassette", 17),
    ("diciotto", 18),
    ("diciannove", 19),
    ("venti", 20),
    ("one", 1),
    ("two", 2),
    ("three", 3),
    ("four", 4),
    ("five", 5),
    ("six", 6),
    ("seven", 7),
    ("eight", 8),
    ("nine", 9),
    ("ten", 10),
    ("eleven", 11),
    ("twelve", 12),
    ("thirteen", 13),
    ("fourteen", 14),
    ("fifteen", 15),
    ("sixteen", 16),
    ("seventeen", 17),
    ("eighteen", 18),
    ("nineteen", 19),
    ("twenty", 20),
];

fn spelled_number(token: &str) -> Option<i64> {
    SPELLED.iter().find(|(word, _)| *word == token).map(|(_, number)| *number)
}

impl Extractor for NumberExtractor {
    fn kind(&self) -> &'static str {
        "number"
    }

    fn extract(&self, text: &str, _previous: Option<&Value>) -> Extraction {
        let normalized = normalize_text(text);

        if let Some(found) = digits().find(&normalized) {
            if let Ok(number) = found.as_str().parse::<i64>() {
                return Extraction::hit(json!(number), 0.8);
            }
        }

        for token in normalized.split(|c: char| !c.is_alphanumeric()) {
            if let Some(number) = spelled_number(token) {
                return Extraction::hit(json!(number), 0.7);
            }
        }

        Extraction::miss("no number recognized")
    }

    fn validate(&self, value: &Value) -> Validation {
        if value.as_i64().is_some() {
            Validation::pass()
        } else {
            Validation::fail("number value must be an integer")
        }
    }

    fn format(&self, value: &Value) -> String {
        value.as_i64().map(|n| n.to_string()).unwrap_or_default()
    }
}

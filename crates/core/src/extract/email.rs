use std::sync::OnceLock;

use regex::Regex;
use serde_json::{json, Value};

use crate::extract::{normalize_text, Extraction, Extractor, Validation};

/// E-mail extraction tolerant of dictated input: verbalized symbols
/// ("at"/"chiocciola", "dot"/"punto") and diacritics are normalized away
/// before pattern matching.
pub struct EmailExtractor;

static EMAIL: OnceLock<Regex> = OnceLock::new();

fn email_pattern() -> &'static Regex {
    EMAIL.get_or_init(|| {
        Regex::new(r"[a-z0-9][a-z0-9._%+-]*@[a-z0-9][a-z0-9.-]*\.[a-z]{2,}").expect("static regex")
    })
}

fn normalize_verbalized(text: &str) -> String {
    let mut out = normalize_text(text);
    for (spoken, symbol) in [
        (" chiocciola ", "@"),
        (" at ", "@"),
        (" punto ", "."),
        (" dot ", "."),
    ] {
        out = out.replace(spoken, symbol);
    }
    // Dictation often leaves spaces hugging the symbols themselves.
    out.replace(" @", "@").replace("@ ", "@").replace(" .", ".").replace(". ", ".")
}

impl Extractor for EmailExtractor {
    fn kind(&self) -> &'static str {
        "email"
    }

    fn extract(&self, text: &str, _previous: Option<&Value>) -> Extraction {
        let normalized = normalize_verbalized(text);
        match email_pattern().find(&normalized) {
            Some(found) => Extraction::hit(json!(found.as_str()), 0.9),
            None => Extraction::miss("no e-mail address recognized"),
        }
    }

    fn validate(&self, value: &Value) -> Validation {
        match value.as_str() {
            Some(address) if email_pattern().is_match(address) => Validation::pass(),
            Some(address) => Validation::fail(format!("`{address}` is not a valid e-mail address")),
            None => Validation::fail("e-mail value must be a string"),
        }
    }

    fn format(&self, value: &Value) -> String {
        value.as_str().unwrap_or_default().to_lowercase()
    }
}

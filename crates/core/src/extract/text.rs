use serde_json::{json, Value};

use crate::extract::{Extraction, Extractor, Validation};

/// Passthrough for free-text slots: the trimmed utterance is the value.
/// Deliberately the least confident extractor, sitting right at the
/// acceptance threshold so any typed answer fills the slot but any scored
/// source can outrank it.
pub struct TextExtractor;

impl Extractor for TextExtractor {
    fn kind(&self) -> &'static str {
        "text"
    }

    fn extract(&self, text: &str, _previous: Option<&Value>) -> Extraction {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            Extraction::miss("empty utterance")
        } else {
            Extraction::hit(json!(trimmed), 0.6)
        }
    }

    fn validate(&self, value: &Value) -> Validation {
        match value.as_str() {
            Some(s) if !s.trim().is_empty() => Validation::pass(),
            _ => Validation::fail("text value must be a non-empty string"),
        }
    }

    fn format(&self, value: &Value) -> String {
        value.as_str().unwrap_or_default().to_owned()
    }
}

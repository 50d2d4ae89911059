use serde_json::{json, Map, Value};

use crate::extract::{normalize_text, Extraction, Extractor, Validation};

/// First/last name pair from short utterances such as "mi chiamo Mario
/// Rossi" or a bare "Jane Doe". A lone token fills the first name and
/// reports the last name as missing, to be completed on a later turn.
pub struct PersonNameExtractor;

const LEAD_INS: [&str; 6] =
    ["mi chiamo", "sono", "il mio nome e", "my name is", "i am", "i'm"];

const STOPWORDS: [&str; 8] = ["si", "no", "ecco", "allora", "dunque", "well", "ok", "yes"];

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Shared with the structural composite parser: split an utterance into a
/// (first, last) pair if it plausibly names a person.
pub(crate) fn parse_name_pair(text: &str) -> Option<(String, String)> {
    let tokens = name_tokens(text);
    match tokens.len() {
        0 | 1 => None,
        // Compound first names ("Maria Grazia Rossi"): everything but the
        // final token is the first name.
        n => Some((tokens[..n - 1].join(" "), tokens[n - 1].clone())),
    }
}

fn name_tokens(text: &str) -> Vec<String> {
    let mut normalized = normalize_text(text);
    for lead in LEAD_INS {
        if let Some(rest) = normalized.strip_prefix(lead) {
            normalized = rest.trim().to_owned();
            break;
        }
    }
    normalized
        .split(|c: char| !c.is_alphabetic() && c != '\'')
        .filter(|token| !token.is_empty() && !STOPWORDS.contains(token))
        .map(capitalize)
        .collect()
}

fn name_value(first: Option<&str>, last: Option<&str>) -> Value {
    let mut fields = Map::new();
    if let Some(first) = first {
        fields.insert("first".to_owned(), json!(first));
    }
    if let Some(last) = last {
        fields.insert("last".to_owned(), json!(last));
    }
    Value::Object(fields)
}

impl Extractor for PersonNameExtractor {
    fn kind(&self) -> &'static str {
        "personName"
    }

    fn extract(&self, text: &str, previous: Option<&Value>) -> Extraction {
        let known_first =
            previous.and_then(|v| v.get("first")).and_then(Value::as_str).map(str::to_owned);

        if let Some((first, last)) = parse_name_pair(text) {
            return Extraction::hit(name_value(Some(&first), Some(&last)), 0.75);
        }

        let tokens = name_tokens(text);
        match (known_first, tokens.first()) {
            // A lone token after the first name is known completes the pair.
            (Some(first), Some(last)) => {
                Extraction::hit(name_value(Some(&first), Some(last)), 0.7)
            }
            (None, Some(first)) => {
                Extraction::partial(name_value(Some(first), None), vec!["last".to_owned()])
            }
            _ => Extraction::miss("no name recognized"),
        }
    }

    fn validate(&self, value: &Value) -> Validation {
        let first = value.get("first").and_then(Value::as_str).unwrap_or_default();
        let last = value.get("last").and_then(Value::as_str).unwrap_or_default();
        if first.is_empty() || last.is_empty() {
            Validation::fail("name needs both a first and a last part")
        } else {
            Validation::pass()
        }
    }

    fn format(&self, value: &Value) -> String {
        let first = value.get("first").and_then(Value::as_str).unwrap_or_default();
        let last = value.get("last").and_then(Value::as_str).unwrap_or_default();
        format!("{first} {last}").trim().to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn italian_lead_in_is_stripped() {
        let result = PersonNameExtractor.extract("mi chiamo Mario Rossi", None);
        assert_eq!(result.value, Some(json!({"first": "Mario", "last": "Rossi"})));
    }

    #[test]
    fn bare_pair_works() {
        let result = PersonNameExtractor.extract("Jane Doe", None);
        assert_eq!(result.value, Some(json!({"first": "Jane", "last": "Doe"})));
    }

    #[test]
    fn compound_first_names_keep_the_final_token_as_last() {
        let result = PersonNameExtractor.extract("sono Maria Grazia Rossi", None);
        assert_eq!(result.value, Some(json!({"first": "Maria Grazia", "last": "Rossi"})));
    }

    #[test]
    fn lone_token_is_partial_and_completes_next_turn() {
        let first = PersonNameExtractor.extract("Mario", None);
        assert_eq!(first.missing, vec!["last"]);

        let second = PersonNameExtractor.extract("Rossi", first.value.as_ref());
        assert_eq!(second.value, Some(json!({"first": "Mario", "last": "Rossi"})));
    }

    #[test]
    fn validate_needs_both_parts() {
        assert!(PersonNameExtractor.validate(&json!({"first": "A", "last": "B"})).ok);
        assert!(!PersonNameExtractor.validate(&json!({"first": "A"})).ok);
    }

    #[test]
    fn format_joins_the_pair() {
        let formatted = PersonNameExtractor.format(&json!({"first": "Mario", "last": "Rossi"}));
        assert_eq!(formatted, "Mario Rossi");
    }
}

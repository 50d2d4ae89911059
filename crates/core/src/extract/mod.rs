//! Pluggable per-kind extractors and their registry.
//!
//! Every extractor is pure and stateless: `extract` turns a short utterance
//! (plus any previously known partial) into a candidate, `validate` checks a
//! candidate value for real — checksums included — and `format` renders a
//! value for display. Registry lookup goes through kind normalization and an
//! alias table, so domain synonyms like `age` land on the numeric extractor.

pub mod date;
pub mod email;
pub mod iban;
pub mod number;
pub mod person;
pub mod phone;
pub mod structural;
pub mod tax_code;
pub mod text;
pub mod vat;

use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};

use serde_json::Value;

/// Confidence assigned when an identifier matches its format but fails its
/// checksum: kept as a low-tier candidate for display instead of being
/// rejected outright, and never high enough to be accepted.
pub const CHECKSUM_FAILED_CONFIDENCE: f64 = 0.4;

/// Result of one extraction attempt against one utterance.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Extraction {
    pub value: Option<Value>,
    pub confidence: f64,
    /// Field names still needed to complete a partial value.
    pub missing: Vec<String>,
    pub reasons: Vec<String>,
}

impl Extraction {
    pub fn hit(value: Value, confidence: f64) -> Self {
        Self { value: Some(value), confidence, ..Self::default() }
    }

    pub fn miss(reason: impl Into<String>) -> Self {
        Self { reasons: vec![reason.into()], ..Self::default() }
    }

    pub fn partial(value: Value, missing: Vec<String>) -> Self {
        Self { value: Some(value), confidence: 0.3, missing, ..Self::default() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Validation {
    pub ok: bool,
    pub errors: Vec<String>,
}

impl Validation {
    pub fn pass() -> Self {
        Self { ok: true, errors: Vec::new() }
    }

    pub fn fail(error: impl Into<String>) -> Self {
        Self { ok: false, errors: vec![error.into()] }
    }
}

pub trait Extractor: Send + Sync {
    /// Canonical kind this extractor serves, already normalized.
    fn kind(&self) -> &'static str;

    fn extract(&self, text: &str, previous: Option<&Value>) -> Extraction;

    fn validate(&self, value: &Value) -> Validation;

    fn format(&self, value: &Value) -> String;
}

/// Kind-to-extractor mapping with an alias table, loaded once and cached.
pub struct ExtractorRegistry {
    extractors: BTreeMap<String, Arc<dyn Extractor>>,
    aliases: BTreeMap<String, String>,
}

impl ExtractorRegistry {
    pub fn empty() -> Self {
        Self { extractors: BTreeMap::new(), aliases: BTreeMap::new() }
    }

    /// The full built-in extractor set with the default alias table.
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(date::DateExtractor));
        registry.register(Arc::new(email::EmailExtractor));
        registry.register(Arc::new(phone::PhoneExtractor));
        registry.register(Arc::new(number::NumberExtractor));
        registry.register(Arc::new(iban::IbanExtractor));
        registry.register(Arc::new(vat::VatExtractor));
        registry.register(Arc::new(tax_code::TaxCodeExtractor));
        registry.register(Arc::new(person::PersonNameExtractor));
        registry.register(Arc::new(text::TextExtractor));

        for (alias, target) in [
            ("age", "number"),
            ("quantity", "number"),
            ("dateOfBirth", "date"),
            ("birthDate", "date"),
            ("mail", "email"),
            ("telephone", "phone"),
            ("codiceFiscale", "taxCode"),
            ("partitaIva", "vat"),
            ("name", "personName"),
            ("fullName", "personName"),
        ] {
            registry.alias(alias, target);
        }
        registry
    }

    pub fn register(&mut self, extractor: Arc<dyn Extractor>) {
        self.extractors.insert(normalize_kind(extractor.kind()), extractor);
    }

    pub fn alias(&mut self, from: &str, to: &str) {
        self.aliases.insert(normalize_kind(from), normalize_kind(to));
    }

    /// Apply aliases from a configuration table on top of the defaults.
    pub fn apply_aliases(&mut self, table: &BTreeMap<String, String>) {
        for (from, to) in table {
            self.alias(from, to);
        }
    }

    pub fn resolve_kind(&self, kind: &str) -> String {
        let normalized = normalize_kind(kind);
        self.aliases.get(&normalized).cloned().unwrap_or(normalized)
    }

    pub fn get(&self, kind: &str) -> Option<&Arc<dyn Extractor>> {
        self.extractors.get(&self.resolve_kind(kind))
    }

    /// Process-wide built-in registry, for callers that only need the
    /// default set (prompt rendering, linting).
    pub fn shared() -> &'static Self {
        static SHARED: OnceLock<ExtractorRegistry> = OnceLock::new();
        SHARED.get_or_init(Self::builtin)
    }
}

impl Default for ExtractorRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Lowercase and strip separators so `taxCode`, `tax_code` and `Tax Code`
/// all land on the same registry key.
pub fn normalize_kind(kind: &str) -> String {
    kind.chars()
        .filter(|c| !matches!(c, ' ' | '_' | '-'))
        .flat_map(char::to_lowercase)
        .collect()
}

/// Lowercase an utterance and fold the diacritics that show up in dictated
/// Italian input, so pattern extractors match on a stable alphabet.
pub fn normalize_text(text: &str) -> String {
    text.trim()
        .chars()
        .flat_map(char::to_lowercase)
        .map(|c| match c {
            'à' | 'á' | 'â' | 'ä' => 'a',
            'è' | 'é' | 'ê' | 'ë' => 'e',
            'ì' | 'í' | 'î' | 'ï' => 'i',
            'ò' | 'ó' | 'ô' | 'ö' => 'o',
            'ù' | 'ú' | 'û' | 'ü' => 'u',
            _ => c,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn kind_normalization_unifies_spellings() {
        assert_eq!(normalize_kind("taxCode"), "taxcode");
        assert_eq!(normalize_kind("tax_code"), "taxcode");
        assert_eq!(normalize_kind("Tax Code"), "taxcode");
    }

    #[test]
    fn aliases_resolve_to_canonical_kinds() {
        let registry = ExtractorRegistry::builtin();
        assert_eq!(registry.resolve_kind("age"), "number");
        assert_eq!(registry.resolve_kind("dateOfBirth"), "date");
        assert!(registry.get("age").is_some());
        assert_eq!(registry.get("age").unwrap().kind(), "number");
    }

    #[test]
    fn unknown_kind_looks_up_to_nothing() {
        let registry = ExtractorRegistry::builtin();
        assert!(registry.get("starSign").is_none());
    }

    #[test]
    fn config_aliases_layer_on_top_of_defaults() {
        let mut registry = ExtractorRegistry::builtin();
        let mut table = BTreeMap::new();
        table.insert("shoeSize".to_owned(), "number".to_owned());
        registry.apply_aliases(&table);

        assert_eq!(registry.resolve_kind("shoeSize"), "number");
        assert_eq!(registry.resolve_kind("age"), "number");
    }

    #[test]
    fn diacritics_fold_to_ascii() {
        assert_eq!(normalize_text("Perché però è GIÀ lì"), "perche pero e gia li");
    }

    #[test]
    fn extraction_constructors_carry_their_shape() {
        let hit = Extraction::hit(json!(7), 0.8);
        assert_eq!(hit.value, Some(json!(7)));
        assert!(hit.reasons.is_empty());

        let miss = Extraction::miss("no digits");
        assert!(miss.value.is_none());
        assert_eq!(miss.reasons, vec!["no digits"]);

        let partial = Extraction::partial(json!({"day": 16}), vec!["month".into(), "year".into()]);
        assert_eq!(partial.missing.len(), 2);
    }
}

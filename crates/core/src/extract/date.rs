use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::Regex;
use serde_json::{json, Map, Value};

use crate::extract::{normalize_text, Extraction, Extractor, Validation};

/// Date extraction with partial knowledge carried across turns.
///
/// A first utterance like "il 16" remembers the day; "dicembre del 61"
/// later completes month and year. Complete dates parse from `dd/mm/yyyy`,
/// ISO `yyyy-mm-dd`, or `dd <month-name> yyyy` with a localized month table.
pub struct DateExtractor;

static NUMERIC_DATE: OnceLock<Regex> = OnceLock::new();
static ISO_DATE: OnceLock<Regex> = OnceLock::new();
static SPOKEN_DATE: OnceLock<Regex> = OnceLock::new();
static BARE_NUMBER: OnceLock<Regex> = OnceLock::new();

fn numeric_date() -> &'static Regex {
    NUMERIC_DATE.get_or_init(|| {
        Regex::new(r"\b(\d{1,2})[/\-.](\d{1,2})[/\-.](\d{2,4})\b").expect("static regex")
    })
}

fn iso_date() -> &'static Regex {
    ISO_DATE.get_or_init(|| Regex::new(r"\b(\d{4})-(\d{1,2})-(\d{1,2})\b").expect("static regex"))
}

fn spoken_date() -> &'static Regex {
    SPOKEN_DATE
        .get_or_init(|| Regex::new(r"\b(\d{1,2})°?\s+([a-z]+)\s+(?:del\s+|of\s+)?(\d{2,4})\b").expect("static regex"))
}

fn bare_number() -> &'static Regex {
    BARE_NUMBER.get_or_init(|| Regex::new(r"\b(\d{1,4})\b").expect("static regex"))
}

const MONTHS: [(&str, u32); 24] = [
    ("gennaio", 1),
    ("febbraio", 2),
    ("marzo", 3),
    ("aprile", 4),
    ("maggio", 5),
    ("giugno", 6),
    ("luglio", 7),
    ("agosto", 8),
    ("settembre", 9),
    ("ottobre", 10),
    ("novembre", 11),
    ("dicembre", 12),
    ("january", 1),
    ("february", 2),
    ("march", 3),
    ("april", 4),
    ("may", 5),
    ("june", 6),
    ("july", 7),
    ("august", 8),
    ("september", 9),
    ("october", 10),
    ("november", 11),
    ("december", 12),
];

pub(crate) fn month_from_name(token: &str) -> Option<u32> {
    MONTHS.iter().find(|(name, _)| *name == token).map(|(_, number)| *number)
}

/// Two-digit years pivot at 50: `61` is 1961, `07` is 2007.
fn pivot_year(raw: i64) -> i64 {
    if raw < 100 {
        if raw < 50 {
            2000 + raw
        } else {
            1900 + raw
        }
    } else {
        raw
    }
}

/// Parse a complete date from normalized text, trying the numeric,
/// ISO, and spoken grammars in that order. Shared with the structural
/// composite parser.
pub(crate) fn parse_full_date(text: &str) -> Option<(i64, i64, i64)> {
    if let Some(caps) = numeric_date().captures(text) {
        let day: i64 = caps[1].parse().ok()?;
        let month: i64 = caps[2].parse().ok()?;
        let year: i64 = pivot_year(caps[3].parse().ok()?);
        return Some((day, month, year));
    }
    if let Some(caps) = iso_date().captures(text) {
        let year: i64 = caps[1].parse().ok()?;
        let month: i64 = caps[2].parse().ok()?;
        let day: i64 = caps[3].parse().ok()?;
        return Some((day, month, year));
    }
    if let Some(caps) = spoken_date().captures(text) {
        let day: i64 = caps[1].parse().ok()?;
        let month = month_from_name(&caps[2])? as i64;
        let year: i64 = pivot_year(caps[3].parse().ok()?);
        return Some((day, month, year));
    }
    None
}

fn field(value: Option<&Value>, key: &str) -> Option<i64> {
    value.and_then(|v| v.get(key)).and_then(Value::as_i64)
}

fn date_value(day: Option<i64>, month: Option<i64>, year: Option<i64>) -> Value {
    let mut fields = Map::new();
    if let Some(day) = day {
        fields.insert("day".to_owned(), json!(day));
    }
    if let Some(month) = month {
        fields.insert("month".to_owned(), json!(month));
    }
    if let Some(year) = year {
        fields.insert("year".to_owned(), json!(year));
    }
    Value::Object(fields)
}

impl Extractor for DateExtractor {
    fn kind(&self) -> &'static str {
        "date"
    }

    fn extract(&self, text: &str, previous: Option<&Value>) -> Extraction {
        let normalized = normalize_text(text);

        if let Some((day, month, year)) = parse_full_date(&normalized) {
            return Extraction::hit(date_value(Some(day), Some(month), Some(year)), 0.9);
        }

        // Fragment pass: merge whatever this turn adds onto what earlier
        // turns already established.
        let mut day = field(previous, "day");
        let mut month = field(previous, "month");
        let mut year = field(previous, "year");

        for token in normalized.split(|c: char| !c.is_alphanumeric()) {
            if token.is_empty() {
                continue;
            }
            if month.is_none() {
                if let Some(found) = month_from_name(token) {
                    month = Some(found as i64);
                    continue;
                }
            }
            if let Some(caps) = bare_number().captures(token) {
                let number: i64 = match caps[1].parse() {
                    Ok(n) => n,
                    Err(_) => continue,
                };
                if token.len() == 4 {
                    year.get_or_insert(number);
                } else if number >= 32 {
                    year.get_or_insert(pivot_year(number));
                } else if day.is_none() {
                    day = Some(number);
                } else if month.is_none() && number <= 12 {
                    month = Some(number);
                }
            }
        }

        match (day, month, year) {
            (Some(d), Some(m), Some(y)) => {
                Extraction::hit(date_value(Some(d), Some(m), Some(y)), 0.75)
            }
            (None, None, None) => Extraction::miss("no date fragments recognized"),
            _ => {
                let mut missing = Vec::new();
                if day.is_none() {
                    missing.push("day".to_owned());
                }
                if month.is_none() {
                    missing.push("month".to_owned());
                }
                if year.is_none() {
                    missing.push("year".to_owned());
                }
                Extraction::partial(date_value(day, month, year), missing)
            }
        }
    }

    fn validate(&self, value: &Value) -> Validation {
        let (day, month, year) = (
            value.get("day").and_then(Value::as_i64),
            value.get("month").and_then(Value::as_i64),
            value.get("year").and_then(Value::as_i64),
        );
        match (day, month, year) {
            (Some(d), Some(m), Some(y)) => {
                let in_range = (1900..=2100).contains(&y);
                let valid_calendar = u32::try_from(d)
                    .ok()
                    .zip(u32::try_from(m).ok())
                    .and_then(|(d, m)| NaiveDate::from_ymd_opt(y as i32, m, d))
                    .is_some();
                if in_range && valid_calendar {
                    Validation::pass()
                } else {
                    Validation::fail(format!("{d:02}/{m:02}/{y} is not a real calendar date"))
                }
            }
            _ => Validation::fail("date is incomplete"),
        }
    }

    fn format(&self, value: &Value) -> String {
        let day = value.get("day").and_then(Value::as_i64).unwrap_or(0);
        let month = value.get("month").and_then(Value::as_i64).unwrap_or(0);
        let year = value.get("year").and_then(Value::as_i64).unwrap_or(0);
        format!("{day:02}/{month:02}/{year:04}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(text: &str, previous: Option<&Value>) -> Extraction {
        DateExtractor.extract(text, previous)
    }

    #[test]
    fn numeric_slash_date_parses() {
        let result = extract("sono nato il 16/12/1961", None);
        assert_eq!(result.value, Some(json!({"day": 16, "month": 12, "year": 1961})));
        assert!(result.confidence >= 0.9);
    }

    #[test]
    fn iso_date_parses() {
        let result = extract("1961-12-16", None);
        assert_eq!(result.value, Some(json!({"day": 16, "month": 12, "year": 1961})));
    }

    #[test]
    fn spoken_italian_date_parses() {
        let result = extract("16 dicembre 1961", None);
        assert_eq!(result.value, Some(json!({"day": 16, "month": 12, "year": 1961})));
    }

    #[test]
    fn spoken_english_date_parses() {
        let result = extract("born on 3 december 2007", None);
        assert_eq!(result.value, Some(json!({"day": 3, "month": 12, "year": 2007})));
    }

    #[test]
    fn two_digit_years_pivot_at_fifty() {
        let low = extract("1/2/07", None);
        assert_eq!(low.value.unwrap()["year"], json!(2007));
        let high = extract("1/2/61", None);
        assert_eq!(high.value.unwrap()["year"], json!(1961));
    }

    #[test]
    fn lone_day_yields_partial_with_missing_fields() {
        let result = extract("il 16", None);
        assert_eq!(result.value, Some(json!({"day": 16})));
        assert_eq!(result.missing, vec!["month", "year"]);
    }

    #[test]
    fn partial_knowledge_carries_forward_across_turns() {
        let first = extract("il 16", None);
        let second = extract("dicembre del 1961", first.value.as_ref());
        assert_eq!(second.value, Some(json!({"day": 16, "month": 12, "year": 1961})));
        assert!(second.missing.is_empty());
    }

    #[test]
    fn validate_rejects_impossible_calendar_dates() {
        assert!(!DateExtractor.validate(&json!({"day": 31, "month": 2, "year": 1990})).ok);
        assert!(!DateExtractor.validate(&json!({"day": 16, "month": 12})).ok);
        assert!(DateExtractor.validate(&json!({"day": 29, "month": 2, "year": 2000})).ok);
    }

    #[test]
    fn format_renders_dd_mm_yyyy() {
        let formatted = DateExtractor.format(&json!({"day": 3, "month": 2, "year": 1961}));
        assert_eq!(formatted, "03/02/1961");
    }
}

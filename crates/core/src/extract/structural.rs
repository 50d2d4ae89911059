//! Structural full-value parsing for composite nodes.
//!
//! When a composite node carries a structural pattern and the raw utterance
//! matches it, the matched substring is parsed with the sub-grammar implied
//! by the node's capture schema (date triple or person-name pair) and the
//! children's values land in one object keyed by child id — no per-field
//! extraction runs at all.

use serde_json::{Map, Value};

use crate::domain::node::{DialogueNode, NodeId};
use crate::extract::{date, normalize_text, person};

/// Which sub-grammar a capture schema selects.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum CompositeShape {
    DateTriple,
    PersonPair,
}

fn shape_of(schema_roles: &[&str]) -> Option<CompositeShape> {
    let has = |role: &str| schema_roles.contains(&role);
    if has("day") && has("month") && has("year") {
        Some(CompositeShape::DateTriple)
    } else if has("first") && has("last") {
        Some(CompositeShape::PersonPair)
    } else {
        None
    }
}

/// Apply a composite node's structural pattern to the raw text. On a match,
/// parse the matched substring and return the composite value keyed by the
/// children's ids. Returns `None` when the pattern does not match, the
/// schema selects no known shape, or the sub-grammar cannot parse the
/// matched span — all of which just hand control to the later stages.
pub fn structural_parse(node: &DialogueNode, text: &str) -> Option<Value> {
    let structural = node.structural.as_ref()?;
    let regex = structural.regex()?;
    let normalized = normalize_text(text);
    let matched = regex.find(&normalized)?.as_str();

    let roles: Vec<&str> = structural.schema.keys().map(String::as_str).collect();
    let child_for = |role: &str| structural.schema.get(role).cloned();

    match shape_of(&roles)? {
        CompositeShape::DateTriple => {
            let (day, month, year) = date::parse_full_date(matched)?;
            Some(composite_value(&[
                (child_for("day")?, Value::from(day)),
                (child_for("month")?, Value::from(month)),
                (child_for("year")?, Value::from(year)),
            ]))
        }
        CompositeShape::PersonPair => {
            let (first, last) = person::parse_name_pair(matched)?;
            Some(composite_value(&[
                (child_for("first")?, Value::from(first)),
                (child_for("last")?, Value::from(last)),
            ]))
        }
    }
}

fn composite_value(fields: &[(NodeId, Value)]) -> Value {
    let mut map = Map::new();
    for (id, value) in fields {
        map.insert(id.as_str().to_owned(), value.clone());
    }
    Value::Object(map)
}

/// The flat `{day, month, year}` / `{first, last}` view of a structural
/// value, used to validate it with the node's registered extractor (which
/// expects role keys, not child ids).
pub fn role_view(node: &DialogueNode, value: &Value) -> Value {
    let Some(structural) = node.structural.as_ref() else {
        return value.clone();
    };
    let mut map = Map::new();
    for (role, child_id) in &structural.schema {
        if let Some(field) = value.get(child_id.as_str()) {
            map.insert(role.clone(), field.clone());
        }
    }
    Value::Object(map)
}

/// The inverse of [`role_view`]: remap a role-keyed object produced by a
/// per-kind extractor onto the node's child ids, so memory fan-out and
/// composition see the same keys a structural parse would have produced.
/// Values are passed through untouched when the node has no schema or the
/// value is not an object.
pub fn id_view(node: &DialogueNode, value: &Value) -> Value {
    let Some(structural) = node.structural.as_ref() else {
        return value.clone();
    };
    let Value::Object(fields) = value else {
        return value.clone();
    };
    let mut map = Map::new();
    for (role, child_id) in &structural.schema {
        if let Some(field) = fields.get(role) {
            map.insert(child_id.as_str().to_owned(), field.clone());
        }
    }
    Value::Object(map)
}

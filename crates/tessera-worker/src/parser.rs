//! Validation and classification of the model's operation output.
//!
//! The model is prompted for a JSON array of tagged operations; in practice
//! it sometimes wraps the array in an `{"operations": [...]}` object, so both
//! shapes are accepted. A JSON parse failure is fatal to the job; a single
//! malformed operation is only dropped with a warning.

use serde_json::{Map, Value as JsonValue};
use std::collections::BTreeSet;
use tracing::warn;

use tessera_core::{CreateOp, Error, ParsedOperations, PropertyOp, RelationshipOp, Result};

/// How much of an unparseable model response to echo into the error.
const ERROR_CONTEXT_CHARS: usize = 500;

/// Parse the raw model content into classified operation lists.
pub fn parse_operations(content: &str) -> Result<ParsedOperations> {
    let value: JsonValue = serde_json::from_str(content.trim()).map_err(|e| {
        Error::Parse(format!(
            "model output is not valid JSON ({}): {}",
            e,
            truncate_chars(content, ERROR_CONTEXT_CHARS)
        ))
    })?;

    let items = match value {
        JsonValue::Array(items) => items,
        JsonValue::Object(mut map) => match map.remove("operations") {
            Some(JsonValue::Array(items)) => items,
            _ => {
                return Err(Error::Parse(
                    "expected an array or an object with an \"operations\" array".to_string(),
                ))
            }
        },
        _ => {
            return Err(Error::Parse(
                "expected an array or an object with an \"operations\" array".to_string(),
            ))
        }
    };

    let mut parsed = ParsedOperations::default();
    for (index, item) in items.iter().enumerate() {
        match classify(item) {
            Ok(Classified::Create(op)) => parsed.creates.push(op),
            Ok(Classified::Relationship(op)) => parsed.relationships.push(op),
            Ok(Classified::Property(op)) => parsed.properties.push(op),
            Err(reason) => {
                warn!(index, %reason, "Dropping operation");
            }
        }
    }
    Ok(parsed)
}

/// Union of every label referenced anywhere in the parsed operations: create
/// labels plus relationship subjects/targets plus legacy property entities.
/// Labels are returned in their raw surface form.
pub fn collect_referenced_labels(parsed: &ParsedOperations) -> BTreeSet<String> {
    let mut labels = BTreeSet::new();
    for op in &parsed.creates {
        labels.insert(op.label.clone());
    }
    for op in &parsed.relationships {
        labels.insert(op.subject.clone());
        labels.insert(op.target.clone());
    }
    for op in &parsed.properties {
        labels.insert(op.entity.clone());
    }
    labels
}

enum Classified {
    Create(CreateOp),
    Relationship(RelationshipOp),
    Property(PropertyOp),
}

fn classify(item: &JsonValue) -> std::result::Result<Classified, String> {
    let map = item.as_object().ok_or("operation is not an object")?;
    let kind = require_str(map, "operation")?;

    match kind.as_str() {
        "create" => parse_create(map).map(Classified::Create),
        "add_relationship" => parse_relationship(map).map(Classified::Relationship),
        "add_property" => parse_property(map).map(Classified::Property),
        other => Err(format!("unknown operation {:?}", other)),
    }
}

fn parse_create(map: &Map<String, JsonValue>) -> std::result::Result<CreateOp, String> {
    let label = require_str(map, "label")?;
    let entity_type = require_str(map, "entity_type")?;
    // The strict prompt requires a description; older prompts did not. Keep
    // accepting the minimal shape so prompt regressions degrade gracefully.
    let description = optional_str(map, "description")?.unwrap_or_else(|| {
        warn!(%label, "Create without description (legacy shape)");
        String::new()
    });

    let mut properties = std::collections::BTreeMap::new();
    match map.get("properties") {
        None | Some(JsonValue::Null) => {}
        Some(JsonValue::Object(bag)) => {
            for (key, value) in bag {
                match value.as_str() {
                    Some(s) => {
                        properties.insert(key.clone(), s.to_string());
                    }
                    None => {
                        warn!(%label, %key, "Dropping non-string property value");
                    }
                }
            }
        }
        Some(_) => return Err(format!("create {:?}: properties is not an object", label)),
    }
    if properties.len() < 2 {
        warn!(%label, count = properties.len(), "Create with fewer than two properties");
    }

    Ok(CreateOp {
        label,
        entity_type,
        description,
        properties,
    })
}

fn parse_relationship(map: &Map<String, JsonValue>) -> std::result::Result<RelationshipOp, String> {
    let subject = require_str(map, "subject")?;
    let predicate = require_str(map, "predicate")?;
    let target = require_str(map, "target")?;
    let description = optional_str(map, "description")?.unwrap_or_else(|| {
        warn!(%subject, %predicate, %target, "Relationship without description (legacy shape)");
        String::new()
    });
    let quote_start = optional_str(map, "quote_start")?;
    let quote_end = optional_str(map, "quote_end")?;

    Ok(RelationshipOp {
        subject,
        predicate,
        target,
        description,
        quote_start,
        quote_end,
    })
}

fn parse_property(map: &Map<String, JsonValue>) -> std::result::Result<PropertyOp, String> {
    Ok(PropertyOp {
        entity: require_str(map, "entity")?,
        key: require_str(map, "key")?,
        value: require_str(map, "value")?,
    })
}

fn require_str(map: &Map<String, JsonValue>, key: &str) -> std::result::Result<String, String> {
    match map.get(key) {
        Some(JsonValue::String(s)) if !s.is_empty() => Ok(s.clone()),
        Some(JsonValue::String(_)) => Err(format!("field {:?} is empty", key)),
        Some(_) => Err(format!("field {:?} is not a string", key)),
        None => Err(format!("missing field {:?}", key)),
    }
}

fn optional_str(
    map: &Map<String, JsonValue>,
    key: &str,
) -> std::result::Result<Option<String>, String> {
    match map.get(key) {
        None | Some(JsonValue::Null) => Ok(None),
        Some(JsonValue::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(format!("field {:?} is not a string", key)),
    }
}

fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

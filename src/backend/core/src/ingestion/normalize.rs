//! Validation and normalization of raw bus payloads.
//!
//! [`normalize`] is pure and total: every JSON value yields either a
//! [`NewMaterialEvent`] or a classified [`ValidationError`].

use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::{Map, Value};

use crate::error::ValidationError;
use crate::store::NewMaterialEvent;

const NAIVE_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Turn a decoded payload into an event ready for the store.
///
/// `received_at` stands in for a missing or unparseable `timestamp`.
pub fn normalize(
    raw: &Value,
    received_at: DateTime<Utc>,
) -> Result<NewMaterialEvent, ValidationError> {
    let object = raw.as_object().ok_or(ValidationError::NotAnObject)?;

    let material_id = required(object, "material_id")?;
    let event_type = required(object, "event_type")?;

    let timestamp = optional(object, "timestamp")
        .and_then(|value| parse_timestamp(&value))
        .unwrap_or(received_at);

    Ok(NewMaterialEvent {
        material_id,
        event_type,
        timestamp,
        shelf_id: optional(object, "shelf_id"),
        slot_id: optional(object, "slot_id"),
        worker_id: optional(object, "worker_id"),
    })
}

/// [`normalize`] with the current wall-clock time as the fallback timestamp.
pub fn normalize_now(raw: &Value) -> Result<NewMaterialEvent, ValidationError> {
    normalize(raw, Utc::now())
}

/// Parse RFC 3339, or a naive ISO-8601 date-time read as UTC.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc));
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .map(|naive| naive.and_utc())
}

enum Coerced {
    Absent,
    Text(String),
    Unsupported(&'static str),
}

fn coerce(value: Option<&Value>) -> Coerced {
    match value {
        None | Some(Value::Null) => Coerced::Absent,
        Some(Value::String(s)) => Coerced::Text(s.clone()),
        Some(Value::Number(n)) => Coerced::Text(n.to_string()),
        Some(Value::Bool(b)) => Coerced::Text(b.to_string()),
        Some(Value::Array(_)) => Coerced::Unsupported("array"),
        Some(Value::Object(_)) => Coerced::Unsupported("object"),
    }
}

fn required(object: &Map<String, Value>, field: &'static str) -> Result<String, ValidationError> {
    match coerce(object.get(field)) {
        Coerced::Absent => Err(ValidationError::MissingField(field)),
        Coerced::Unsupported(found) => Err(ValidationError::UnsupportedType { field, found }),
        Coerced::Text(text) if text.trim().is_empty() => Err(ValidationError::EmptyField(field)),
        Coerced::Text(text) => Ok(text),
    }
}

fn optional(object: &Map<String, Value>, field: &str) -> Option<String> {
    match coerce(object.get(field)) {
        Coerced::Text(text) if !text.trim().is_empty() => Some(text),
        _ => None,
    }
}

#![forbid(unsafe_code)]

//! Row and candidate record model.
//!
//! Backends return [`Row`]s: ordered maps from field name to JSON value. The
//! control normalizes each row into a [`CandidateRecord`] carrying the three
//! fields it reasons about plus the untouched row for consumers that need
//! more.

use serde::Serialize;
use serde_json::Value;

/// A raw backend row.
pub type Row = serde_json::Map<String, Value>;

/// Field holding the record identifier on every backend row.
pub const ID_FIELD: &str = "Id";

/// Render a JSON scalar as text.
///
/// Strings are returned as-is, numbers and booleans via their JSON
/// rendering. `null`, arrays, and objects have no scalar text.
#[must_use]
pub fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Text of `field` on `row`, if present and scalar.
#[must_use]
pub fn field_text(row: &Row, field: &str) -> Option<String> {
    row.get(field).and_then(value_text)
}

/// A normalized candidate shown in the dropdown.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidateRecord {
    /// Backend record identifier (`Id` field, falling back to the value field).
    pub record_id: String,
    /// Text shown to the user (display field).
    pub display_value: String,
    /// Value committed as the control's value (value field).
    pub match_value: String,
    /// The original row.
    pub raw: Row,
    /// `true` only for the "no records" sentinel.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub placeholder: bool,
}

impl CandidateRecord {
    /// Normalize a backend row using the configured display and value fields.
    #[must_use]
    pub fn from_row(row: Row, display_field: &str, value_field: &str) -> Self {
        let match_value = field_text(&row, value_field).unwrap_or_default();
        let display_value = field_text(&row, display_field).unwrap_or_default();
        let record_id = field_text(&row, ID_FIELD).unwrap_or_else(|| match_value.clone());
        Self {
            record_id,
            display_value,
            match_value,
            raw: row,
            placeholder: false,
        }
    }

    /// The sentinel shown when a fetch yields zero rows.
    ///
    /// It renders like a candidate but is never selectable and never matches
    /// a value.
    #[must_use]
    pub fn no_records(label: &str) -> Self {
        Self {
            record_id: String::new(),
            display_value: label.to_owned(),
            match_value: String::new(),
            raw: Row::new(),
            placeholder: true,
        }
    }

    /// Whether this candidate may be committed as a selection.
    #[must_use]
    pub const fn is_selectable(&self) -> bool {
        !self.placeholder
    }
}
